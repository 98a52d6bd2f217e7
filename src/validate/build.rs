//! Source distribution build supervision.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::model::ArchiveFormat;
use crate::traits::{Toolchain, ToolchainError};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("No archive formats requested")]
    NoFormats,

    #[error("Existing dist directory {}, consider clobbering it", .0.display())]
    ExistingDist(PathBuf),

    #[error("Could not find expected archive with \"{pattern}\"")]
    ArchiveNotFound { format: ArchiveFormat, pattern: String },

    #[error("More archives than expected with \"{pattern}\": {}", .found.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join("; "))]
    AmbiguousArchives {
        format: ArchiveFormat,
        pattern: String,
        found: Vec<PathBuf>,
    },

    #[error("Invalid archive pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("Build toolchain failed: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Glob pattern matching archives of `format` inside `dist_dir`.
pub fn archive_pattern(dist_dir: &Path, format: ArchiveFormat) -> String {
    let escaped = glob::Pattern::escape(&dist_dir.to_string_lossy());
    format!("{escaped}/*.{}", format.extension())
}

/// Finds the single archive of `format` in `dist_dir`.
///
/// Hidden files (such as `._*` AppleDouble companions) are never matched.
pub fn find_archive(dist_dir: &Path, format: ArchiveFormat) -> Result<PathBuf, BuildError> {
    let pattern = archive_pattern(dist_dir, format);
    let options = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..Default::default()
    };
    let mut found: Vec<PathBuf> = glob::glob_with(&pattern, options)?
        .collect::<Result<_, _>>()
        .map_err(|e: glob::GlobError| BuildError::Io(e.into_error()))?;
    found.sort();

    match found.len() {
        0 => Err(BuildError::ArchiveNotFound { format, pattern }),
        1 => Ok(found.remove(0)),
        _ => Err(BuildError::AmbiguousArchives {
            format,
            pattern,
            found,
        }),
    }
}

/// Builds one source archive per format for the package in `pkg_dir`.
///
/// An existing `pkg_dir/dist` is removed first when `clobber` is set and is an
/// error otherwise. Returns the archive paths in the order of `formats`.
pub async fn build_package<T>(
    toolchain: &T,
    pkg_dir: &Path,
    formats: &[ArchiveFormat],
    clobber: bool,
) -> Result<Vec<PathBuf>, BuildError>
where
    T: Toolchain + ?Sized,
{
    if formats.is_empty() {
        return Err(BuildError::NoFormats);
    }

    let dist_dir = pkg_dir.join("dist");
    if tokio::fs::metadata(&dist_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        if !clobber {
            return Err(BuildError::ExistingDist(dist_dir));
        }
        warn!(dist_dir = %dist_dir.display(), "Removing existing dist directory");
        tokio::fs::remove_dir_all(&dist_dir).await?;
    }

    info!(
        pkg_dir = %pkg_dir.display(),
        formats = %ArchiveFormat::join(formats),
        "Starting sdist build"
    );
    toolchain.build(pkg_dir, formats).await?;

    let archives = formats
        .iter()
        .map(|&format| find_archive(&dist_dir, format))
        .collect::<Result<Vec<_>, _>>()?;

    info!(count = archives.len(), "Collected built archives");
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Writes the given file names into `dist/` when asked to build.
    struct MockToolchain {
        outputs: Vec<&'static str>,
        builds: AtomicUsize,
        fail: bool,
    }

    impl MockToolchain {
        fn producing(outputs: Vec<&'static str>) -> Self {
            Self {
                outputs,
                builds: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Toolchain for MockToolchain {
        async fn build(
            &self,
            pkg_dir: &Path,
            _formats: &[ArchiveFormat],
        ) -> Result<(), ToolchainError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ToolchainError::Failed {
                    command: "mock sdist".to_string(),
                    status: Some(1),
                });
            }
            let dist = pkg_dir.join("dist");
            fs::create_dir_all(&dist).unwrap();
            for name in &self.outputs {
                fs::write(dist.join(name), b"archive").unwrap();
            }
            Ok(())
        }

        async fn install(&self, _src_dir: &Path, _prefix: &Path) -> Result<(), ToolchainError> {
            unreachable!("build supervisor never installs")
        }
    }

    #[tokio::test]
    async fn test_returns_archives_in_format_order() {
        let pkg = tempdir().unwrap();
        let toolchain =
            MockToolchain::producing(vec!["nipy-templates-0.2.zip", "nipy-templates-0.2.tar.gz"]);

        let archives = build_package(
            &toolchain,
            pkg.path(),
            &[ArchiveFormat::Gztar, ArchiveFormat::Zip],
            false,
        )
        .await
        .unwrap();

        let dist = pkg.path().join("dist");
        assert_eq!(
            archives,
            vec![
                dist.join("nipy-templates-0.2.tar.gz"),
                dist.join("nipy-templates-0.2.zip"),
            ]
        );
    }

    #[tokio::test]
    async fn test_ambiguous_archives() {
        let pkg = tempdir().unwrap();
        let toolchain =
            MockToolchain::producing(vec!["nipy-data-0.1.tar.gz", "nipy-data-0.2.tar.gz"]);

        let err = build_package(&toolchain, pkg.path(), &[ArchiveFormat::Gztar], true)
            .await
            .unwrap_err();

        match err {
            BuildError::AmbiguousArchives { format, found, .. } => {
                assert_eq!(format, ArchiveFormat::Gztar);
                assert_eq!(found.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_archive() {
        let pkg = tempdir().unwrap();
        let toolchain = MockToolchain::producing(vec!["nipy-data-0.1.tar.gz"]);

        let err = build_package(&toolchain, pkg.path(), &[ArchiveFormat::Zip], true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::ArchiveNotFound {
                format: ArchiveFormat::Zip,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_plain_tar_does_not_match_compressed() {
        let pkg = tempdir().unwrap();
        let toolchain = MockToolchain::producing(vec!["nipy-data-0.1.tar.gz", "nipy-data-0.1.tar"]);

        let archives = build_package(&toolchain, pkg.path(), &[ArchiveFormat::Tar], true)
            .await
            .unwrap();
        assert_eq!(archives, vec![pkg.path().join("dist/nipy-data-0.1.tar")]);
    }

    #[tokio::test]
    async fn test_existing_dist_without_clobber() {
        let pkg = tempdir().unwrap();
        let stale = pkg.path().join("dist/nipy-data-0.0.tar.gz");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();
        let toolchain = MockToolchain::producing(vec!["nipy-data-0.1.tar.gz"]);

        let err = build_package(&toolchain, pkg.path(), &[ArchiveFormat::Gztar], false)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::ExistingDist(_)));
        assert!(stale.exists());
        assert_eq!(toolchain.builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clobber_removes_stale_archives() {
        let pkg = tempdir().unwrap();
        let stale = pkg.path().join("dist/nipy-data-0.0.tar.gz");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, b"old").unwrap();
        let toolchain = MockToolchain::producing(vec!["nipy-data-0.1.tar.gz"]);

        let archives = build_package(&toolchain, pkg.path(), &[ArchiveFormat::Gztar], true)
            .await
            .unwrap();

        assert!(!stale.exists());
        assert_eq!(archives, vec![pkg.path().join("dist/nipy-data-0.1.tar.gz")]);
    }

    #[tokio::test]
    async fn test_toolchain_failure_propagates() {
        let pkg = tempdir().unwrap();
        let toolchain = MockToolchain {
            fail: true,
            ..MockToolchain::producing(vec![])
        };

        let err = build_package(&toolchain, pkg.path(), &[ArchiveFormat::Gztar], true)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Toolchain(ToolchainError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_empty_formats_rejected() {
        let pkg = tempdir().unwrap();
        let toolchain = MockToolchain::producing(vec![]);

        let err = build_package(&toolchain, pkg.path(), &[], true)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::NoFormats));
        assert_eq!(toolchain.builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_find_archive_skips_hidden_files() {
        let pkg = tempdir().unwrap();
        let dist = pkg.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join("nipy-data-0.1.tar.gz"), b"archive").unwrap();
        fs::write(dist.join("._nipy-data-0.1.tar.gz"), b"resource fork").unwrap();

        let archive = find_archive(&dist, ArchiveFormat::Gztar).unwrap();
        assert_eq!(archive, dist.join("nipy-data-0.1.tar.gz"));
    }

    #[test]
    fn test_find_archive_ignores_only_hidden_match() {
        let pkg = tempdir().unwrap();
        let dist = pkg.path().join("dist");
        fs::create_dir_all(&dist).unwrap();
        fs::write(dist.join(".nipy-data-0.1.zip"), b"archive").unwrap();

        let err = find_archive(&dist, ArchiveFormat::Zip).unwrap_err();
        assert!(matches!(err, BuildError::ArchiveNotFound { .. }));
    }

    #[test]
    fn test_archive_pattern_escapes_dist_dir() {
        let pattern = archive_pattern(Path::new("/tmp/pkg[1]/dist"), ArchiveFormat::Ztar);
        assert_eq!(pattern, "/tmp/pkg[[]1[]]/dist/*.tar.Z");
    }
}
