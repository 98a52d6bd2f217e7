//! Batch round-trip validation.
//!
//! [`ValidationPipeline`] runs the build stage and then the install stage for
//! each package source directory in turn:
//! 1. **Build**: `sdist` into `<pkg>/dist` and collect one archive per format
//! 2. **Verify**: unpack, install into a temporary prefix, look the package up
//!
//! The first failure ends the run; nothing is retried or skipped.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use crate::model::{ArchiveFormat, PackageReport, PipelineReport};
use crate::traits::{DataSourceLookup, Toolchain};
use crate::validate::build::{build_package, BuildError};
use crate::validate::install::{verify_install, InstallError};

/// Errors that abort a pipeline run.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Building a package source directory failed
    #[error("Build of {} failed: {source}", .pkg_dir.display())]
    Build {
        pkg_dir: PathBuf,
        #[source]
        source: BuildError,
    },

    /// Verifying a built archive failed
    #[error("Install check of {} failed: {source}", .archive.display())]
    Install {
        archive: PathBuf,
        #[source]
        source: InstallError,
    },
}

/// Build-then-verify driver over a list of package source directories.
///
/// # Example
///
/// ```ignore
/// use datapkg_check::{SetupPyToolchain, ShareTreeLookup, ValidationPipeline};
///
/// let pipeline = ValidationPipeline::new(SetupPyToolchain::default(), ShareTreeLookup);
/// let archives = pipeline.run(&["nipy-templates".into()]).await?;
/// ```
#[derive(Debug)]
pub struct ValidationPipeline<T, L>
where
    T: Toolchain,
    L: DataSourceLookup,
{
    toolchain: T,
    lookup: L,

    /// Formats requested from the build (default: gztar)
    formats: Vec<ArchiveFormat>,

    /// Whether an existing dist directory is deleted (default: true)
    clobber: bool,
}

impl<T, L> ValidationPipeline<T, L>
where
    T: Toolchain,
    L: DataSourceLookup,
{
    pub fn new(toolchain: T, lookup: L) -> Self {
        Self {
            toolchain,
            lookup,
            formats: vec![ArchiveFormat::Gztar],
            clobber: true,
        }
    }

    pub fn with_formats(mut self, formats: Vec<ArchiveFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_clobber(mut self, clobber: bool) -> Self {
        self.clobber = clobber;
        self
    }

    /// Checks every package directory and returns the archives it verified.
    pub async fn run(&self, pkg_dirs: &[PathBuf]) -> Result<Vec<PathBuf>, PipelineError> {
        Ok(self.run_with_report(pkg_dirs).await?.archives())
    }

    /// Like [`run`](Self::run) but also reports names, versions and timings.
    pub async fn run_with_report(
        &self,
        pkg_dirs: &[PathBuf],
    ) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        let mut report = PipelineReport::default();

        for pkg_dir in pkg_dirs {
            report.packages.push(self.check_package(pkg_dir).await?);
        }

        report.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            packages = report.packages.len(),
            duration_ms = report.total_duration_ms,
            "Pipeline completed"
        );
        Ok(report)
    }

    async fn check_package(&self, pkg_dir: &Path) -> Result<PackageReport, PipelineError> {
        info!(pkg_dir = %pkg_dir.display(), "Starting build stage");
        let build_start = Instant::now();

        let archives = build_package(&self.toolchain, pkg_dir, &self.formats, self.clobber)
            .await
            .map_err(|source| PipelineError::Build {
                pkg_dir: pkg_dir.to_path_buf(),
                source,
            })?;

        let build_duration_ms = build_start.elapsed().as_millis() as u64;
        info!(duration_ms = build_duration_ms, "Build stage completed");

        info!("Starting verify stage");
        let verify_start = Instant::now();
        let mut verified = None;
        for archive in &archives {
            let result = verify_install(&self.toolchain, &self.lookup, archive)
                .await
                .map_err(|source| PipelineError::Install {
                    archive: archive.clone(),
                    source,
                })?;
            verified = Some(result);
        }
        let verify_duration_ms = verify_start.elapsed().as_millis() as u64;
        info!(duration_ms = verify_duration_ms, "Verify stage completed");

        // build_package never returns an empty list
        let (package_name, version) = verified
            .map(|v| (v.package_name, v.version))
            .unwrap_or_default();

        Ok(PackageReport {
            package_dir: pkg_dir.to_path_buf(),
            archives,
            package_name,
            version,
            build_duration_ms,
            verify_duration_ms,
        })
    }
}
