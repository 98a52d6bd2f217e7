use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Source archive formats the build toolchain can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Bztar,
    Gztar,
    Tar,
    Zip,
    Ztar,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 5] = [
        ArchiveFormat::Bztar,
        ArchiveFormat::Gztar,
        ArchiveFormat::Tar,
        ArchiveFormat::Zip,
        ArchiveFormat::Ztar,
    ];

    /// Token understood by `setup.py sdist --formats=`.
    pub fn token(self) -> &'static str {
        match self {
            ArchiveFormat::Bztar => "bztar",
            ArchiveFormat::Gztar => "gztar",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Ztar => "ztar",
        }
    }

    /// File extension (without the leading dot) of archives in this format.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Bztar => "tar.bz2",
            ArchiveFormat::Gztar => "tar.gz",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Ztar => "tar.Z",
        }
    }

    /// Joins formats the way `--formats=` expects them.
    pub fn join(formats: &[ArchiveFormat]) -> String {
        formats
            .iter()
            .map(|f| f.token())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown archive format '{0}' (expected one of bztar, gztar, tar, zip, ztar)")]
pub struct UnknownFormat(pub String);

impl FromStr for ArchiveFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArchiveFormat::ALL
            .into_iter()
            .find(|f| f.token() == s)
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

/// Arguments of a data-source lookup: `<category>/<organization>/<module>/<package_name>`
/// searched for under each of `search_paths`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceQuery {
    pub category: String,
    pub organization: String,
    pub module: String,
    pub package_name: String,
    pub search_paths: Vec<PathBuf>,
}

impl DataSourceQuery {
    /// Query for an installed nipy data package.
    pub fn nipy(package_name: impl Into<String>, search_paths: Vec<PathBuf>) -> Self {
        Self {
            category: "share".to_string(),
            organization: "nipy".to_string(),
            module: "nipy".to_string(),
            package_name: package_name.into(),
            search_paths,
        }
    }

    /// Path components below a search path, in lookup order.
    pub fn components(&self) -> [&str; 4] {
        [
            self.category.as_str(),
            self.organization.as_str(),
            self.module.as_str(),
            self.package_name.as_str(),
        ]
    }
}

/// A resolved data package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceHandle {
    /// Package directory that satisfied the lookup
    pub root: PathBuf,

    /// Version recorded in the package's `config.ini`
    pub version: String,
}

/// Outcome of one package source directory in a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReport {
    pub package_dir: PathBuf,
    pub archives: Vec<PathBuf>,

    /// Name recovered from the archive file name
    pub package_name: String,

    /// Version reported by the data-source lookup
    pub version: String,

    pub build_duration_ms: u64,
    pub verify_duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineReport {
    pub packages: Vec<PackageReport>,
    pub total_duration_ms: u64,
}

impl PipelineReport {
    /// Every archive checked, in processing order.
    pub fn archives(&self) -> Vec<PathBuf> {
        self.packages
            .iter()
            .flat_map(|p| p.archives.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_format_extension_table() {
        assert_eq!(ArchiveFormat::Bztar.extension(), "tar.bz2");
        assert_eq!(ArchiveFormat::Gztar.extension(), "tar.gz");
        assert_eq!(ArchiveFormat::Tar.extension(), "tar");
        assert_eq!(ArchiveFormat::Zip.extension(), "zip");
        assert_eq!(ArchiveFormat::Ztar.extension(), "tar.Z");

        let extensions: HashSet<_> = ArchiveFormat::ALL.iter().map(|f| f.extension()).collect();
        assert_eq!(extensions.len(), ArchiveFormat::ALL.len());
    }

    #[test]
    fn test_format_token_parsing() {
        for format in ArchiveFormat::ALL {
            assert_eq!(format.token().parse::<ArchiveFormat>().unwrap(), format);
            assert_eq!(format.to_string(), format.token());
        }
        assert!("tar.gz".parse::<ArchiveFormat>().is_err());
        assert!("GZTAR".parse::<ArchiveFormat>().is_err());
    }

    #[test]
    fn test_format_join() {
        assert_eq!(
            ArchiveFormat::join(&[ArchiveFormat::Gztar, ArchiveFormat::Zip]),
            "gztar,zip"
        );
        assert_eq!(ArchiveFormat::join(&[]), "");
    }

    #[test]
    fn test_nipy_query_components() {
        let query = DataSourceQuery::nipy("exampledata", vec![PathBuf::from("/tmp/x")]);
        assert_eq!(query.components(), ["share", "nipy", "nipy", "exampledata"]);
    }

    #[test]
    fn test_report_serialization() {
        let report = PipelineReport {
            packages: vec![PackageReport {
                package_dir: "pkgs/exampledata".into(),
                archives: vec!["pkgs/exampledata/dist/nipy-exampledata-1.2.tar.gz".into()],
                package_name: "exampledata".to_string(),
                version: "1.2".to_string(),
                build_duration_ms: 10,
                verify_duration_ms: 20,
            }],
            total_duration_ms: 30,
        };

        let json = serde_json::to_string(&report).unwrap();
        let back: PipelineReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.archives(), report.archives());
        assert_eq!(back.packages[0].version, "1.2");
    }
}
