use crate::model::{ArchiveFormat, DataSourceHandle, DataSourceQuery};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("Failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' exited with {}", .status.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    Failed { command: String, status: Option<i32> },
    #[error("'{command}' timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("No data package {name} under any of [{searched}]")]
    NotFound { name: String, searched: String },
    #[error("Data package at {} has no {}", .root.display(), .config.display())]
    MissingConfig { root: PathBuf, config: PathBuf },
    #[error("No version in [DEFAULT] section of {}", .config.display())]
    MissingVersion { config: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build and install capability of a package toolchain.
///
/// Both operations run with an explicit working directory; implementations
/// must not change the process-wide current directory.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Produces one source archive per format under `pkg_dir/dist`.
    async fn build(&self, pkg_dir: &Path, formats: &[ArchiveFormat]) -> Result<(), ToolchainError>;

    /// Installs the unpacked package in `src_dir` below `prefix`.
    async fn install(&self, src_dir: &Path, prefix: &Path) -> Result<(), ToolchainError>;
}

/// Resource lookup of the consuming application.
#[async_trait]
pub trait DataSourceLookup: Send + Sync {
    async fn lookup(&self, query: &DataSourceQuery) -> Result<DataSourceHandle, LookupError>;
}
