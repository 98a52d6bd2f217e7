//! Install verification for a single built archive.
//!
//! The archive is unpacked into a fresh temporary root, installed with that
//! root as prefix, and then looked up through a [`DataSourceLookup`]. The
//! temporary root is owned by a [`tempfile::TempDir`] and disappears when the
//! verification returns, whichever step failed.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::DataSourceQuery;
use crate::traits::{DataSourceLookup, LookupError, Toolchain, ToolchainError};
use crate::validate::extract::{self, ExtractError};

/// `nipy-<name>-<major>.<minor>` as produced by data package builds.
static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"nipy-(\w+)-\d+\.\d+").expect("package name pattern is valid")
});

const INSTALL_ROOT_PREFIX: &str = "datapkg-install-";

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Could not get package name from {}", .0.display())]
    PackageName(PathBuf),

    #[error("No directory created by package unpack")]
    NothingUnpacked,

    #[error("Expecting only one directory, got {}", .0.join(";"))]
    AmbiguousUnpack(Vec<String>),

    #[error("Unpacked entry {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Install toolchain failed: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("Installed package is not discoverable: {0}")]
    Lookup(#[from] LookupError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedInstall {
    pub package_name: String,
    pub version: String,
}

/// Recovers the package name from an archive file name.
///
/// Only the last extension is removed before matching, so
/// `nipy-exampledata-1.2.tar.gz` yields `exampledata`.
pub fn package_name(archive_path: &Path) -> Result<String, InstallError> {
    let stem = archive_path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .ok_or_else(|| InstallError::PackageName(archive_path.to_path_buf()))?;

    PACKAGE_NAME
        .captures(&stem)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| InstallError::PackageName(archive_path.to_path_buf()))
}

/// Top-level entries of `dir`, skipping hidden names, sorted by name.
async fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>, InstallError> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Checks that `archive_path` installs into a discoverable data package.
///
/// The temporary install root is created under the system temp directory.
pub async fn verify_install<T, L>(
    toolchain: &T,
    lookup: &L,
    archive_path: &Path,
) -> Result<VerifiedInstall, InstallError>
where
    T: Toolchain + ?Sized,
    L: DataSourceLookup + ?Sized,
{
    verify_install_in(toolchain, lookup, archive_path, &std::env::temp_dir()).await
}

/// Like [`verify_install`], with the temporary install root created inside
/// `temp_parent`.
pub async fn verify_install_in<T, L>(
    toolchain: &T,
    lookup: &L,
    archive_path: &Path,
    temp_parent: &Path,
) -> Result<VerifiedInstall, InstallError>
where
    T: Toolchain + ?Sized,
    L: DataSourceLookup + ?Sized,
{
    let package_name = package_name(archive_path)?;
    let archive = std::path::absolute(archive_path)?;

    let install_root = tempfile::Builder::new()
        .prefix(INSTALL_ROOT_PREFIX)
        .tempdir_in(temp_parent)?;
    let root = install_root.path().to_path_buf();
    info!(
        package = %package_name,
        archive = %archive.display(),
        root = %root.display(),
        "Verifying install"
    );

    let target = root.clone();
    tokio::task::spawn_blocking(move || extract::extract(&archive, &target))
        .await
        .map_err(|e| InstallError::Io(std::io::Error::other(e)))??;

    let mut unpacked = visible_entries(&root).await?;
    let src_dir = match unpacked.len() {
        0 => return Err(InstallError::NothingUnpacked),
        1 => unpacked.remove(0),
        _ => {
            return Err(InstallError::AmbiguousUnpack(
                unpacked
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect(),
            ))
        }
    };
    if !tokio::fs::metadata(&src_dir).await?.is_dir() {
        return Err(InstallError::NotADirectory(src_dir));
    }
    debug!(src_dir = %src_dir.display(), "Unpacked package directory");

    toolchain.install(&src_dir, &root).await?;

    let handle = lookup
        .lookup(&DataSourceQuery::nipy(package_name.clone(), vec![root]))
        .await?;
    info!(
        package = %package_name,
        version = %handle.version,
        "Installed package is discoverable"
    );

    install_root.close()?;
    Ok(VerifiedInstall {
        package_name,
        version: handle.version,
    })
}
