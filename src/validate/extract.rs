//! Archive extraction for built source distributions.
//!
//! Zip files are recognised by their `.zip` suffix; everything else is read as
//! a tar stream whose compression (none, gzip, bzip2 or xz) is sniffed from the
//! leading bytes. Unix `compress` streams are rejected.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;
use xz2::read::XzDecoder;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(&'static str),

    #[error("Archive error: {0}")]
    Archive(String),
}

/// Compression wrapped around a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

fn sniff_compression(magic: &[u8]) -> Result<Compression, ExtractError> {
    match magic {
        [0x1f, 0x8b, ..] => Ok(Compression::Gzip),
        [b'B', b'Z', b'h', ..] => Ok(Compression::Bzip2),
        [0x1f, 0x9d, ..] => Err(ExtractError::UnsupportedCompression("unix compress (.Z)")),
        [0xfd, b'7', b'z', b'X', b'Z', 0x00, ..] => Ok(Compression::Xz),
        _ => Ok(Compression::None),
    }
}

/// Extracts `archive_path` into `target_dir`, creating it if needed.
pub fn extract(archive_path: &Path, target_dir: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(target_dir)?;

    let is_zip = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().ends_with(".zip"))
        .unwrap_or(false);

    if is_zip {
        extract_zip(archive_path, target_dir)
    } else {
        extract_tar(archive_path, target_dir)
    }
}

fn extract_zip(archive_path: &Path, target_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let relative_path = entry.enclosed_name().ok_or_else(|| {
            ExtractError::Archive(format!("Invalid path in archive: {}", entry.name()))
        })?;
        let out_path = target_dir.join(relative_path);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
    }

    debug!(
        entries = archive.len(),
        archive = %archive_path.display(),
        "Extracted zip archive"
    );
    Ok(())
}

fn extract_tar(archive_path: &Path, target_dir: &Path) -> Result<(), ExtractError> {
    let mut reader = BufReader::new(File::open(archive_path)?);
    let compression = sniff_compression(reader.fill_buf()?)?;

    match compression {
        Compression::None => unpack_tar(reader, target_dir)?,
        Compression::Gzip => unpack_tar(GzDecoder::new(reader), target_dir)?,
        Compression::Bzip2 => unpack_tar(BzDecoder::new(reader), target_dir)?,
        Compression::Xz => unpack_tar(XzDecoder::new(reader), target_dir)?,
    }

    debug!(
        ?compression,
        archive = %archive_path.display(),
        "Extracted tar archive"
    );
    Ok(())
}

fn unpack_tar<R: Read>(reader: R, target_dir: &Path) -> Result<(), ExtractError> {
    let mut archive = tar::Archive::new(reader);
    archive
        .unpack(target_dir)
        .map_err(|e| ExtractError::Archive(e.to_string()))
}
