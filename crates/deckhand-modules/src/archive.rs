//! Module package archive handling
//!
//! Module packages are gzip-compressed tarballs with a single root directory:
//!
//! ```text
//! pkg/
//! pkg/companion/manifest.json
//! pkg/companion/HELP.md
//! pkg/main.js
//! ```
//!
//! The archive is decompressed once into memory and then walked twice: a
//! manifest pass that stops as soon as `companion/manifest.json` has been
//! parsed, and an extraction pass that writes every entry below the
//! destination with the root directory stripped.

use bytes::Bytes;
use deckhand_core::types::{ModuleManifest, MANIFEST_PATH};
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while reading or extracting a module archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The data is not valid gzip
    #[error("Failed to uncompress data: {0}")]
    Decompress(#[source] std::io::Error),

    /// The tar stream is malformed
    #[error("Failed to read archive: {0}")]
    Tar(#[source] std::io::Error),

    /// The manifest was found but failed validation
    #[error("Invalid module manifest: {0}")]
    InvalidManifest(#[from] deckhand_core::Error),

    /// An entry would be written outside the destination directory
    #[error("Unsafe path in archive: {0}")]
    UnsafePath(String),

    /// Writing an entry to disk failed
    #[error("Failed to extract archive: {0}")]
    Extract(#[source] std::io::Error),

    /// The blocking worker panicked or was cancelled
    #[error("Archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A decompressed module package held in memory
#[derive(Debug, Clone)]
pub struct ModuleArchive {
    tar_data: Bytes,
}

impl ModuleArchive {
    /// Decompress gzip data into an in-memory tar archive
    pub async fn decompress(data: Bytes) -> Result<Self, ArchiveError> {
        let tar_data = tokio::task::spawn_blocking(move || decompress(&data)).await??;
        debug!("Decompressed module archive ({} bytes)", tar_data.len());
        Ok(Self {
            tar_data: Bytes::from(tar_data),
        })
    }

    /// Wrap already-decompressed tar data
    pub fn from_tar(tar_data: impl Into<Bytes>) -> Self {
        Self {
            tar_data: tar_data.into(),
        }
    }

    /// Size of the decompressed tar stream
    pub fn len(&self) -> usize {
        self.tar_data.len()
    }

    /// Whether the tar stream is empty
    pub fn is_empty(&self) -> bool {
        self.tar_data.is_empty()
    }

    /// Find and parse the module manifest, `None` if the archive has none
    pub async fn read_manifest(&self) -> Result<Option<ModuleManifest>, ArchiveError> {
        let data = self.tar_data.clone();
        tokio::task::spawn_blocking(move || extract_manifest_from_tar(&data)).await?
    }

    /// Extract the archive below `dest`, removing `dest` again on failure
    pub async fn extract_to(&self, dest: &Path) -> Result<(), ArchiveError> {
        if let Err(e) = tokio::fs::create_dir_all(dest).await {
            remove_dir_best_effort(dest).await;
            return Err(ArchiveError::Extract(e));
        }

        let data = self.tar_data.clone();
        let target = dest.to_path_buf();
        let result = tokio::task::spawn_blocking(move || extract_to_dir(&data, &target))
            .await
            .map_err(ArchiveError::from)
            .and_then(|r| r);

        if let Err(e) = result {
            warn!("Extraction into {:?} failed: {}", dest, e);
            remove_dir_best_effort(dest).await;
            return Err(e);
        }

        Ok(())
    }
}

/// Decompress a gzip buffer fully into memory
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(ArchiveError::Decompress)?;
    Ok(out)
}

/// Locate `companion/manifest.json` in a tar stream and parse it
///
/// The first entry is taken to be the root directory of the package and its
/// name is stripped from every entry before matching. When the first entry is
/// not a directory nothing is stripped.
pub fn extract_manifest_from_tar(tar_data: &[u8]) -> Result<Option<ModuleManifest>, ArchiveError> {
    let mut archive = Archive::new(Cursor::new(tar_data));
    let mut root_dir: Option<Option<String>> = None;

    for entry in archive.entries().map_err(ArchiveError::Tar)? {
        let mut entry = entry.map_err(ArchiveError::Tar)?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let is_dir = entry.header().entry_type().is_dir();

        let root = root_dir.get_or_insert_with(|| {
            if is_dir {
                let mut root = name.clone();
                if !root.ends_with('/') {
                    root.push('/');
                }
                Some(root)
            } else {
                None
            }
        });

        let filename = match root {
            Some(prefix) if name.starts_with(prefix.as_str()) => &name[prefix.len()..],
            _ => name.as_str(),
        };

        if filename == MANIFEST_PATH {
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(ArchiveError::Tar)?;
            let manifest = ModuleManifest::from_slice(&content)?;
            debug!("Found manifest for {} v{}", manifest.id, manifest.version);
            return Ok(Some(manifest));
        }
    }

    Ok(None)
}

/// Extract every entry of a tar stream below `dest`, stripping the first path component
pub fn extract_to_dir(tar_data: &[u8], dest: &Path) -> Result<(), ArchiveError> {
    let mut archive = Archive::new(Cursor::new(tar_data));

    for entry in archive.entries().map_err(ArchiveError::Tar)? {
        let mut entry = entry.map_err(ArchiveError::Tar)?;
        let path = entry.path().map_err(ArchiveError::Tar)?.into_owned();

        let relative = match strip_first_component(&path)? {
            Some(relative) => relative,
            None => continue,
        };
        let target = dest.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(ArchiveError::Extract)?;
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(ArchiveError::Extract)?;
            }
            entry.unpack(&target).map_err(ArchiveError::Extract)?;
        } else {
            debug!("Skipping {:?} entry {:?}", entry_type, path);
        }
    }

    Ok(())
}

/// Drop the leading component of an archive path, rejecting anything that
/// could escape the destination. Returns `None` for the root entry itself.
fn strip_first_component(path: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir));
    components.next();

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return Err(ArchiveError::UnsafePath(path.display().to_string())),
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}

/// Recursively remove a directory, logging instead of failing
pub async fn remove_dir_best_effort(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed {:?}", dir),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", dir, e),
    }
}
