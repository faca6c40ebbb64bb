//! Day-indexed snapshot artifacts on the local filesystem.
//!
//! # File Layout
//!
//! | File | Content |
//! |------|---------|
//! | `{day}-image.png` | Rendered canvas |
//! | `{day}-metadata.json` | Metadata record |
//! | `{day}-metadata-ipfs.txt` | `ipfs://` URI of the published metadata |

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pixels_core::source::{ArtifactSink, StoreError};
use pixels_types::Day;

/// File name of the rendered image for `day`.
pub fn image_file_name(day: Day) -> String {
    format!("{day}-image.png")
}

/// File name of the metadata text for `day`.
pub fn metadata_file_name(day: Day) -> String {
    format!("{day}-metadata.json")
}

/// File name of the published-metadata reference for `day`.
pub fn metadata_reference_file_name(day: Day) -> String {
    format!("{day}-metadata-ipfs.txt")
}

/// Writes snapshot artifacts into a single directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
}

impl LocalArtifactStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the artifacts.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write(&self, name: String, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[async_trait]
impl ArtifactSink for LocalArtifactStore {
    async fn write_image(&self, day: Day, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        self.write(image_file_name(day), bytes).await
    }

    async fn write_metadata(&self, day: Day, text: &str) -> Result<PathBuf, StoreError> {
        self.write(metadata_file_name(day), text.as_bytes()).await
    }

    async fn write_metadata_reference(&self, day: Day, uri: &str) -> Result<PathBuf, StoreError> {
        self.write(metadata_reference_file_name(day), uri.as_bytes())
            .await
    }
}
