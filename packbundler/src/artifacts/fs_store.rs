//! Durable filesystem store.
//!
//! Layout: `<root>/<id>/blob` holds the archive, `<root>/<id>/meta.json` the
//! entry. Both are written to a temp file and renamed into place, so a crash
//! never leaves a half-written file under its final name.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

use super::ArtifactStore;
use crate::core::ArtifactEntry;
use crate::errors::StoreError;

const BLOB_FILE: &str = "blob";
const META_FILE: &str = "meta.json";

/// Artifact store persisted under a directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(StoreError::Corrupt {
                id: id.to_string(),
                reason: "id is not a valid directory name".to_string(),
            });
        }
        Ok(self.root.join(id))
    }

    async fn read_entry(&self, dir: &Path) -> Result<ArtifactEntry, StoreError> {
        let path = dir.join(META_FILE);
        let raw = fs::read(&path)
            .await
            .map_err(|source| StoreError::Io { path, source })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)
        .await
        .map_err(|source| StoreError::Io {
            path: temp_path.clone(),
            source,
        })?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, entry: &ArtifactEntry, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = self.entry_dir(&entry.id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        // Blob first: an entry with metadata but no blob is swept on hydrate.
        write_atomic(&dir.join(BLOB_FILE), bytes).await?;
        write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(entry)?).await
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_dir(id)?.join(BLOB_FILE);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.entry_dir(id)?.join(BLOB_FILE);
        fs::try_exists(&path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let dir = self.entry_dir(id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path: dir, source }),
        }
    }

    async fn list(&self) -> Result<Vec<ArtifactEntry>, StoreError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await.map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })? {
            let path = item.path();
            if !item.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            match self.read_entry(&path).await {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable artifact metadata"),
            }
        }
        Ok(entries)
    }
}
