//! Artifact store seam and the in-memory backend.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::core::ArtifactEntry;
use crate::errors::StoreError;

/// Byte and metadata storage behind the [`super::ArtifactRegistry`].
///
/// The registry serializes all calls that mutate a given id.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores bytes and metadata for `entry.id`, replacing anything there.
    async fn put(&self, entry: &ArtifactEntry, bytes: &[u8]) -> Result<(), StoreError>;

    /// Returns the bytes for `id`, or `None` if absent.
    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Returns true if bytes are stored for `id`.
    async fn contains(&self, id: &str) -> Result<bool, StoreError>;

    /// Deletes `id`. Deleting an absent id succeeds.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// Lists every persisted entry, in no particular order.
    async fn list(&self) -> Result<Vec<ArtifactEntry>, StoreError>;
}

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactStore {
    entries: Arc<DashMap<String, (ArtifactEntry, Arc<[u8]>)>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, entry: &ArtifactEntry, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries
            .insert(entry.id.clone(), (entry.clone(), Arc::from(bytes)));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(id).map(|e| e.value().1.to_vec()))
    }

    async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.entries.contains_key(id))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.entries.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ArtifactEntry>, StoreError> {
        Ok(self.entries.iter().map(|e| e.value().0.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactMeta;
    use chrono::Utc;

    fn entry(id: &str) -> ArtifactEntry {
        ArtifactEntry {
            id: id.to_string(),
            name: "foo-1.0.0.tgz".to_string(),
            size_bytes: 3,
            integrity: None,
            created_at: Utc::now(),
            meta: ArtifactMeta::new("foo", "1.0.0"),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryArtifactStore::new();
        store.put(&entry("a"), b"abc").await.unwrap();

        assert_eq!(store.get("a").await.unwrap().as_deref(), Some(&b"abc"[..]));
        assert!(store.contains("a").await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
