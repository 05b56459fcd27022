//! The artifact registry: records, retrieval handles and expiry.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ArtifactStore, RetentionPolicy};
use crate::config::BundlerConfig;
use crate::core::{ArtifactEntry, ArtifactMeta, ArtifactRecord, RetrievalHandle};
use crate::errors::{ArtifactError, StoreError};
use crate::utils::{generate_artifact_id, generate_retrieval_handle, sri_sha512};

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, ArtifactRecord>,
    handles: HashMap<RetrievalHandle, String>,
}

impl State {
    fn insert(&mut self, record: ArtifactRecord) {
        self.handles
            .insert(record.retrieval_handle.clone(), record.id().to_string());
        self.records.insert(record.id().to_string(), record);
    }

    fn take(&mut self, id: &str) -> Option<ArtifactRecord> {
        let record = self.records.remove(id)?;
        self.handles.remove(&record.retrieval_handle);
        Some(record)
    }
}

struct Inner {
    store: Arc<dyn ArtifactStore>,
    retention: RetentionPolicy,
    state: RwLock<State>,
    timers: DashMap<String, JoinHandle<()>>,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for timer in self.timers.iter() {
            timer.value().abort();
        }
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

/// Owns every produced artifact until it expires or is removed.
///
/// Cloning is cheap and shares the same registry. A record and its retrieval
/// handle are inserted and revoked together under one lock, and bytes are
/// only deleted while that lock is held exclusively, so a handle that
/// resolves always has bytes behind it.
///
/// Expiry is enforced three ways: a timer per record, a periodic sweep
/// ([`ArtifactRegistry::spawn_sweeper`]) and a check on every read.
#[derive(Clone)]
pub struct ArtifactRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactRegistry")
            .field("retention", &self.inner.retention)
            .field("timers", &self.inner.timers.len())
            .finish_non_exhaustive()
    }
}

impl ArtifactRegistry {
    /// Creates an empty registry over `store`. Call [`Self::hydrate`] to load persisted entries.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, retention: RetentionPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                retention,
                state: RwLock::new(State::default()),
                timers: DashMap::new(),
                sweeper: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Creates an empty registry over `store` with `config.retention`.
    #[must_use]
    pub fn from_config(store: Arc<dyn ArtifactStore>, config: &BundlerConfig) -> Self {
        Self::new(store, config.retention)
    }

    /// The retention policy in force.
    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        self.inner.retention
    }

    /// Loads persisted entries, dropping expired or blob-less ones.
    ///
    /// Restored records get fresh handles; handles from a previous process
    /// are never valid again. Returns the number of records restored.
    pub async fn hydrate(&self) -> Result<usize, ArtifactError> {
        let entries = self.inner.store.list().await?;
        let now = Utc::now();
        let mut restored = Vec::new();

        let mut state = self.inner.state.write().await;
        for entry in entries {
            if state.records.contains_key(&entry.id) {
                continue;
            }

            let expired = self.inner.retention.is_expired(entry.created_at, now);
            if expired || !self.inner.store.contains(&entry.id).await? {
                debug!(id = %entry.id, expired, "dropping stale artifact on hydrate");
                self.inner.store.delete(&entry.id).await?;
                continue;
            }

            let record = ArtifactRecord {
                entry,
                retrieval_handle: generate_retrieval_handle(),
            };
            restored.push((record.id().to_string(), record.created_at()));
            state.insert(record);
        }
        drop(state);

        for (id, created_at) in &restored {
            self.schedule_expiry(id, *created_at);
        }

        info!(restored = restored.len(), "artifact registry hydrated");
        Ok(restored.len())
    }

    /// Stores `bytes` and registers a new record for them.
    pub async fn register(
        &self,
        bytes: Vec<u8>,
        name: impl Into<String>,
        meta: ArtifactMeta,
    ) -> Result<ArtifactRecord, ArtifactError> {
        let created_at = Utc::now();
        let integrity = sri_sha512(&bytes);

        let mut state = self.inner.state.write().await;
        let mut id = generate_artifact_id(created_at);
        while state.records.contains_key(&id) {
            id = generate_artifact_id(created_at);
        }

        let record = ArtifactRecord {
            entry: ArtifactEntry {
                id,
                name: name.into(),
                size_bytes: bytes.len() as u64,
                integrity: Some(integrity),
                created_at,
                meta,
            },
            retrieval_handle: generate_retrieval_handle(),
        };

        self.inner.store.put(&record.entry, &bytes).await?;
        state.insert(record.clone());
        drop(state);

        self.schedule_expiry(record.id(), created_at);

        info!(
            id = %record.id(),
            name = %record.name(),
            size_bytes = record.entry.size_bytes,
            package = %record.meta().package,
            version = %record.meta().version,
            "artifact registered"
        );
        Ok(record)
    }

    /// Revokes the handle and deletes the bytes of `id`.
    ///
    /// Returns false if there was no such record.
    pub async fn remove(&self, id: &str) -> Result<bool, ArtifactError> {
        self.remove_inner(id, true).await
    }

    /// Live records, newest first. Expired records are removed on the way.
    pub async fn list(&self) -> Vec<ArtifactRecord> {
        self.sweep_expired().await;

        let state = self.inner.state.read().await;
        let mut records: Vec<_> = state.records.values().cloned().collect();
        drop(state);

        records.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });
        records
    }

    /// Number of live records, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.inner.state.read().await.records.len()
    }

    /// Returns true if no records are held.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Looks up a live record by id.
    pub async fn get(&self, id: &str) -> Option<ArtifactRecord> {
        let record = self.inner.state.read().await.records.get(id).cloned()?;
        self.live(record).await
    }

    /// Dedup lookup: the newest live record for exactly `package@version`.
    pub async fn find(&self, package: &str, version: &str) -> Option<ArtifactRecord> {
        let record = {
            let state = self.inner.state.read().await;
            state
                .records
                .values()
                .filter(|r| r.meta().describes(package, version))
                .max_by_key(|r| r.created_at())
                .cloned()
        }?;
        self.live(record).await
    }

    /// Reads the bytes behind a retrieval handle.
    pub async fn open(&self, handle: &RetrievalHandle) -> Result<Vec<u8>, ArtifactError> {
        let not_found = || ArtifactError::NotFound {
            key: handle.to_string(),
        };

        let state = self.inner.state.read().await;
        let record = state
            .handles
            .get(handle)
            .and_then(|id| state.records.get(id))
            .ok_or_else(not_found)?;

        if self.is_expired(record) {
            let id = record.id().to_string();
            drop(state);
            self.expire(&id).await;
            return Err(not_found());
        }

        // The read lock is held across the store read; removal needs the
        // write lock before it may delete bytes.
        let bytes = self.inner.store.get(record.id()).await?;
        bytes.ok_or_else(|| {
            ArtifactError::Store(StoreError::Corrupt {
                id: record.id().to_string(),
                reason: "blob missing for a live record".to_string(),
            })
        })
    }

    /// Removes every record. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, ArtifactError> {
        let mut state = self.inner.state.write().await;
        let ids: Vec<String> = state.records.keys().cloned().collect();

        for id in &ids {
            state.take(id);
            if let Some((_, timer)) = self.inner.timers.remove(id) {
                timer.abort();
            }
            self.inner.store.delete(id).await?;
        }
        drop(state);

        info!(removed = ids.len(), "artifact registry cleared");
        Ok(ids.len())
    }

    /// Removes every expired record. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let expired: Vec<String> = {
            let state = self.inner.state.read().await;
            state
                .records
                .values()
                .filter(|r| self.is_expired(r))
                .map(|r| r.id().to_string())
                .collect()
        };

        let mut removed = 0;
        for id in &expired {
            match self.remove_inner(id, true).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(id = %id, error = %e, "failed to remove expired artifact"),
            }
        }

        if removed > 0 {
            debug!(removed, "expired artifacts swept");
        }
        removed
    }

    /// Starts a background task that sweeps every `interval`.
    ///
    /// Replaces any previous sweeper. Returns false outside a Tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> bool {
        let Ok(rt) = Handle::try_current() else {
            warn!("no Tokio runtime; periodic artifact sweep disabled");
            return false;
        };

        let weak = Arc::downgrade(&self.inner);
        let task = rt.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = Self::upgrade(&weak) else {
                    break;
                };
                registry.sweep_expired().await;
            }
        });

        if let Some(previous) = self.inner.sweeper.lock().replace(task) {
            previous.abort();
        }
        true
    }

    /// Stops all timers and the sweeper. Records and bytes stay in place.
    pub fn teardown(&self) {
        let ids: Vec<String> = self.inner.timers.iter().map(|t| t.key().clone()).collect();
        for id in ids {
            if let Some((_, timer)) = self.inner.timers.remove(&id) {
                timer.abort();
            }
        }
        if let Some(sweeper) = self.inner.sweeper.lock().take() {
            sweeper.abort();
        }
        debug!("artifact registry torn down");
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn is_expired(&self, record: &ArtifactRecord) -> bool {
        self.inner
            .retention
            .is_expired(record.created_at(), Utc::now())
    }

    async fn live(&self, record: ArtifactRecord) -> Option<ArtifactRecord> {
        if self.is_expired(&record) {
            self.expire(record.id()).await;
            None
        } else {
            Some(record)
        }
    }

    async fn expire(&self, id: &str) {
        if let Err(e) = self.remove_inner(id, true).await {
            warn!(id = %id, error = %e, "failed to remove expired artifact");
        }
    }

    // `abort_timer` is false when called from the timer task itself, which
    // must not abort its own remaining work.
    async fn remove_inner(&self, id: &str, abort_timer: bool) -> Result<bool, ArtifactError> {
        let mut state = self.inner.state.write().await;
        let Some(record) = state.take(id) else {
            drop(state);
            self.forget_timer(id, abort_timer);
            return Ok(false);
        };

        // A record whose bytes could not be deleted stays registered, handle
        // included, so a later sweep or remove can retry.
        if let Err(e) = self.inner.store.delete(id).await {
            state.insert(record);
            return Err(e.into());
        }
        drop(state);
        self.forget_timer(id, abort_timer);

        info!(id = %id, name = %record.name(), "artifact removed");
        Ok(true)
    }

    fn forget_timer(&self, id: &str, abort: bool) {
        if let Some((_, timer)) = self.inner.timers.remove(id) {
            if abort {
                timer.abort();
            }
        }
    }

    fn schedule_expiry(&self, id: &str, created_at: chrono::DateTime<Utc>) {
        let Some(delay) = self.inner.retention.remaining(created_at, Utc::now()) else {
            return;
        };
        let Ok(rt) = Handle::try_current() else {
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        let timer_id = id.to_string();
        let task = rt.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(registry) = Self::upgrade(&weak) {
                if let Err(e) = registry.remove_inner(&timer_id, false).await {
                    warn!(id = %timer_id, error = %e, "expiry timer failed to remove artifact");
                }
            }
        });

        if let Some(previous) = self.inner.timers.insert(id.to_string(), task) {
            previous.abort();
        }
    }
}
