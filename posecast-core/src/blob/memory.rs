use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;
use tracing::debug;

use super::{BlobStore, ttl_seconds};
use crate::error::BlobError;

#[derive(Debug, Clone)]
struct StoredBlob {
    value: Arc<[u8]>,
    expires_at: Instant,
}

impl StoredBlob {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

const DEFAULT_SWEEP_EVERY: usize = 64;

/// In-process blob cache with the same expiry rules as the Redis store.
///
/// Expired entries are invisible to readers straight away. Entries nobody
/// reads again are reclaimed by a sweep that runs on every
/// `sweep_every`-th write.
#[derive(Debug)]
pub struct MemoryBlobStore {
    entries: DashMap<String, StoredBlob>,
    writes: AtomicUsize,
    sweep_every: usize,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicUsize::new(0),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweeps expired entries once every `writes` calls to `set`.
    pub fn with_sweep_every(mut self, writes: usize) -> Self {
        self.sweep_every = writes.max(1);
        self
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, blob| !blob.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn maybe_sweep(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.sweep_every != 0 {
            return;
        }
        let removed = self.purge_expired();
        if removed > 0 {
            debug!("Blob cache sweep removed {} expired entries", removed);
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), BlobError> {
        // Must run before `entry` takes the shard lock.
        self.maybe_sweep();

        let now = Instant::now();
        let blob = StoredBlob {
            value: Arc::from(value),
            expires_at: now + Duration::from_secs(ttl_seconds(ttl)),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Err(BlobError::KeyExists(key.to_string()));
                }
                occupied.insert(blob);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(blob);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let now = Instant::now();
        let hit = self.entries.get(key).map(|blob| {
            if blob.is_expired(now) {
                None
            } else {
                Some(blob.value.to_vec())
            }
        });

        match hit {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries
                    .remove_if(key, |_, blob| blob.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
