//! In-process coordination store
//!
//! DashMap-backed implementation of the coordination primitives. Keys expire
//! lazily on access; a periodic sweeper reclaims entries nobody touches
//! again. A single shard lock covers each key, which makes every primitive
//! atomic per key.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{
    CoordinationError, CoordinationResult, CoordinationStore, DeleteOutcome, SetOutcome,
};

struct StoredEntry {
    value: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory coordination store
pub struct MemoryCoordinationStore {
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Remove every expired entry
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Swept {} expired coordination keys", removed);
        }
        removed
    }

    /// Spawn a background task sweeping expired entries at the given period
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }

    fn parse_counter(key: &str, value: &str) -> CoordinationResult<i64> {
        value.parse().map_err(|_| CoordinationError::CorruptCounter {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

impl Default for MemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CoordinationResult<SetOutcome> {
        let new_entry = StoredEntry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(new_entry);
                    Ok(SetOutcome::Created)
                } else {
                    Ok(SetOutcome::Exists)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(new_entry);
                Ok(SetOutcome::Created)
            }
        }
    }

    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> CoordinationResult<DeleteOutcome> {
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired() => Ok(DeleteOutcome::Deleted),
            _ => Ok(DeleteOutcome::Absent),
        }
    }

    async fn increment_with_ttl(&self, key: &str, ttl_if_new: Duration) -> CoordinationResult<i64> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredEntry {
                        value: "1".to_string(),
                        expires_at: Instant::now() + ttl_if_new,
                    });
                    Ok(1)
                } else {
                    let next = Self::parse_counter(key, &occupied.get().value)? + 1;
                    occupied.get_mut().value = next.to_string();
                    Ok(next)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value: "1".to_string(),
                    expires_at: Instant::now() + ttl_if_new,
                });
                Ok(1)
            }
        }
    }

    async fn decrement(&self, key: &str) -> CoordinationResult<i64> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    Ok(0)
                } else {
                    let next = (Self::parse_counter(key, &occupied.get().value)? - 1).max(0);
                    occupied.get_mut().value = next.to_string();
                    Ok(next)
                }
            }
            Entry::Vacant(_) => Ok(0),
        }
    }
}
