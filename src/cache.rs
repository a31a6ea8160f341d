//! In-memory TTL cache of canonical results
//!
//! The cache never calls a provider; the orchestrator owns the read-through
//! pattern. Expired entries are deleted when read and purged by sweeps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::DEFAULT_CACHE_MAX_ENTRIES;
use crate::request::Fingerprint;
use crate::types::CanonicalResult;

/// A stored result; replaced, never mutated, on refresh
#[derive(Debug, Clone)]
struct CacheEntry {
    value: CanonicalResult,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// TTL-keyed store of normalized provider results
pub struct ResponseCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    max_entries: usize,
}

impl ResponseCache {
    /// Creates a cache with the default size bound
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_CACHE_MAX_ENTRIES)
    }

    /// Creates a cache holding at most `max_entries` results
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Gets a live entry
    ///
    /// Returns `None` when the key is absent or its TTL has elapsed; an
    /// expired entry is removed rather than served stale.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<CanonicalResult> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        // Another writer may have refreshed the key between the two locks.
        if let Some(entry) = entries.get(fingerprint) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
            entries.remove(fingerprint);
            debug!(%fingerprint, "Evicted expired cache entry on read");
        }
        None
    }

    /// Stores a result for `ttl`; the last writer for a key wins
    pub async fn put(&self, fingerprint: Fingerprint, value: CanonicalResult, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&fingerprint) && entries.len() >= self.max_entries {
            entries.retain(|_, entry| !entry.is_expired(now));

            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.stored_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                value,
                stored_at: now,
                ttl,
            },
        );
    }

    /// Removes one entry
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.write().await.remove(fingerprint).is_some()
    }

    /// Removes every expired entry, returning how many were purged
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Drops every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Starts a background task that sweeps every `interval`
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            info!(
                sweep_interval_secs = interval.as_secs(),
                "Starting response cache sweeper"
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = cache.sweep().await;
                if purged > 0 {
                    debug!(purged, "Swept expired cache entries");
                }
            }
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
