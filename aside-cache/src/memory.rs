//! In-memory cache store with TTL expiry.
//!
//! A process-local [`CacheStore`] implementation backed by a `HashMap`.
//! Entries expire passively: an entry past its deadline is dropped the
//! next time it is read. Suitable as a local cache for a single process
//! and as the reference store in tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use aside_core::{CacheStoreError, RawValue};
use async_trait::async_trait;

use crate::key::CacheKey;
use crate::traits::{CacheStats, CacheStore};

/// A stored value and its expiry deadline.
#[derive(Debug, Clone)]
struct StoredEntry {
    value: RawValue,
    /// `None` means the deadline overflowed the clock; treat as never.
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// In-memory cache store.
///
/// Thread-safe via an interior `RwLock`; a poisoned lock is reported as
/// [`CacheStoreError::Unavailable`] rather than panicking, so a crashed
/// writer degrades the cache instead of the callers.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    stats: RwLock<CacheStats>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live (non-expired) entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        entries
            .get(key.as_str())
            .map(|e| !e.is_expired(Instant::now()))
            .unwrap_or(false)
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of hit/miss/expiry statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn record<F: FnOnce(&mut CacheStats)>(&self, update: F) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn unavailable(reason: &str) -> CacheStoreError {
        CacheStoreError::Unavailable {
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<RawValue>, CacheStoreError> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::unavailable("entry lock poisoned"))?;

        match entries.get(key.as_str()) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                self.record(|s| s.hits += 1);
                Ok(Some(value))
            }
            Some(_) => {
                entries.remove(key.as_str());
                self.record(|s| {
                    s.misses += 1;
                    s.expirations += 1;
                    s.entry_count = s.entry_count.saturating_sub(1);
                });
                Ok(None)
            }
            None => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
        }
    }

    async fn set(
        &self,
        key: &CacheKey,
        value: RawValue,
        ttl: Duration,
    ) -> Result<(), CacheStoreError> {
        let entry = StoredEntry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::unavailable("entry lock poisoned"))?;

        if entries.insert(key.as_str().to_string(), entry).is_none() {
            self.record(|s| s.entry_count += 1);
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheStoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::unavailable("entry lock poisoned"))?;

        if entries.remove(key.as_str()).is_some() {
            self.record(|s| s.entry_count = s.entry_count.saturating_sub(1));
        }
        Ok(())
    }
}
