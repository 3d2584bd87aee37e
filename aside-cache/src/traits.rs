//! Collaborator contracts and the cacheable entity marker.
//!
//! The accessor depends on two abstract capability interfaces - a cache
//! store and a repository - never on concrete implementations. Adapters
//! are injected at construction.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use aside_core::{CacheStoreError, RawValue, RepositoryError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::key::CacheKey;

/// Marker trait for domain entities the accessor can cache.
///
/// The accessor treats entities as opaque payloads it can serialize,
/// deserialize, and address by identity. Attributes beyond identity are
/// domain-specific and irrelevant here.
///
/// # Implementation Requirements
///
/// - `type_tag()` must return the same value for all instances, must be
///   non-empty, and must not contain `:` (the key separator). Tags must be
///   unique among entity types sharing one cache store.
/// - `id()` must return the unique immutable identifier. Its `Display`
///   rendering must be injective: distinct ids must render distinctly.
pub trait CacheEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identifier type for this entity.
    type Id: fmt::Display + Clone + Eq + Hash + Send + Sync + 'static;

    /// Stable type tag used to namespace cache keys.
    fn type_tag() -> &'static str;

    /// Get the unique identifier for this entity.
    fn id(&self) -> Self::Id;
}

/// Key/value cache store contract.
///
/// No ordering or transactional guarantees are assumed. Every call may
/// fail independently; the accessor treats all failures as soft.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a raw value from the cache, or `None` if absent or expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<RawValue>, CacheStoreError>;

    /// Store a raw value under `key` for at most `ttl`.
    async fn set(&self, key: &CacheKey, value: RawValue, ttl: Duration)
        -> Result<(), CacheStoreError>;

    /// Remove the entry for `key`, if any.
    async fn delete(&self, key: &CacheKey) -> Result<(), CacheStoreError>;
}

/// System-of-record repository contract.
///
/// Assumed durable and authoritative: its failures are hard errors, and
/// its answers win over anything the cache holds.
#[async_trait]
pub trait Repository<E: CacheEntity>: Send + Sync {
    /// Look up an entity by id. Absence is `Ok(None)`, not an error.
    async fn find_by_id(&self, id: &E::Id) -> Result<Option<E>, RepositoryError>;

    /// Persist an entity, returning the stored representation.
    ///
    /// May fail on constraint violation; surfaced as-is.
    async fn save(&self, entity: E) -> Result<E, RepositoryError>;
}

/// Statistics about cache store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because their TTL had passed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
