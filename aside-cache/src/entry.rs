//! Serialized cache entry envelope.
//!
//! Every value written to the cache store is wrapped in an envelope that
//! records when it was written and whether it carries an entity or a
//! negative (known-absent) marker. Undecodable envelopes are treated as
//! misses, never as errors, so a schema change or corrupt entry degrades
//! to a repository read.

use std::time::Duration;

use aside_core::Timestamp;
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Payload of a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedBody<T> {
    /// A positive entry holding the cached entity.
    Entity(T),
    /// A negative entry: the repository was consulted and held no row for
    /// this key. Only written when negative caching is enabled.
    Negative,
}

/// A cache entry as stored: payload plus insertion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry<T> {
    /// When this entry was written.
    pub cached_at: Timestamp,
    /// The cached payload.
    pub body: CachedBody<T>,
}

impl<T: Serialize + DeserializeOwned> CachedEntry<T> {
    /// Create a positive entry stamped with the current time.
    pub fn entity(value: T) -> Self {
        Self {
            cached_at: Utc::now(),
            body: CachedBody::Entity(value),
        }
    }

    /// Create a negative entry stamped with the current time.
    pub fn negative() -> Self {
        Self {
            cached_at: Utc::now(),
            body: CachedBody::Negative,
        }
    }

    /// Serialize for storage.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a stored entry.
    ///
    /// Returns `None` for bytes that do not decode to a valid envelope;
    /// callers treat that as a cache miss.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }

    /// How long ago this entry was written.
    pub fn age(&self) -> Duration {
        let now = Utc::now();
        if now > self.cached_at {
            (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }
}
