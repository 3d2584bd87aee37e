//! ASIDE Core - Shared Types
//!
//! Pure data types with no behavior. The error taxonomy and identity
//! aliases shared by every crate in the workspace live here; the cache
//! orchestration itself lives in `aside-cache`.

use chrono::{DateTime, Utc};

pub mod error;

pub use error::{CacheStoreError, ConfigError, RepositoryError};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Raw serialized cache value, as stored by a cache store.
pub type RawValue = Vec<u8>;
