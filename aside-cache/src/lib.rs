//! ASIDE Cache - Cache-Aside Access Layer
//!
//! Orchestrates reads and writes across two external collaborators: a
//! key/value cache store and a durable system-of-record repository. The
//! accessor owns no persistent state of its own; it is a stateless
//! coordinator that decides when to read from the cache, when to fall back
//! to the repository, and when to (re)populate or invalidate the cache.
//!
//! # Design Philosophy
//!
//! The cache is purely an optimization. Cache faults are absorbed inside
//! this crate and surfaced only as log warnings: a broken cache store
//! degrades to repository reads, it never makes the system unavailable.
//! Repository faults are authoritative and propagate verbatim.
//!
//! # Stampede Control
//!
//! Concurrent misses for the same key are collapsed into a single in-flight
//! repository lookup whose outcome fans out to every waiter, bounding
//! repository load when a hot key expires.
//!
//! # Example
//!
//! ```ignore
//! let accessor = CacheAside::new(store, repo, CacheAsideConfig::default())?;
//!
//! // Read-through: cache hit short-circuits, miss falls back and populates.
//! let article = accessor.get(&7).await?;
//!
//! // Write-through ordering: repository first, then cache invalidation.
//! let saved = accessor.put(article).await?;
//! ```

pub mod accessor;
pub mod entry;
pub mod key;
pub mod memory;
pub mod singleflight;
pub mod traits;

pub use accessor::{CacheAside, CacheAsideConfig};
pub use entry::{CachedBody, CachedEntry};
pub use key::CacheKey;
pub use memory::MemoryCacheStore;
pub use singleflight::{FlightResult, FlightTable};
pub use traits::{CacheEntity, CacheStats, CacheStore, Repository};
