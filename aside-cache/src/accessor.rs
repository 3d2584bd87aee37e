//! Cache-aside accessor with explicit failure policy.
//!
//! This module implements the core orchestration: reads go cache-first and
//! fall back to the repository, writes go repository-first and invalidate
//! the cache. The read path is the classic cache-aside sequence
//!
//! ```text
//! cached = cache.get("article:{id}")      # hit: return without touching db
//! article = repo.find_by_id(id)           # miss: source of truth
//! if article: cache.set("article:{id}", article)
//! ```
//!
//! with consistency, failure, and stampede semantics made explicit.

use std::sync::Arc;
use std::time::Duration;

use aside_core::{ConfigError, RepositoryError};
use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::entry::{CachedBody, CachedEntry};
use crate::key::CacheKey;
use crate::singleflight::{FlightResult, FlightTable};
use crate::traits::{CacheEntity, CacheStore, Repository};

/// Configuration for the cache-aside accessor.
#[derive(Debug, Clone)]
pub struct CacheAsideConfig {
    /// Lifetime of positive cache entries. Must be nonzero.
    pub ttl: Duration,
    /// Lifetime of negative (known-absent) entries; `None` disables
    /// negative caching. Disabled by default so a missing row is re-checked
    /// on every read and a subsequent write is never masked.
    pub negative_ttl: Option<Duration>,
    /// Prefix prepended to every cache key, isolating deployments that
    /// share one cache store.
    pub key_prefix: String,
}

impl Default for CacheAsideConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            negative_ttl: None,
            key_prefix: String::new(),
        }
    }
}

impl CacheAsideConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the positive entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable negative caching with the given TTL.
    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = Some(ttl);
        self
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: "0".to_string(),
                reason: "entry lifetime must be greater than zero".to_string(),
            });
        }
        if let Some(negative_ttl) = self.negative_ttl {
            if negative_ttl.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: "negative_ttl".to_string(),
                    value: "0".to_string(),
                    reason: "enable negative caching with a nonzero lifetime, \
                             or leave it disabled"
                        .to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Cache-aside accessor over a cache store and a repository.
///
/// Given an identifier, returns the freshest known entity while minimizing
/// repository load, and keeps the cache consistent with the repository on
/// writes. The accessor is a stateless coordinator: both stores may hold
/// independent copies, and the policies here keep them eventually
/// consistent.
///
/// The public contract is exactly [`get`](Self::get) and
/// [`put`](Self::put); both fail only with [`RepositoryError`], never with
/// a cache-side error.
///
/// # Type Parameters
///
/// - `E`: the cached entity type
/// - `C`: the cache store adapter
/// - `R`: the system-of-record repository adapter
pub struct CacheAside<E, C, R>
where
    E: CacheEntity,
    C: CacheStore,
    R: Repository<E>,
{
    /// The cache store.
    store: Arc<C>,
    /// The authoritative repository.
    repo: Arc<R>,
    /// Accessor configuration.
    config: CacheAsideConfig,
    /// In-flight lookup table for stampede control.
    flights: Arc<FlightTable<E>>,
}

impl<E, C, R> CacheAside<E, C, R>
where
    E: CacheEntity,
    C: CacheStore + 'static,
    R: Repository<E> + 'static,
{
    /// Create a new accessor with the given configuration.
    pub fn new(store: Arc<C>, repo: Arc<R>, config: CacheAsideConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            repo,
            config,
            flights: Arc::new(FlightTable::new()),
        })
    }

    /// Create a new accessor with default configuration.
    pub fn with_defaults(store: Arc<C>, repo: Arc<R>) -> Self {
        Self {
            store,
            repo,
            config: CacheAsideConfig::default(),
            flights: Arc::new(FlightTable::new()),
        }
    }

    /// Get the accessor configuration.
    pub fn config(&self) -> &CacheAsideConfig {
        &self.config
    }

    /// Compute the cache key for an id under this accessor's prefix.
    pub fn key_for(&self, id: &E::Id) -> CacheKey {
        CacheKey::for_entity::<E>(&self.config.key_prefix, id)
    }

    /// Get an entity by id, cache-first.
    ///
    /// A cache hit returns immediately without touching the repository. A
    /// miss - absent entry, expired entry, undecodable entry, or a cache
    /// store failure - falls back to the repository; a repository hit
    /// populates the cache before returning. Absence in the repository is
    /// `Ok(None)` and is not cached unless negative caching is enabled.
    ///
    /// Cache faults on this path are logged and absorbed; only a
    /// [`RepositoryError`] during fallback is returned.
    pub async fn get(&self, id: &E::Id) -> Result<Option<E>, RepositoryError> {
        let key = self.key_for(id);

        match self.store.get(&key).await {
            Ok(Some(bytes)) => match CachedEntry::<E>::decode(&bytes) {
                Some(entry) => match entry.body {
                    CachedBody::Entity(entity) => {
                        debug!(key = %key, "cache hit");
                        return Ok(Some(entity));
                    }
                    CachedBody::Negative => {
                        debug!(key = %key, "negative cache hit");
                        return Ok(None);
                    }
                },
                None => {
                    warn!(key = %key, "undecodable cache entry, treating as miss");
                }
            },
            Ok(None) => {
                debug!(key = %key, "cache miss");
            }
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed, falling back to repository");
            }
        }

        self.lookup(key, id.clone()).await
    }

    /// Persist an entity, then invalidate its cache entry.
    ///
    /// Write-through ordering is mandatory: the repository must reflect the
    /// write before the cache changes, so no reader can observe a cached
    /// value that was never durably committed. The entry is deleted rather
    /// than overwritten, which closes the race where a concurrent `get`
    /// repopulated the cache with the now-stale value mid-write.
    ///
    /// A repository failure aborts the whole operation with the cache
    /// untouched. An invalidation failure is logged and absorbed; the entry
    /// is left to expire by TTL.
    pub async fn put(&self, entity: E) -> Result<E, RepositoryError> {
        let saved = self.repo.save(entity).await?;

        let key = self.key_for(&saved.id());
        match self.store.delete(&key).await {
            Ok(()) => debug!(key = %key, "cache entry invalidated after write"),
            Err(err) => {
                warn!(
                    key = %key, error = %err,
                    "cache invalidation failed after write, entry left to expire by ttl"
                );
            }
        }

        Ok(saved)
    }

    /// Repository fallback with single-flight de-duplication.
    async fn lookup(&self, key: CacheKey, id: E::Id) -> Result<Option<E>, RepositoryError> {
        let (flight, led) = self
            .flights
            .join_or_lead(&key, || {
                let store = Arc::clone(&self.store);
                let repo = Arc::clone(&self.repo);
                let config = self.config.clone();
                let key = key.clone();
                async move { Self::load_and_populate(store, repo, config, key, id).await }.boxed()
            })
            .await;

        if led {
            debug!(key = %key, "leading repository lookup");
        } else {
            debug!(key = %key, "joined in-flight repository lookup");
        }

        let result = flight.clone().await;
        self.flights.retire(&key, &flight).await;
        result
    }

    /// The leader's lookup: consult the repository, populate the cache.
    async fn load_and_populate(
        store: Arc<C>,
        repo: Arc<R>,
        config: CacheAsideConfig,
        key: CacheKey,
        id: E::Id,
    ) -> FlightResult<E> {
        match repo.find_by_id(&id).await? {
            Some(entity) => {
                Self::write_back(&store, &key, CachedEntry::entity(entity.clone()), config.ttl)
                    .await;
                Ok(Some(entity))
            }
            None => {
                if let Some(negative_ttl) = config.negative_ttl {
                    Self::write_back(&store, &key, CachedEntry::<E>::negative(), negative_ttl)
                        .await;
                }
                Ok(None)
            }
        }
    }

    /// Best-effort cache population. Failures here never fail the read;
    /// the correct entity was already obtained from the repository.
    async fn write_back(store: &C, key: &CacheKey, entry: CachedEntry<E>, ttl: Duration) {
        let bytes = match entry.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key = %key, error = %err, "cache entry serialization failed, skipping write-back");
                return;
            }
        };
        if let Err(err) = store.set(key, bytes, ttl).await {
            warn!(key = %key, error = %err, "cache write-back failed");
        }
    }
}

impl<E, C, R> Clone for CacheAside<E, C, R>
where
    E: CacheEntity,
    C: CacheStore,
    R: Repository<E>,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            repo: Arc::clone(&self.repo),
            config: self.config.clone(),
            flights: Arc::clone(&self.flights),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCacheStore;
    use aside_core::CacheStoreError;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Doc {
        id: u64,
        title: String,
    }

    impl Doc {
        fn new(id: u64, title: &str) -> Self {
            Self {
                id,
                title: title.to_string(),
            }
        }
    }

    impl CacheEntity for Doc {
        type Id = u64;

        fn type_tag() -> &'static str {
            "doc"
        }

        fn id(&self) -> u64 {
            self.id
        }
    }

    // Mock repository with call counting for touch-the-repo assertions.
    #[derive(Default)]
    struct MockRepo {
        rows: RwLock<HashMap<u64, Doc>>,
        find_calls: AtomicUsize,
        fail_saves: bool,
    }

    impl MockRepo {
        fn with_doc(doc: Doc) -> Self {
            let repo = Self::default();
            repo.rows.write().unwrap().insert(doc.id, doc);
            repo
        }

        fn find_calls(&self) -> usize {
            self.find_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Repository<Doc> for MockRepo {
        async fn find_by_id(&self, id: &u64) -> Result<Option<Doc>, RepositoryError> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.read().unwrap().get(id).cloned())
        }

        async fn save(&self, entity: Doc) -> Result<Doc, RepositoryError> {
            if self.fail_saves {
                return Err(RepositoryError::PersistFailed {
                    reason: "injected failure".to_string(),
                });
            }
            self.rows.write().unwrap().insert(entity.id, entity.clone());
            Ok(entity)
        }
    }

    // Cache store whose reads always fail.
    struct BrokenCacheStore;

    #[async_trait]
    impl CacheStore for BrokenCacheStore {
        async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheStoreError> {
            Err(CacheStoreError::ReadFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            })
        }

        async fn set(
            &self,
            key: &CacheKey,
            _value: Vec<u8>,
            _ttl: Duration,
        ) -> Result<(), CacheStoreError> {
            Err(CacheStoreError::WriteFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            })
        }

        async fn delete(&self, key: &CacheKey) -> Result<(), CacheStoreError> {
            Err(CacheStoreError::DeleteFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            })
        }
    }

    fn accessor(
        store: Arc<MemoryCacheStore>,
        repo: Arc<MockRepo>,
    ) -> CacheAside<Doc, MemoryCacheStore, MockRepo> {
        CacheAside::with_defaults(store, repo)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_populates() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo::with_doc(Doc::new(7, "A")));
        let accessor = accessor(Arc::clone(&store), Arc::clone(&repo));

        let doc = accessor.get(&7).await.unwrap();
        assert_eq!(doc, Some(Doc::new(7, "A")));
        assert_eq!(repo.find_calls(), 1);
        assert!(store.contains(&accessor.key_for(&7)));
    }

    #[tokio::test]
    async fn test_hit_does_not_touch_repository() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo::with_doc(Doc::new(7, "A")));
        let accessor = accessor(Arc::clone(&store), Arc::clone(&repo));

        accessor.get(&7).await.unwrap();
        let doc = accessor.get(&7).await.unwrap();

        assert_eq!(doc, Some(Doc::new(7, "A")));
        assert_eq!(repo.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_absent_is_none_and_not_cached_by_default() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo::default());
        let accessor = accessor(Arc::clone(&store), Arc::clone(&repo));

        assert_eq!(accessor.get(&404).await.unwrap(), None);
        assert!(store.is_empty());

        // No negative caching: every read re-checks the repository.
        assert_eq!(accessor.get(&404).await.unwrap(), None);
        assert_eq!(repo.find_calls(), 2);
    }

    #[tokio::test]
    async fn test_negative_caching_when_enabled() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo::default());
        let config = CacheAsideConfig::new().with_negative_ttl(Duration::from_secs(30));
        let accessor = CacheAside::<Doc, _, _>::new(Arc::clone(&store), Arc::clone(&repo), config)
            .expect("config should validate");

        assert_eq!(accessor.get(&404).await.unwrap(), None);
        assert_eq!(accessor.get(&404).await.unwrap(), None);

        // Second read is served by the negative entry.
        assert_eq!(repo.find_calls(), 1);
        assert!(store.contains(&accessor.key_for(&404)));
    }

    #[tokio::test]
    async fn test_cache_read_failure_falls_back_to_repository() {
        let store = Arc::new(BrokenCacheStore);
        let repo = Arc::new(MockRepo::with_doc(Doc::new(7, "A")));
        let accessor = CacheAside::with_defaults(store, Arc::clone(&repo));

        // The cache error is absorbed, including the failed write-back.
        let doc = accessor.get(&7).await.unwrap();
        assert_eq!(doc, Some(Doc::new(7, "A")));
        assert_eq!(repo.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo::with_doc(Doc::new(7, "A")));
        let accessor = accessor(Arc::clone(&store), Arc::clone(&repo));

        let key = accessor.key_for(&7);
        store
            .set(&key, b"corrupt".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let doc = accessor.get(&7).await.unwrap();
        assert_eq!(doc, Some(Doc::new(7, "A")));
        assert_eq!(repo.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_put_persists_then_invalidates() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo::with_doc(Doc::new(7, "A")));
        let accessor = accessor(Arc::clone(&store), Arc::clone(&repo));

        accessor.get(&7).await.unwrap();
        assert!(store.contains(&accessor.key_for(&7)));

        accessor.put(Doc::new(7, "B")).await.unwrap();
        assert!(!store.contains(&accessor.key_for(&7)));

        // Read-after-write: the next get re-consults the repository.
        let doc = accessor.get(&7).await.unwrap();
        assert_eq!(doc, Some(Doc::new(7, "B")));
        assert_eq!(repo.find_calls(), 2);
    }

    #[tokio::test]
    async fn test_put_failure_leaves_cache_untouched() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo {
            fail_saves: true,
            ..MockRepo::with_doc(Doc::new(7, "A"))
        });
        let accessor = accessor(Arc::clone(&store), Arc::clone(&repo));

        accessor.get(&7).await.unwrap();
        let err = accessor.put(Doc::new(7, "B")).await.unwrap_err();

        assert!(matches!(err, RepositoryError::PersistFailed { .. }));
        // The stale-but-committed entry survives.
        assert!(store.contains(&accessor.key_for(&7)));
        assert_eq!(accessor.get(&7).await.unwrap(), Some(Doc::new(7, "A")));
    }

    #[tokio::test]
    async fn test_key_prefix_namespaces_entries() {
        let store = Arc::new(MemoryCacheStore::new());
        let repo = Arc::new(MockRepo::with_doc(Doc::new(7, "A")));
        let config = CacheAsideConfig::new().with_key_prefix("svc1/");
        let accessor = CacheAside::<Doc, _, _>::new(Arc::clone(&store), repo, config).unwrap();

        accessor.get(&7).await.unwrap();
        assert_eq!(accessor.key_for(&7).as_str(), "svc1/doc:7");
        assert!(store.contains(&accessor.key_for(&7)));
    }

    #[test]
    fn test_config_builder() {
        let config = CacheAsideConfig::new()
            .with_ttl(Duration::from_secs(120))
            .with_negative_ttl(Duration::from_secs(10))
            .with_key_prefix("svc/");

        assert_eq!(config.ttl, Duration::from_secs(120));
        assert_eq!(config.negative_ttl, Some(Duration::from_secs(10)));
        assert_eq!(config.key_prefix, "svc/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_zero_ttl() {
        let config = CacheAsideConfig::new().with_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "ttl"
        ));

        let config = CacheAsideConfig::new().with_negative_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "negative_ttl"
        ));
    }

    #[test]
    fn test_default_config_disables_negative_caching() {
        let config = CacheAsideConfig::default();
        assert_eq!(config.negative_ttl, None);
        assert!(config.validate().is_ok());
    }
}
