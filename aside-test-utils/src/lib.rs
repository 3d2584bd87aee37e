//! ASIDE Test Utilities
//!
//! Centralized test infrastructure for the aside workspace:
//! - The `Article` fixture entity (the canonical worked example)
//! - Mock cache store with failure injection and call recording
//! - Mock repository with call counting and a hold-gate for concurrency
//!   tests

// Re-export the crate surface for convenience
pub use aside_cache::{
    CacheAside, CacheAsideConfig, CacheEntity, CacheKey, CacheStats, CacheStore, CachedBody,
    CachedEntry, MemoryCacheStore, Repository,
};
pub use aside_core::{CacheStoreError, ConfigError, RawValue, RepositoryError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

// ============================================================================
// FIXTURE ENTITY
// ============================================================================

/// Article fixture entity, cached under `article:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub content: String,
}

impl Article {
    pub fn new(id: u64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            content: content.into(),
        }
    }
}

impl CacheEntity for Article {
    type Id = u64;

    fn type_tag() -> &'static str {
        "article"
    }

    fn id(&self) -> u64 {
        self.id
    }
}

// ============================================================================
// MOCK CACHE STORE
// ============================================================================

/// Cache store double: a [`MemoryCacheStore`] with per-operation failure
/// injection and call recording.
#[derive(Default)]
pub struct MockCacheStore {
    inner: MemoryCacheStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MockCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `get` calls fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `set` calls fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete` calls fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.contains(key)
    }

    /// Whether the underlying store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl CacheStore for MockCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<RawValue>, CacheStoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheStoreError::ReadFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &CacheKey,
        value: RawValue,
        ttl: Duration,
    ) -> Result<(), CacheStoreError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheStoreError::WriteFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheStoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CacheStoreError::DeleteFailed {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.delete(key).await
    }
}

// ============================================================================
// MOCK REPOSITORY
// ============================================================================

/// Repository double for [`Article`] rows with call counting, failure
/// injection, and a hold-gate.
///
/// The gate makes concurrency tests deterministic: with [`hold`](Self::hold)
/// engaged, `find_by_id` records its call and then parks until
/// [`release`](Self::release), so a test can pile up concurrent readers
/// behind one in-flight lookup without timing sleeps.
pub struct MockRepository {
    rows: RwLock<HashMap<u64, Article>>,
    find_calls: AtomicUsize,
    save_calls: AtomicUsize,
    fail_finds: AtomicBool,
    fail_saves: AtomicBool,
    gate: watch::Sender<bool>,
}

impl Default for MockRepository {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            rows: RwLock::new(HashMap::new()),
            find_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            fail_finds: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
            gate,
        }
    }
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the repository with rows.
    pub fn with_articles(articles: impl IntoIterator<Item = Article>) -> Self {
        let repo = Self::new();
        {
            let mut rows = repo.rows.write().expect("fresh lock");
            for article in articles {
                rows.insert(article.id, article);
            }
        }
        repo
    }

    /// Insert or replace a row directly, bypassing call counting.
    pub fn insert(&self, article: Article) {
        if let Ok(mut rows) = self.rows.write() {
            rows.insert(article.id, article);
        }
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent `find_by_id` calls fail.
    pub fn fail_finds(&self, fail: bool) {
        self.fail_finds.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `save` calls fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Park `find_by_id` calls (after they are counted) until released.
    pub fn hold(&self) {
        // send_replace updates the value even while no waiter is subscribed
        self.gate.send_replace(false);
    }

    /// Release parked `find_by_id` calls.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    async fn wait_for_gate(&self) {
        let mut open = self.gate.subscribe();
        while !*open.borrow() {
            if open.changed().await.is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl Repository<Article> for MockRepository {
    async fn find_by_id(&self, id: &u64) -> Result<Option<Article>, RepositoryError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_for_gate().await;
        if self.fail_finds.load(Ordering::SeqCst) {
            return Err(RepositoryError::QueryFailed {
                reason: "injected failure".to_string(),
            });
        }
        let row = self
            .rows
            .read()
            .map_err(|_| RepositoryError::Unavailable {
                reason: "row lock poisoned".to_string(),
            })?
            .get(id)
            .cloned();
        Ok(row)
    }

    async fn save(&self, entity: Article) -> Result<Article, RepositoryError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::PersistFailed {
                reason: "injected failure".to_string(),
            });
        }
        self.rows
            .write()
            .map_err(|_| RepositoryError::Unavailable {
                reason: "row lock poisoned".to_string(),
            })?
            .insert(entity.id, entity.clone());
        Ok(entity)
    }
}
