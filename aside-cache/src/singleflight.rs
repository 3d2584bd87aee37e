//! Single-flight de-duplication of repository lookups.
//!
//! Collapses concurrent lookups for the same cache key into one in-flight
//! future whose terminal outcome (value or error) fans out to every
//! caller, bounding repository load under a thundering herd of misses.
//!
//! Per key, a lookup moves through `IDLE -> LOOKING_UP -> {SATISFIED,
//! FAILED} -> IDLE`: a key is idle while absent from the table, looking up
//! while it maps to a shared flight, and returns to idle when the flight
//! is retired. Only one flight per key exists at a time; callers that find
//! a flight in progress attach as waiters and observe the leader's
//! outcome.
//!
//! Cancellation is per-caller: the flight is a shared future driven by
//! whichever waiters are still polling it, so one caller abandoning its
//! `get` does not cancel the lookup for the rest.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use aside_core::RepositoryError;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::Mutex;

use crate::key::CacheKey;

/// Terminal outcome fanned out to every caller joined on one lookup.
pub type FlightResult<E> = Result<Option<E>, RepositoryError>;

/// A shared, clonable handle to one in-flight lookup.
pub type SharedFlight<E> = Shared<BoxFuture<'static, FlightResult<E>>>;

/// Table of in-flight lookups keyed by cache key.
///
/// The lock is held only for table bookkeeping, never across the lookup
/// itself.
pub struct FlightTable<E: Clone> {
    flights: Mutex<HashMap<CacheKey, SharedFlight<E>>>,
}

impl<E> FlightTable<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Create an empty flight table.
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Join the in-flight lookup for `key`, or lead a new one.
    ///
    /// `lookup` is only invoked when this caller becomes the leader.
    /// Returns the shared flight plus whether this caller leads it.
    pub async fn join_or_lead<F>(&self, key: &CacheKey, lookup: F) -> (SharedFlight<E>, bool)
    where
        F: FnOnce() -> BoxFuture<'static, FlightResult<E>>,
    {
        let mut flights = self.flights.lock().await;
        match flights.entry(key.clone()) {
            Entry::Occupied(slot) => (slot.get().clone(), false),
            Entry::Vacant(slot) => {
                let flight = lookup().shared();
                slot.insert(flight.clone());
                (flight, true)
            }
        }
    }

    /// Return `key` to idle once `flight` has reached a terminal state.
    ///
    /// Only removes the table entry if it still refers to the same flight,
    /// so a newer lookup that started after this one completed is left
    /// alone.
    pub async fn retire(&self, key: &CacheKey, flight: &SharedFlight<E>) {
        let mut flights = self.flights.lock().await;
        if let Some(current) = flights.get(key) {
            if current.ptr_eq(flight) {
                flights.remove(key);
            }
        }
    }

    /// Number of lookups currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.flights.lock().await.len()
    }
}

impl<E> Default for FlightTable<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn key(id: u64) -> CacheKey {
        CacheKey::from_parts("", "article", id)
    }

    fn counting_lookup(
        calls: Arc<AtomicUsize>,
        result: FlightResult<u64>,
    ) -> impl FnOnce() -> BoxFuture<'static, FlightResult<u64>> {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                result
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_second_caller_attaches_as_waiter() {
        let table = FlightTable::<u64>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = key(1);

        let (leader, led) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Ok(Some(7))))
            .await;
        assert!(led);

        let (waiter, led) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Ok(Some(99))))
            .await;
        assert!(!led);
        assert!(leader.ptr_eq(&waiter));

        // Both observe the leader's outcome; the waiter's lookup never ran.
        assert_eq!(leader.clone().await, Ok(Some(7)));
        assert_eq!(waiter.clone().await, Ok(Some(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_fly_independently() {
        let table = FlightTable::<u64>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, led_a) = table
            .join_or_lead(&key(1), counting_lookup(Arc::clone(&calls), Ok(Some(1))))
            .await;
        let (b, led_b) = table
            .join_or_lead(&key(2), counting_lookup(Arc::clone(&calls), Ok(Some(2))))
            .await;

        assert!(led_a && led_b);
        assert_eq!(table.in_flight().await, 2);
        assert_eq!(a.await, Ok(Some(1)));
        assert_eq!(b.await, Ok(Some(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_fans_out_to_all_waiters() {
        let table = FlightTable::<u64>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = key(1);
        let err = RepositoryError::QueryFailed {
            reason: "boom".to_string(),
        };

        let (leader, _) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Err(err.clone())))
            .await;
        let (waiter, _) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Ok(None)))
            .await;

        assert_eq!(leader.await, Err(err.clone()));
        assert_eq!(waiter.await, Err(err));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retire_returns_key_to_idle() {
        let table = FlightTable::<u64>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = key(1);

        let (flight, _) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Ok(Some(1))))
            .await;
        assert_eq!(flight.clone().await, Ok(Some(1)));

        table.retire(&key, &flight).await;
        assert_eq!(table.in_flight().await, 0);

        // The key is idle again, so the next caller leads a fresh lookup.
        let (_next, led) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Ok(Some(2))))
            .await;
        assert!(led);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retire_ignores_a_newer_flight() {
        let table = FlightTable::<u64>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = key(1);

        let (old, _) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Ok(Some(1))))
            .await;
        table.retire(&key, &old).await;

        let (newer, _) = table
            .join_or_lead(&key, counting_lookup(Arc::clone(&calls), Ok(Some(2))))
            .await;

        // Retiring the stale handle again must not evict the newer flight.
        table.retire(&key, &old).await;
        assert_eq!(table.in_flight().await, 1);

        table.retire(&key, &newer).await;
        assert_eq!(table.in_flight().await, 0);
    }
}
