//! Bounded transport cache keyed by dialer identity.
//!
//! # Responsibilities
//! - Hand out the same transport for the same dialer between evictions
//! - Bound the number of live transports
//! - Evict the least recently used half when full
//!
//! # Design Decisions
//! - One mutex guards the map and the usage counter. Construction runs under
//!   it, so two concurrent first uses of a dialer cannot both build a
//!   transport.
//! - A maker that panics is treated like one that failed. The lock is
//!   recovered after a panic since entries are only inserted once built.
//! - Entries are never closed on eviction. Their pooled connections expire
//!   through the client's idle timeout.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{FailedTransport, RoundTrip, TransportMaker};
use crate::dialer::ContextDialer;
use crate::observability::metrics;

/// Default capacity.
pub const DEFAULT_MAX_CACHED: usize = 64;

/// Map key comparing dialers by the address of their shared allocation.
#[derive(Clone)]
struct DialerKey(Arc<dyn ContextDialer>);

impl DialerKey {
    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for DialerKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for DialerKey {}

impl Hash for DialerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

struct CacheEntry {
    transport: Arc<dyn RoundTrip>,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<DialerKey, CacheEntry>,
    counter: u64,
}

/// Transports indexed by the dialer they were built for.
pub struct TransportCache {
    maker: Arc<dyn TransportMaker>,
    max_cached: usize,
    inner: Mutex<CacheState>,
}

impl TransportCache {
    /// `max_cached` is clamped to at least one entry.
    pub fn new(maker: Arc<dyn TransportMaker>, max_cached: usize) -> Self {
        Self {
            maker,
            max_cached: max_cached.max(1),
            inner: Mutex::new(CacheState::default()),
        }
    }

    /// Return the transport for `dialer`, building it on first use.
    pub fn acquire(&self, dialer: &Arc<dyn ContextDialer>) -> Arc<dyn RoundTrip> {
        let mut state = self.state();
        state.counter += 1;
        let now = state.counter;

        let key = DialerKey(Arc::clone(dialer));
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.last_used = now;
            return Arc::clone(&entry.transport);
        }

        if state.entries.len() >= self.max_cached {
            self.evict(&mut state);
        }

        let made = panic::catch_unwind(AssertUnwindSafe(|| {
            self.maker.make_transport(Arc::clone(dialer))
        }));
        let transport = match made {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Transport construction failed");
                Arc::new(FailedTransport::new(e.to_string()))
            }
            Err(_) => {
                tracing::error!("Transport maker panicked");
                Arc::new(FailedTransport::new("transport maker panicked"))
            }
        };
        state.entries.insert(
            key,
            CacheEntry {
                transport: Arc::clone(&transport),
                last_used: now,
            },
        );
        metrics::record_cache_size(state.entries.len());
        transport
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keep the `max_cached / 2` most recently used entries.
    fn evict(&self, state: &mut CacheState) {
        let keep = self.max_cached / 2;
        let mut by_recency: Vec<(DialerKey, u64)> = state
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_used))
            .collect();
        by_recency.sort_unstable_by(|a, b| b.1.cmp(&a.1));

        let evicted = by_recency.len().saturating_sub(keep);
        for (key, _) in by_recency.into_iter().skip(keep) {
            state.entries.remove(&key);
        }

        tracing::debug!(evicted, remaining = state.entries.len(), "Transport cache evicted");
        metrics::record_cache_eviction(evicted);
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, dialer: &Arc<dyn ContextDialer>) -> bool {
        self.state()
            .entries
            .contains_key(&DialerKey(Arc::clone(dialer)))
    }

    pub fn max_cached(&self) -> usize {
        self.max_cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialer::TcpDialer;
    use crate::error::BoxError;
    use crate::transport::DefaultTransportMaker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dialer() -> Arc<dyn ContextDialer> {
        Arc::new(TcpDialer::default())
    }

    fn cache(max: usize) -> TransportCache {
        TransportCache::new(Arc::new(DefaultTransportMaker::default()), max)
    }

    struct CountingMaker {
        built: AtomicUsize,
    }

    impl TransportMaker for CountingMaker {
        fn make_transport(
            &self,
            _dialer: Arc<dyn ContextDialer>,
        ) -> Result<Arc<dyn RoundTrip>, BoxError> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Err("failMakeRoundTripper".into())
        }
    }

    struct PanicOnceMaker {
        calls: AtomicUsize,
    }

    impl TransportMaker for PanicOnceMaker {
        fn make_transport(
            &self,
            dialer: Arc<dyn ContextDialer>,
        ) -> Result<Arc<dyn RoundTrip>, BoxError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("maker exploded");
            }
            DefaultTransportMaker::default().make_transport(dialer)
        }
    }

    #[test]
    fn same_dialer_same_transport() {
        let cache = cache(4);
        let d1 = dialer();
        let d2 = dialer();

        let t1 = cache.acquire(&d1);
        let t1_again = cache.acquire(&d1);
        let t2 = cache.acquire(&d2);

        assert!(Arc::ptr_eq(&t1, &t1_again));
        assert!(!Arc::ptr_eq(&t1, &t2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_keeps_most_recent_half() {
        let cache = cache(4);
        let dialers: Vec<_> = (0..5).map(|_| dialer()).collect();

        for d in &dialers[..4] {
            cache.acquire(d);
        }
        // Touch 0 so it is newer than 1..3.
        cache.acquire(&dialers[0]);
        assert_eq!(cache.len(), 4);

        cache.acquire(&dialers[4]);
        assert_eq!(cache.len(), 3);
        assert!(cache.contains(&dialers[0]));
        assert!(cache.contains(&dialers[3]));
        assert!(cache.contains(&dialers[4]));
        assert!(!cache.contains(&dialers[1]));
        assert!(!cache.contains(&dialers[2]));
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache = cache(3);
        for _ in 0..20 {
            cache.acquire(&dialer());
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn capacity_of_one() {
        let cache = cache(0);
        assert_eq!(cache.max_cached(), 1);
        let d1 = dialer();
        let d2 = dialer();
        cache.acquire(&d1);
        cache.acquire(&d2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&d2));
    }

    #[test]
    fn failed_construction_is_cached() {
        let maker = Arc::new(CountingMaker {
            built: AtomicUsize::new(0),
        });
        let cache = TransportCache::new(maker.clone(), 4);
        let d = dialer();

        let first = cache.acquire(&d);
        let second = cache.acquire(&d);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(maker.built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let maker = Arc::new(CountingMaker {
            built: AtomicUsize::new(0),
        });
        let cache = Arc::new(TransportCache::new(maker.clone(), 4));
        let d = dialer();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let d = Arc::clone(&d);
                std::thread::spawn(move || cache.acquire(&d))
            })
            .collect();
        let transports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(maker.built.load(Ordering::SeqCst), 1);
        assert!(transports.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn panicking_maker_does_not_break_later_acquires() {
        let cache = Arc::new(TransportCache::new(
            Arc::new(PanicOnceMaker {
                calls: AtomicUsize::new(0),
            }),
            4,
        ));
        let first = dialer();
        let other = dialer();

        let from_thread = {
            let cache = Arc::clone(&cache);
            let first = Arc::clone(&first);
            std::thread::spawn(move || cache.acquire(&first))
                .join()
                .expect("acquire must not unwind")
        };

        let request = axum::http::Request::get("http://example.com/")
            .body(axum::body::Body::empty())
            .unwrap();
        let Err(err) = from_thread.round_trip(request).await else {
            panic!("transport built by a panicking maker must fail");
        };
        assert_eq!(err.to_string(), "transport maker panicked");

        cache.acquire(&other);
        assert!(cache.contains(&first));
        assert!(cache.contains(&other));
        assert_eq!(cache.len(), 2);
    }
}
