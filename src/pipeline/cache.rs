//! Page cache with typed keys and in-flight deduplication.
//!
//! Pages are cached per `(predicate, viewer, role)`. Only successful
//! fetches and explicit invalidation mutate the cache. A fetch that
//! started before an invalidation never repopulates it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{AppError, ErrorEnvelope, Result};
use crate::models::{Page, Role, Viewer, ViewerId};
use crate::pipeline::predicate::{Predicate, PredicateHash};

/// Identifies one discovery query for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub predicate: PredicateHash,
    pub viewer: Option<ViewerId>,
    pub role: Role,
}

impl CacheKey {
    pub fn new(predicate: &Predicate, viewer: &Viewer) -> Self {
        Self {
            predicate: predicate.fingerprint(),
            viewer: viewer.id().cloned(),
            role: viewer.role(),
        }
    }
}

/// One page of one query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub query: CacheKey,
    pub index: u32,
}

type SharedFetch = Shared<BoxFuture<'static, std::result::Result<Page, ErrorEnvelope>>>;

struct InFlight {
    epoch: u64,
    fetch: SharedFetch,
}

/// Shared page collection.
#[derive(Default)]
pub struct PageCache {
    pages: Mutex<HashMap<CacheKey, BTreeMap<u32, Page>>>,
    in_flight: Mutex<HashMap<PageKey, InFlight>>,
    epoch: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PageKey) -> Option<Page> {
        lock(&self.pages)
            .get(&key.query)
            .and_then(|pages| pages.get(&key.index))
            .cloned()
    }

    pub fn put(&self, key: PageKey, page: Page) {
        lock(&self.pages)
            .entry(key.query)
            .or_default()
            .insert(key.index, page);
    }

    /// Cached pages of one query, in index order.
    pub fn pages(&self, query: &CacheKey) -> Vec<Page> {
        lock(&self.pages)
            .get(query)
            .map(|pages| pages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every page of one query.
    pub fn invalidate(&self, query: &CacheKey) {
        self.invalidate_where(|key| key == query);
    }

    /// Drop every query belonging to a viewer.
    pub fn invalidate_viewer(&self, viewer: Option<&ViewerId>) {
        self.invalidate_where(|key| key.viewer.as_ref() == viewer);
    }

    /// Drop everything.
    pub fn invalidate_all(&self) {
        self.invalidate_where(|_| true);
    }

    fn invalidate_where(&self, matches: impl Fn(&CacheKey) -> bool) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut pages = lock(&self.pages);
        let before = pages.len();
        pages.retain(|key, _| !matches(key));
        lock(&self.in_flight).retain(|key, _| !matches(&key.query));
        log::debug!("Invalidated {} cached queries", before - pages.len());
    }

    /// Number of fetches currently running.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Return the cached page, join a running fetch for the same key, or
    /// start `fetch`. At most one fetch per key runs at a time.
    pub async fn get_or_fetch<F>(&self, key: PageKey, fetch: F) -> Result<Page>
    where
        F: FnOnce() -> BoxFuture<'static, std::result::Result<Page, ErrorEnvelope>>,
    {
        if let Some(page) = self.get(&key) {
            log::debug!("Cache hit for page {} of {}", key.index, key.query.predicate);
            return Ok(page);
        }

        let (epoch, shared) = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(running) => (running.epoch, running.fetch.clone()),
                None => {
                    let epoch = self.epoch.load(Ordering::SeqCst);
                    let shared = fetch().shared();
                    in_flight.insert(
                        key.clone(),
                        InFlight {
                            epoch,
                            fetch: shared.clone(),
                        },
                    );
                    (epoch, shared)
                }
            }
        };

        let result = shared.await;

        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.get(&key).is_some_and(|running| running.epoch == epoch) {
                in_flight.remove(&key);
            }
        }

        match result {
            Ok(page) => {
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    self.put(key, page.clone());
                }
                Ok(page)
            }
            Err(envelope) => Err(AppError::from(envelope)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::ErrorKind;

    fn key(index: u32) -> PageKey {
        PageKey {
            query: CacheKey::new(&Predicate::new(), &Viewer::student("s1", "A")),
            index,
        }
    }

    fn page(index: u32) -> Page {
        Page {
            index,
            events: vec![],
            total: 0,
            next_cursor: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_deduplicated() {
        let cache = PageCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = rx.shared();

        let make = |calls: Arc<AtomicUsize>, rx: Shared<tokio::sync::oneshot::Receiver<()>>| {
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let _ = rx.await;
                    Ok(page(0))
                }
                .boxed()
            }
        };

        let first = cache.get_or_fetch(key(0), make(calls.clone(), rx.clone()));
        let second = cache.get_or_fetch(key(0), make(calls.clone(), rx.clone()));
        let release = async {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        };

        let (a, b, _) = tokio::join!(first, second, release);
        assert_eq!(a.unwrap(), page(0));
        assert_eq!(b.unwrap(), page(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_count(), 0);
        assert!(cache.get(&key(0)).is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = PageCache::new();
        let err = cache
            .get_or_fetch(key(0), || {
                async { Err(ErrorEnvelope::new(ErrorKind::TransportFailure, "down")) }.boxed()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(cache.get(&key(0)).is_none());
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_spanning_invalidation_does_not_repopulate() {
        let cache = Arc::new(PageCache::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        let fetching = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(key(0), move || {
                        async move {
                            let _ = started_tx.send(());
                            let _ = rx.await;
                            Ok(page(0))
                        }
                        .boxed()
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        cache.invalidate_all();
        let _ = tx.send(());

        assert!(fetching.await.unwrap().is_ok());
        assert!(cache.get(&key(0)).is_none());
    }

    #[test]
    fn test_invalidate_viewer_keeps_others() {
        let cache = PageCache::new();
        let other = PageKey {
            query: CacheKey::new(&Predicate::new(), &Viewer::student("s2", "A")),
            index: 0,
        };
        cache.put(key(0), page(0));
        cache.put(key(1), page(1));
        cache.put(other.clone(), page(0));

        assert_eq!(cache.pages(&key(0).query).len(), 2);
        cache.invalidate_viewer(Some(&ViewerId("s1".into())));
        assert!(cache.get(&key(0)).is_none());
        assert!(cache.get(&other).is_some());
    }
}
