//! Discovery pipeline.
//!
//! - `visibility` + `filter`: build the symbolic predicate for a viewer
//! - `paginator`: fixed-size page fetching through the shared `cache`
//! - `tracking`: create / delete tracking marks
//! - `session`: UI-independent driver tying the above together

pub mod cache;
pub mod filter;
pub mod paginator;
pub mod predicate;
pub mod session;
pub mod tracking;
pub mod visibility;

use std::sync::Arc;

use crate::models::{DiscoveryConfig, FilterState, Viewer};
use crate::services::notify::{LogNotifier, Notifier};
use crate::storage::EventStore;
use crate::utils::{Clock, SystemClock};

pub use cache::{CacheKey, PageCache, PageKey};
pub use paginator::{PageFetcher, PageStep, Paginator};
pub use predicate::{Condition, Predicate, PredicateHash, SortOrder};
pub use session::{DiscoverySession, LoadOutcome};
pub use tracking::{TrackState, TrackingToggle};

/// Collaborators shared by every pipeline component.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn EventStore>,
    pub cache: Arc<PageCache>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub discovery: DiscoveryConfig,
}

impl PipelineContext {
    /// Context with a fresh cache, the system clock and log notifications.
    pub fn new(store: Arc<dyn EventStore>, discovery: &DiscoveryConfig) -> Self {
        Self {
            store,
            cache: Arc::new(PageCache::new()),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            discovery: discovery.clone(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// Full predicate for a viewer: visibility rules AND compiled filters.
pub fn build_predicate(viewer: &Viewer, filters: &FilterState) -> Predicate {
    visibility::resolve_visibility(viewer, filters).merge(filter::compile(filters))
}
