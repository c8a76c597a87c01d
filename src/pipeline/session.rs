//! UI-independent discovery driver.
//!
//! Holds one viewer's list state: filters, loaded pages, a paginator and a
//! generation counter. Every filter or identity change bumps the
//! generation; a fetch that comes back under an older generation is
//! discarded instead of reaching the list.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{AppError, ErrorEnvelope, Result};
use crate::models::{
    EventListing, FilterState, Page, Scope, TimeWindow, UserClaims, Viewer,
};
use crate::pipeline::cache::CacheKey;
use crate::pipeline::filter::normalize_search;
use crate::pipeline::paginator::{PageFetcher, PageStep, Paginator};
use crate::pipeline::predicate::Predicate;
use crate::pipeline::tracking::{TrackState, TrackingToggle};
use crate::pipeline::{PipelineContext, build_predicate};

const TRACKING_UPDATED: &str = "Your tracked events have been updated.";

/// What a call to `load_next` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was appended to the list
    Loaded(Page),

    /// No cursor left under the current filters
    Exhausted,

    /// The response belonged to filters or a viewer that changed meanwhile
    Stale,

    /// Another fetch is already running
    Busy,
}

struct SessionState {
    fetcher: PageFetcher,
    viewer: Viewer,
    filters: FilterState,
    pages: Vec<Page>,
    paginator: Paginator,
    generation: u64,
    in_flight: bool,
    pending_toggles: HashSet<String>,
}

impl SessionState {
    fn predicate(&self) -> Predicate {
        build_predicate(&self.viewer, &self.filters)
    }

    fn cache_key(&self) -> CacheKey {
        self.paginator.cache_key()
    }

    /// Drop the list and start over at page 0.
    fn restart(&mut self) {
        self.pages.clear();
        self.paginator =
            Paginator::new(self.fetcher.clone(), self.viewer.clone(), self.predicate());
        self.generation += 1;
        self.in_flight = false;
    }

    fn set_tracked(&mut self, event_id: &str, state: TrackState) {
        for listing in self.pages.iter_mut().flat_map(|p| p.events.iter_mut()) {
            if listing.id == event_id {
                listing.is_tracked = state.is_tracked();
            }
        }
    }

    fn tracked_state(&self, event_id: &str) -> Option<TrackState> {
        self.pages
            .iter()
            .flat_map(|p| p.events.iter())
            .find(|listing| listing.id == event_id)
            .map(|listing| TrackState::from_tracked(listing.is_tracked))
    }
}

/// Discovery list for one viewer session.
pub struct DiscoverySession {
    ctx: PipelineContext,
    toggle: TrackingToggle,
    state: Mutex<SessionState>,
}

impl DiscoverySession {
    pub fn new(ctx: PipelineContext, viewer: Viewer) -> Self {
        let filters = FilterState::with_scope(viewer.default_scope());
        let fetcher = PageFetcher::new(&ctx);
        let paginator = Paginator::new(
            fetcher.clone(),
            viewer.clone(),
            build_predicate(&viewer, &filters),
        );
        Self {
            toggle: TrackingToggle::new(&ctx),
            ctx,
            state: Mutex::new(SessionState {
                fetcher,
                viewer,
                filters,
                pages: Vec::new(),
                paginator,
                generation: 0,
                in_flight: false,
                pending_toggles: HashSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn viewer(&self) -> Viewer {
        self.lock().viewer.clone()
    }

    pub fn filters(&self) -> FilterState {
        self.lock().filters.clone()
    }

    /// Predicate the next page will be fetched with.
    pub fn predicate(&self) -> Predicate {
        self.lock().paginator.predicate().clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn cursor(&self) -> Option<u32> {
        self.lock().paginator.cursor()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor().is_none()
    }

    /// Every loaded event, in list order.
    pub fn events(&self) -> Vec<EventListing> {
        self.lock()
            .pages
            .iter()
            .flat_map(|p| p.events.iter().cloned())
            .collect()
    }

    /// Total matches reported with the first page.
    pub fn total(&self) -> Option<u64> {
        self.lock().pages.first().map(|p| p.total)
    }

    /// Switch to another viewer. The scope falls back to the new role's
    /// default before anything else can be fetched.
    pub fn set_viewer(&self, viewer: Viewer) {
        let mut state = self.lock();
        if state.viewer == viewer {
            return;
        }
        log::info!(
            "Viewer changed from {:?} to {:?}",
            state.viewer.role(),
            viewer.role()
        );
        state.filters.scope = viewer.default_scope();
        state.viewer = viewer;
        state.pending_toggles.clear();
        state.restart();
    }

    /// Replace every filter field at once.
    pub fn set_filters(&self, filters: FilterState) -> Result<()> {
        let search = normalize_search(&filters.search, self.ctx.discovery.max_search_length)?;
        let mut state = self.lock();
        let scope = match state.viewer {
            Viewer::Guest { .. } => Scope::OutAffiliation,
            Viewer::Student { .. } => filters.scope,
        };
        let next = FilterState {
            search,
            window: filters.window,
            scope,
        };
        if next == state.filters {
            return Ok(());
        }

        let stale = state.cache_key();
        state.filters = next;
        state.restart();
        drop(state);

        self.ctx.cache.invalidate(&stale);
        Ok(())
    }

    pub fn set_search(&self, text: &str) -> Result<()> {
        let filters = FilterState {
            search: text.to_string(),
            ..self.filters()
        };
        self.set_filters(filters)
    }

    pub fn set_window(&self, window: TimeWindow) -> Result<()> {
        let filters = FilterState {
            window,
            ..self.filters()
        };
        self.set_filters(filters)
    }

    /// Guests stay on out-affiliation whatever is asked for.
    pub fn set_scope(&self, scope: Scope) -> Result<()> {
        let filters = FilterState {
            scope,
            ..self.filters()
        };
        self.set_filters(filters)
    }

    /// Back to an empty search on upcoming events in the default scope.
    pub fn clear_filters(&self) -> Result<()> {
        let scope = self.lock().viewer.default_scope();
        self.set_filters(FilterState::with_scope(scope))
    }

    /// Fetch the page at the cursor and append it.
    ///
    /// The fetch runs on a copy of the paginator, which replaces the
    /// session's only if the generation still matches. Failures are
    /// reported through the notifier and leave the cursor where it was,
    /// so calling again retries.
    pub async fn load_next(&self) -> Result<LoadOutcome> {
        let (generation, mut paginator) = {
            let mut state = self.lock();
            if state.in_flight {
                return Ok(LoadOutcome::Busy);
            }
            if state.paginator.cursor().is_none() {
                return Ok(LoadOutcome::Exhausted);
            }
            state.in_flight = true;
            (state.generation, state.paginator.clone())
        };

        let result = paginator.next_page().await;

        let mut state = self.lock();
        if state.generation != generation {
            log::debug!(
                "Discarding page from generation {} (now {})",
                generation,
                state.generation
            );
            return Ok(LoadOutcome::Stale);
        }
        state.in_flight = false;

        match result {
            Ok(PageStep::Page(page)) => {
                state.paginator = paginator;
                state.pages.push(page.clone());
                Ok(LoadOutcome::Loaded(page))
            }
            Ok(PageStep::Exhausted) => Ok(LoadOutcome::Exhausted),
            Err(e) => {
                drop(state);
                self.report(&e);
                Err(e)
            }
        }
    }

    /// The end of the list became visible.
    pub async fn on_sentinel_visible(&self) -> Result<LoadOutcome> {
        self.load_next().await
    }

    /// Refetch every loaded page under the current filters.
    pub async fn refresh(&self) -> Result<()> {
        let (generation, mut paginator, count) = {
            let mut state = self.lock();
            let count = state.pages.len().max(1);
            state.restart();
            state.in_flight = true;
            (state.generation, state.paginator.clone(), count)
        };
        self.ctx.cache.invalidate(&paginator.cache_key());

        let mut pages = Vec::new();
        let mut failure = None;
        while pages.len() < count {
            match paginator.next_page().await {
                Ok(PageStep::Page(page)) => pages.push(page),
                Ok(PageStep::Exhausted) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut state = self.lock();
        if state.generation != generation {
            log::debug!("Discarding refresh from generation {}", generation);
            return Ok(());
        }
        state.in_flight = false;
        // On failure the paginator still points at the page that failed.
        state.paginator = paginator;
        state.pages = pages;

        if let Some(e) = failure {
            drop(state);
            self.report(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Flip the tracking state of a listed event.
    ///
    /// The list shows the new state at once. If the write fails the old
    /// state comes back and the failure is reported. A write that settles
    /// after the viewer changed leaves the new viewer's list alone.
    pub async fn toggle_tracking(&self, event_id: &str) -> Result<TrackState> {
        let (viewer, prior, generation) = {
            let mut state = self.lock();
            let Some(prior) = state.tracked_state(event_id) else {
                drop(state);
                let e = AppError::not_found(format!("event '{event_id}' is not in the list"));
                self.report(&e);
                return Err(e);
            };
            if !state.pending_toggles.insert(event_id.to_string()) {
                log::debug!("Toggle for {} already pending", event_id);
                return Ok(prior);
            }
            state.set_tracked(event_id, prior.toggled());
            (state.viewer.clone(), prior, state.generation)
        };
        let target = prior.toggled();

        let result = self.toggle.set(&viewer, event_id, target).await;

        let same_viewer = {
            let mut state = self.lock();
            let same_viewer = state.viewer == viewer;
            if same_viewer {
                state.pending_toggles.remove(event_id);
            }
            if result.is_err() && state.generation == generation {
                state.set_tracked(event_id, prior);
            }
            same_viewer
        };
        if !same_viewer {
            log::debug!("Viewer changed while toggling {}; result dropped", event_id);
            return result.map(|()| target);
        }

        match result {
            Ok(()) => {
                self.ctx.notifier.success(TRACKING_UPDATED);
                if let Err(e) = self.refresh().await {
                    log::warn!("Mark saved but the list could not be refreshed: {}", e);
                }
                Ok(target)
            }
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    /// Apply every identity change to this session until the sender goes
    /// away.
    pub fn follow_identity(
        self: Arc<Self>,
        mut claims: watch::Receiver<Option<UserClaims>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let current = claims.borrow_and_update().clone();
            self.set_viewer(Viewer::from_claims(current.as_ref()));
            while claims.changed().await.is_ok() {
                let current = claims.borrow_and_update().clone();
                self.set_viewer(Viewer::from_claims(current.as_ref()));
            }
            log::debug!("Identity stream closed");
        })
    }

    fn report(&self, error: &AppError) {
        self.ctx.notifier.failure(&ErrorEnvelope::from(error));
    }
}
