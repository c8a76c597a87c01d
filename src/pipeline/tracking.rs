//! Track / untrack toggle for (viewer, event) pairs.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{TrackingMark, Viewer, ViewerId};
use crate::pipeline::PipelineContext;
use crate::pipeline::cache::PageCache;
use crate::storage::EventStore;

/// Per (viewer, event) state. Only flips between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackState {
    Untracked,
    Tracked,
}

impl TrackState {
    pub fn from_tracked(tracked: bool) -> Self {
        if tracked {
            TrackState::Tracked
        } else {
            TrackState::Untracked
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TrackState::Untracked => TrackState::Tracked,
            TrackState::Tracked => TrackState::Untracked,
        }
    }

    pub fn is_tracked(self) -> bool {
        self == TrackState::Tracked
    }
}

/// Writes tracking marks and invalidates the viewer's cached pages.
#[derive(Clone)]
pub struct TrackingToggle {
    store: Arc<dyn EventStore>,
    cache: Arc<PageCache>,
}

impl TrackingToggle {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self {
            store: Arc::clone(&ctx.store),
            cache: Arc::clone(&ctx.cache),
        }
    }

    /// Create the mark. Tracking an already tracked event is a no-op.
    pub async fn track(&self, viewer: &Viewer, event_id: &str) -> Result<()> {
        let mark = TrackingMark::new(Self::student_id(viewer)?.clone(), event_id);
        self.store.insert_mark(&mark).await?;
        log::info!("{} is now tracking {}", mark.viewer_id, mark.event_id);
        self.cache.invalidate_viewer(Some(&mark.viewer_id));
        Ok(())
    }

    /// Remove the mark. Untracking an untracked event is a no-op.
    pub async fn untrack(&self, viewer: &Viewer, event_id: &str) -> Result<()> {
        let mark = TrackingMark::new(Self::student_id(viewer)?.clone(), event_id);
        self.store.delete_mark(&mark).await?;
        log::info!("{} stopped tracking {}", mark.viewer_id, mark.event_id);
        self.cache.invalidate_viewer(Some(&mark.viewer_id));
        Ok(())
    }

    /// Move the pair into `target`.
    pub async fn set(&self, viewer: &Viewer, event_id: &str, target: TrackState) -> Result<()> {
        match target {
            TrackState::Tracked => self.track(viewer, event_id).await,
            TrackState::Untracked => self.untrack(viewer, event_id).await,
        }
    }

    fn student_id(viewer: &Viewer) -> Result<&ViewerId> {
        match viewer {
            Viewer::Student { id, .. } => Ok(id),
            Viewer::Guest { .. } => Err(AppError::forbidden(
                "Only students with a verified school can track events.",
            )),
        }
    }
}
