//! Student dashboard: attended events, joined clubs and the affiliation
//! profile, read side by side.

use serde::Serialize;

use crate::error::{AppError, ErrorEnvelope, Result};
use crate::models::{AffiliationId, AffiliationProfile, Club, ParticipatedEvent, Viewer, ViewerId};
use crate::storage::ProfileStore;

const STUDENTS_ONLY: &str =
    "This dashboard is only available to users who have signed up with a valid student email.";

/// Everything the dashboard shows for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub viewer: ViewerId,
    pub affiliation: AffiliationId,

    /// Absent when the affiliation row is missing
    pub profile: Option<AffiliationProfile>,

    pub participated: Vec<ParticipatedEvent>,
    pub clubs: Vec<Club>,
}

/// Keep the kind of a failed read, swap in a message fit for the viewer.
fn read_failed(message: &'static str) -> impl Fn(AppError) -> AppError {
    move |e| {
        log::warn!("{}: {}", message, e);
        AppError::Remote(
            ErrorEnvelope::new(e.kind(), message)
                .with_metadata(serde_json::json!({ "cause": e.to_string() })),
        )
    }
}

/// Load the dashboard of a student. The three reads run concurrently and
/// the first failure wins.
pub async fn dashboard(store: &dyn ProfileStore, viewer: &Viewer) -> Result<Dashboard> {
    let Viewer::Student { id, affiliation } = viewer else {
        return Err(AppError::forbidden(STUDENTS_ONLY));
    };

    let (profile, participated, clubs) = futures::try_join!(
        async {
            store
                .affiliation_profile(affiliation)
                .await
                .map_err(read_failed("Failed to fetch school profile."))
        },
        async {
            store
                .participated_events(id)
                .await
                .map_err(read_failed("Could not fetch participated events."))
        },
        async {
            store
                .joined_clubs(id)
                .await
                .map_err(read_failed("Could not fetch joined clubs."))
        },
    )?;

    log::debug!(
        "Dashboard for {}: {} events, {} clubs",
        id,
        participated.len(),
        clubs.len()
    );

    Ok(Dashboard {
        viewer: id.clone(),
        affiliation: affiliation.clone(),
        profile,
        participated,
        clubs,
    })
}
