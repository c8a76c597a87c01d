//! Student home feed: the next few events at the viewer's own affiliation.

use crate::error::{AppError, Result};
use crate::models::{EventListing, TimeWindow, VerificationState, Viewer};
use crate::pipeline::predicate::{Condition, Predicate, SortOrder};
use crate::storage::{EventQuery, EventStore};
use crate::utils::Clock;

/// Upcoming verified events of the viewer's affiliation, soonest first.
pub async fn home_feed(
    store: &dyn EventStore,
    viewer: &Viewer,
    clock: &dyn Clock,
    limit: u32,
) -> Result<Vec<EventListing>> {
    let Viewer::Student { id, affiliation } = viewer else {
        return Err(AppError::forbidden("User is not a student"));
    };

    let predicate = Predicate::new()
        .and(Condition::ClubVerification(VerificationState::Verified))
        .and(Condition::ClubAffiliationIs(affiliation.clone()))
        .and(Condition::Window(TimeWindow::Upcoming))
        .ordered(SortOrder::Ascending);

    let page = store
        .query_events(&EventQuery {
            predicate: &predicate,
            viewer: Some(id),
            offset: 0,
            limit,
            now: clock.now(),
        })
        .await?;

    let mut events = page.events;
    events.truncate(limit as usize);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{AffiliationId, Club, Event, EventKind};
    use crate::storage::{Dataset, MemoryStore};
    use crate::utils::FixedClock;

    #[tokio::test]
    async fn test_feed_is_own_upcoming_and_limited() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let club = |id: &str, school: &str| Club {
            id: id.into(),
            name: id.into(),
            description: None,
            category: None,
            logo_url: None,
            affiliation_id: AffiliationId(school.into()),
            leader_id: None,
            verification: crate::models::VerificationState::Verified,
        };
        let events = (-3..15)
            .map(|i: i64| Event {
                id: format!("e{:02}", i + 3),
                name: format!("Event {i}"),
                starts_at: now + Duration::days(i),
                banner_url: None,
                kind: EventKind::IntraAffiliation,
                club_id: if i % 5 == 0 { "cb".into() } else { "ca".into() },
            })
            .collect();
        let store = MemoryStore::new(Dataset {
            affiliations: vec![],
            clubs: vec![club("ca", "A"), club("cb", "B")],
            events,
            marks: vec![],
            ..Dataset::default()
        });

        let feed = home_feed(&store, &Viewer::student("s1", "A"), &FixedClock(now), 10)
            .await
            .unwrap();
        assert_eq!(feed.len(), 10);
        assert!(feed.iter().all(|e| e.club.affiliation_id.0 == "A" && e.starts_at >= now));
        assert!(feed.windows(2).all(|w| w[0].starts_at <= w[1].starts_at));
    }

    #[tokio::test]
    async fn test_guest_has_no_feed() {
        let store = MemoryStore::new(Dataset::default());
        let clock = FixedClock(Utc::now());
        let err = home_feed(&store, &Viewer::anonymous(), &clock, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
