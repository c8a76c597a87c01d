//! In-process store implementation.
//!
//! Holds the tables in memory and evaluates predicates locally. Used
//! for development against JSON fixtures and for tests; production
//! deployments should use `RestStore`.
//!
//! ## Fixture Layout
//!
//! ```text
//! {
//!   "affiliations": [ { "id", "name", "email_suffix", "location", "image_url" } ],
//!   "clubs":        [ { "id", "name", "school_id", "verification_status", ... } ],
//!   "events":       [ { "id", "name", "date", "event_type", "club_id", ... } ],
//!   "marks":        [ { "student_id", "event_id" } ],
//!   "memberships":    [ { "student_id", "club_id" } ],
//!   "participations": [ { "student_id", "event_id" } ]
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{
    Affiliation, AffiliationId, AffiliationProfile, Club, ClubBrief, Event, EventListing,
    Membership, NewClub, ParticipatedEvent, Participation, TrackingMark, ViewerId,
};
use crate::storage::{AffiliationDirectory, EventQuery, EventStore, ProfileStore, RawPage};

/// Serializable snapshot of every table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub affiliations: Vec<Affiliation>,

    #[serde(default)]
    pub clubs: Vec<Club>,

    #[serde(default)]
    pub events: Vec<Event>,

    #[serde(default)]
    pub marks: Vec<TrackingMark>,

    #[serde(default)]
    pub memberships: Vec<Membership>,

    #[serde(default)]
    pub participations: Vec<Participation>,
}

#[derive(Debug, Default)]
struct Tables {
    affiliations: Vec<Affiliation>,
    clubs: Vec<Club>,
    events: Vec<Event>,
    marks: BTreeSet<TrackingMark>,
    memberships: BTreeSet<Membership>,
    participations: BTreeSet<Participation>,
    next_club: u64,
}

/// In-memory store backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create a store seeded with the given dataset. Duplicate marks collapse.
    pub fn new(dataset: Dataset) -> Self {
        let next_club = dataset.clubs.len() as u64 + 1;
        Self {
            tables: RwLock::new(Tables {
                affiliations: dataset.affiliations,
                clubs: dataset.clubs,
                events: dataset.events,
                marks: dataset.marks.into_iter().collect(),
                memberships: dataset.memberships.into_iter().collect(),
                participations: dataset.participations.into_iter().collect(),
                next_club,
            }),
        }
    }

    /// Load a dataset from a JSON fixture file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let dataset: Dataset = serde_json::from_slice(&bytes)?;
        log::debug!(
            "Loaded fixture {:?}: {} events, {} clubs, {} marks",
            path.as_ref(),
            dataset.events.len(),
            dataset.clubs.len(),
            dataset.marks.len()
        );
        Ok(Self::new(dataset))
    }

    /// Write the current tables back to a JSON file (write to temp, then rename).
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec_pretty(&self.snapshot())?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Copy of every table.
    pub fn snapshot(&self) -> Dataset {
        let tables = self.read();
        Dataset {
            affiliations: tables.affiliations.clone(),
            clubs: tables.clubs.clone(),
            events: tables.events.clone(),
            marks: tables.marks.iter().cloned().collect(),
            memberships: tables.memberships.iter().cloned().collect(),
            participations: tables.participations.iter().cloned().collect(),
        }
    }

    /// Number of tracking marks across all viewers.
    pub fn mark_count(&self) -> usize {
        self.read().marks.len()
    }

    pub fn has_mark(&self, mark: &TrackingMark) -> bool {
        self.read().marks.contains(mark)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Tables {
    /// Join events with club and affiliation. Events whose club is missing
    /// are dropped, as an inner join would.
    fn listings(&self, query: &EventQuery<'_>) -> Vec<EventListing> {
        let clubs: HashMap<&str, &Club> = self.clubs.iter().map(|c| (c.id.as_str(), c)).collect();
        let affiliation_names: HashMap<&str, &str> = self
            .affiliations
            .iter()
            .map(|a| (a.id.0.as_str(), a.name.as_str()))
            .collect();

        self.events
            .iter()
            .filter_map(|event| {
                let club = clubs.get(event.club_id.as_str())?;
                let is_tracked = query.viewer.is_some_and(|viewer| {
                    self.marks
                        .contains(&TrackingMark::new(viewer.clone(), event.id.clone()))
                });
                Some(EventListing {
                    id: event.id.clone(),
                    name: event.name.clone(),
                    starts_at: event.starts_at,
                    banner_url: event.banner_url.clone(),
                    kind: event.kind,
                    club: ClubBrief {
                        id: club.id.clone(),
                        name: club.name.clone(),
                        affiliation_id: club.affiliation_id.clone(),
                        affiliation_name: affiliation_names
                            .get(club.affiliation_id.0.as_str())
                            .map(|s| s.to_string()),
                        verification: club.verification,
                    },
                    is_tracked,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn query_events(&self, query: &EventQuery<'_>) -> Result<RawPage> {
        let tables = self.read();
        let mut rows: Vec<EventListing> = tables
            .listings(query)
            .into_iter()
            .filter(|listing| query.predicate.matches(listing, query.now))
            .collect();
        rows.sort_by(|a, b| query.predicate.compare(a, b));

        let total = rows.len() as u64;
        let events = rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();

        Ok(RawPage { events, total })
    }

    async fn insert_mark(&self, mark: &TrackingMark) -> Result<()> {
        let mut tables = self.write();
        if !tables.events.iter().any(|e| e.id == mark.event_id) {
            return Err(AppError::not_found(format!(
                "event '{}' does not exist",
                mark.event_id
            )));
        }
        if !tables.marks.insert(mark.clone()) {
            log::debug!(
                "Mark ({}, {}) already exists",
                mark.viewer_id,
                mark.event_id
            );
        }
        Ok(())
    }

    async fn delete_mark(&self, mark: &TrackingMark) -> Result<()> {
        self.write().marks.remove(mark);
        Ok(())
    }

    async fn insert_club(&self, club: &NewClub) -> Result<Club> {
        let mut tables = self.write();
        let taken = tables
            .clubs
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&club.name));
        if taken {
            return Err(AppError::validation(
                "Could not register the club. The name might already be taken.",
            ));
        }

        let mut id = format!("club-{}", tables.next_club);
        while tables.clubs.iter().any(|c| c.id == id) {
            tables.next_club += 1;
            id = format!("club-{}", tables.next_club);
        }
        tables.next_club += 1;

        let stored = Club {
            id,
            name: club.name.clone(),
            description: Some(club.description.clone()),
            category: Some(club.category.clone()),
            logo_url: club.logo_url.clone(),
            affiliation_id: club.affiliation_id.clone(),
            leader_id: Some(club.leader_id.clone()),
            verification: club.verification,
        };
        tables.clubs.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl AffiliationDirectory for MemoryStore {
    async fn find_by_email_suffix(&self, suffix: &str) -> Result<Option<Affiliation>> {
        Ok(self
            .read()
            .affiliations
            .iter()
            .find(|a| a.email_suffix.eq_ignore_ascii_case(suffix))
            .cloned())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn joined_clubs(&self, viewer: &ViewerId) -> Result<Vec<Club>> {
        let tables = self.read();
        let mut clubs: Vec<Club> = tables
            .memberships
            .iter()
            .filter(|m| &m.viewer_id == viewer)
            .filter_map(|m| tables.clubs.iter().find(|c| c.id == m.club_id))
            .cloned()
            .collect();
        clubs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(clubs)
    }

    async fn participated_events(&self, viewer: &ViewerId) -> Result<Vec<ParticipatedEvent>> {
        let tables = self.read();
        let clubs: HashMap<&str, &Club> = tables.clubs.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut events: Vec<ParticipatedEvent> = tables
            .participations
            .iter()
            .filter(|p| &p.viewer_id == viewer)
            .filter_map(|p| {
                let event = tables.events.iter().find(|e| e.id == p.event_id)?;
                let club = clubs.get(event.club_id.as_str())?;
                Some(ParticipatedEvent {
                    id: event.id.clone(),
                    name: event.name.clone(),
                    starts_at: event.starts_at,
                    club_name: club.name.clone(),
                })
            })
            .collect();
        events.sort_by(|a, b| b.starts_at.cmp(&a.starts_at).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn affiliation_profile(&self, id: &AffiliationId) -> Result<Option<AffiliationProfile>> {
        Ok(self
            .read()
            .affiliations
            .iter()
            .find(|a| &a.id == id)
            .map(Affiliation::profile))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::models::{AffiliationId, EventKind, VerificationState, ViewerId};
    use crate::pipeline::predicate::{Condition, Predicate, SortOrder};

    fn dataset() -> Dataset {
        let club = |id: &str, school: &str, state| Club {
            id: id.to_string(),
            name: format!("Club {id}"),
            description: None,
            category: None,
            logo_url: None,
            affiliation_id: AffiliationId(school.to_string()),
            leader_id: None,
            verification: state,
        };
        let event = |id: &str, day: u32, club: &str| Event {
            id: id.to_string(),
            name: format!("Event {id}"),
            starts_at: Utc.with_ymd_and_hms(2026, 11, day, 10, 0, 0).unwrap(),
            banner_url: None,
            kind: EventKind::InterAffiliation,
            club_id: club.to_string(),
        };
        Dataset {
            affiliations: vec![Affiliation {
                id: AffiliationId("A".into()),
                name: "Alpha University".into(),
                email_suffix: "@alpha.edu".into(),
                location: Some("Seoul".into()),
                image_url: None,
            }],
            clubs: vec![
                club("c1", "A", VerificationState::Verified),
                club("c2", "B", VerificationState::Pending),
            ],
            events: vec![
                event("e3", 3, "c1"),
                event("e1", 1, "c1"),
                event("e2", 2, "c2"),
                event("orphan", 4, "missing"),
            ],
            marks: vec![],
            memberships: vec![
                Membership {
                    viewer_id: ViewerId("s1".into()),
                    club_id: "c2".into(),
                },
                Membership {
                    viewer_id: ViewerId("s1".into()),
                    club_id: "c1".into(),
                },
                Membership {
                    viewer_id: ViewerId("s2".into()),
                    club_id: "c2".into(),
                },
            ],
            participations: vec![
                Participation {
                    viewer_id: ViewerId("s1".into()),
                    event_id: "e1".into(),
                },
                Participation {
                    viewer_id: ViewerId("s1".into()),
                    event_id: "e3".into(),
                },
                Participation {
                    viewer_id: ViewerId("s1".into()),
                    event_id: "orphan".into(),
                },
            ],
        }
    }

    fn query<'a>(predicate: &'a Predicate, viewer: Option<&'a ViewerId>) -> EventQuery<'a> {
        EventQuery {
            predicate,
            viewer,
            offset: 0,
            limit: 10,
            now: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_query_filters_sorts_and_joins() {
        let store = MemoryStore::new(dataset());
        let predicate =
            Predicate::new().and(Condition::ClubVerification(VerificationState::Verified));

        let page = store.query_events(&query(&predicate, None)).await.unwrap();
        let ids: Vec<_> = page.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e3"]);
        assert_eq!(page.total, 2);
        assert_eq!(
            page.events[0].club.affiliation_name.as_deref(),
            Some("Alpha University")
        );

        let desc = predicate.clone().ordered(SortOrder::Descending);
        let page = store.query_events(&query(&desc, None)).await.unwrap();
        assert_eq!(page.events[0].id, "e3");
    }

    #[tokio::test]
    async fn test_offset_and_limit() {
        let store = MemoryStore::new(dataset());
        let predicate = Predicate::new();
        let mut q = query(&predicate, None);
        q.offset = 1;
        q.limit = 1;

        let page = store.query_events(&q).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].id, "e2");
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_marks_are_unique_and_annotated() {
        let store = MemoryStore::new(dataset());
        let viewer = ViewerId("s1".into());
        let mark = TrackingMark::new(viewer.clone(), "e1");

        store.insert_mark(&mark).await.unwrap();
        store.insert_mark(&mark).await.unwrap();
        assert_eq!(store.mark_count(), 1);

        let predicate = Predicate::new();
        let page = store
            .query_events(&query(&predicate, Some(&viewer)))
            .await
            .unwrap();
        let e1 = page.events.iter().find(|e| e.id == "e1").unwrap();
        assert!(e1.is_tracked);

        store.delete_mark(&mark).await.unwrap();
        store.delete_mark(&mark).await.unwrap();
        assert_eq!(store.mark_count(), 0);
    }

    #[tokio::test]
    async fn test_mark_on_unknown_event_is_not_found() {
        let store = MemoryStore::new(dataset());
        let mark = TrackingMark::new(ViewerId("s1".into()), "nope");
        let err = store.insert_mark(&mark).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_club_name_conflict() {
        let store = MemoryStore::new(dataset());
        let new_club = NewClub {
            name: "club C1".to_string(),
            description: "A description long enough".to_string(),
            category: "Games".to_string(),
            logo_url: None,
            affiliation_id: AffiliationId("A".into()),
            leader_id: ViewerId("s1".into()),
            verification: VerificationState::Pending,
        };
        assert!(matches!(
            store.insert_club(&new_club).await,
            Err(AppError::Validation(_))
        ));

        let fresh = NewClub {
            name: "Robotics".to_string(),
            ..new_club
        };
        let stored = store.insert_club(&fresh).await.unwrap();
        assert_eq!(stored.id, "club-3");
        assert_eq!(stored.verification, VerificationState::Pending);
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let store = MemoryStore::new(dataset());
        let found = store.find_by_email_suffix("@ALPHA.edu").await.unwrap();
        assert_eq!(found.map(|a| a.id), Some(AffiliationId("A".into())));
        assert!(store.find_by_email_suffix("@beta.edu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_profile_reads() {
        let store = MemoryStore::new(dataset());
        let s1 = ViewerId("s1".into());

        let clubs = store.joined_clubs(&s1).await.unwrap();
        let ids: Vec<_> = clubs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(store.joined_clubs(&ViewerId("nobody".into())).await.unwrap().is_empty());

        let events = store.participated_events(&s1).await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e1"]);
        assert_eq!(events[0].club_name, "Club c1");

        let profile = store
            .affiliation_profile(&AffiliationId("A".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.name, "Alpha University");
        assert_eq!(profile.location.as_deref(), Some("Seoul"));
        assert!(store
            .affiliation_profile(&AffiliationId("B".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_demo_fixture_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/fixture.json");
        let store = MemoryStore::load(path).await.unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.affiliations.len(), 2);
        assert_eq!(snapshot.events.len(), 6);
        assert!(store.find_by_email_suffix("@beta.ac").await.unwrap().is_some());

        let student = ViewerId("student-1".into());
        assert_eq!(store.joined_clubs(&student).await.unwrap().len(), 1);
        assert_eq!(store.participated_events(&student).await.unwrap()[0].id, "ev-6");
    }

    #[tokio::test]
    async fn test_save_and_load_fixture() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fixture.json");

        let store = MemoryStore::new(dataset());
        store
            .insert_mark(&TrackingMark::new(ViewerId("s1".into()), "e1"))
            .await
            .unwrap();
        store.save(&path).await.unwrap();

        let loaded = MemoryStore::load(&path).await.unwrap();
        assert_eq!(loaded.mark_count(), 1);
        assert_eq!(loaded.snapshot().events.len(), 4);
        assert_eq!(loaded.snapshot().memberships.len(), 3);
    }
}
