//! Storage abstractions over the hosted relational data service.
//!
//! The discovery pipeline never touches tables directly. It issues:
//! - one read query: events joined with their club, affiliation and the
//!   viewer's own tracking mark
//! - two writes: insert / delete a tracking mark keyed by viewer + event
//! - a club insert for registration
//!
//! The student dashboard reads through `ProfileStore`: joined clubs,
//! attended events and the affiliation profile.
//!
//! Backends:
//! - `MemoryStore`: in-process tables, loadable from a JSON fixture
//! - `RestStore`: REST gateway of the hosted service

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Affiliation, AffiliationId, AffiliationProfile, Club, EventListing, NewClub,
    ParticipatedEvent, TrackingMark, ViewerId,
};
use crate::pipeline::predicate::Predicate;

// Re-export for convenience
pub use memory::{Dataset, MemoryStore};
pub use rest::RestStore;

/// One read against the events table.
#[derive(Debug, Clone)]
pub struct EventQuery<'a> {
    pub predicate: &'a Predicate,

    /// Whose tracking marks to join (none for anonymous viewers)
    pub viewer: Option<&'a ViewerId>,

    /// First row, zero-based, under the predicate's ordering
    pub offset: u64,

    /// Maximum rows to return
    pub limit: u32,

    /// Instant the time window is evaluated against
    pub now: DateTime<Utc>,
}

/// Rows for one query plus the total number of matches.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub events: Vec<EventListing>,
    pub total: u64,
}

/// Trait for event storage backends.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Run a filtered, ordered, offset/limit read.
    async fn query_events(&self, query: &EventQuery<'_>) -> Result<RawPage>;

    /// Create a tracking mark. Creating an existing mark is a no-op.
    async fn insert_mark(&self, mark: &TrackingMark) -> Result<()>;

    /// Remove a tracking mark. Removing a missing mark is a no-op.
    async fn delete_mark(&self, mark: &TrackingMark) -> Result<()>;

    /// Insert a club and return the stored row.
    async fn insert_club(&self, club: &NewClub) -> Result<Club>;
}

/// Lookup of affiliations by member email suffix.
#[async_trait]
pub trait AffiliationDirectory: Send + Sync {
    /// `suffix` includes the leading '@'.
    async fn find_by_email_suffix(&self, suffix: &str) -> Result<Option<Affiliation>>;
}

/// Per-viewer records shown on the student dashboard.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Clubs the viewer is a member of, by name.
    async fn joined_clubs(&self, viewer: &ViewerId) -> Result<Vec<Club>>;

    /// Events the viewer attended, most recent first.
    async fn participated_events(&self, viewer: &ViewerId) -> Result<Vec<ParticipatedEvent>>;

    async fn affiliation_profile(&self, id: &AffiliationId) -> Result<Option<AffiliationProfile>>;
}
