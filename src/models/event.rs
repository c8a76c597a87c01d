//! Event, Club, Affiliation and TrackingMark data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AffiliationId, ViewerId};

/// Whether an event is open to other affiliations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Only for members of the owning club's affiliation
    #[serde(rename = "intra-school")]
    IntraAffiliation,

    /// Open to every affiliation
    #[serde(rename = "inter-school")]
    InterAffiliation,
}

/// Moderation status of a club.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationState {
    Pending,
    Verified,
    Rejected,
}

impl VerificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationState::Pending => "pending",
            VerificationState::Verified => "verified",
            VerificationState::Rejected => "rejected",
        }
    }
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IntraAffiliation => "intra-school",
            EventKind::InterAffiliation => "inter-school",
        }
    }
}

/// A home affiliation and the email suffix its members sign up with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
    pub id: AffiliationId,
    pub name: String,

    /// Suffix including the leading '@' (e.g. "@uni.edu")
    pub email_suffix: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Affiliation {
    pub fn profile(&self) -> AffiliationProfile {
        AffiliationProfile {
            name: self.name.clone(),
            location: self.location.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// What the dashboard shows about a viewer's affiliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliationProfile {
    pub name: String,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,
}

/// A club row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Club {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub logo_url: Option<String>,

    #[serde(rename = "school_id")]
    pub affiliation_id: AffiliationId,

    #[serde(default)]
    pub leader_id: Option<ViewerId>,

    #[serde(rename = "verification_status")]
    pub verification: VerificationState,
}

/// A club about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewClub {
    pub name: String,
    pub description: String,
    pub category: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,

    #[serde(rename = "school_id")]
    pub affiliation_id: AffiliationId,

    pub leader_id: ViewerId,

    #[serde(rename = "verification_status")]
    pub verification: VerificationState,
}

/// An event row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,

    #[serde(rename = "date")]
    pub starts_at: DateTime<Utc>,

    #[serde(default)]
    pub banner_url: Option<String>,

    #[serde(rename = "event_type")]
    pub kind: EventKind,

    pub club_id: String,
}

/// Owning club summary joined onto a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClubBrief {
    pub id: String,
    pub name: String,
    pub affiliation_id: AffiliationId,

    #[serde(default)]
    pub affiliation_name: Option<String>,

    pub verification: VerificationState,
}

/// An event joined with its club, annotated for a particular viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventListing {
    pub id: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub banner_url: Option<String>,
    pub kind: EventKind,
    pub club: ClubBrief,

    /// Whether the viewer has a tracking mark on this event. Always
    /// false for viewers that cannot track.
    pub is_tracked: bool,
}

/// A viewer's interest marker on an event. Unique per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackingMark {
    #[serde(rename = "student_id")]
    pub viewer_id: ViewerId,
    pub event_id: String,
}

/// A viewer belonging to a club.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Membership {
    #[serde(rename = "student_id")]
    pub viewer_id: ViewerId,
    pub club_id: String,
}

/// A viewer having attended an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Participation {
    #[serde(rename = "student_id")]
    pub viewer_id: ViewerId,
    pub event_id: String,
}

/// An attended event with the name of the club that ran it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipatedEvent {
    pub id: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub club_name: String,
}

impl TrackingMark {
    pub fn new(viewer_id: ViewerId, event_id: impl Into<String>) -> Self {
        Self {
            viewer_id,
            event_id: event_id.into(),
        }
    }
}
