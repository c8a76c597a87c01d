//! Symbolic query predicate shared by every store backend.
//!
//! A predicate is a conjunction of conditions plus a sort order. It never
//! holds a concrete "now": time windows are bound to an instant only when
//! a page is actually issued.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::{AffiliationId, EventKind, EventListing, TimeWindow, VerificationState};

/// A single conjunct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Condition {
    KindIs(EventKind),
    ClubVerification(VerificationState),
    ClubAffiliationIs(AffiliationId),
    ClubAffiliationIsNot(AffiliationId),
    /// Case-insensitive substring of the event name
    NameContains(String),
    Window(TimeWindow),
}

/// Ordering on event start time. Ties break on event id in the same
/// direction so page boundaries are stable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Stable hex digest identifying a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateHash(String);

impl PredicateHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PredicateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Predicate {
    conditions: Vec<Condition>,
    order: SortOrder,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a conjunct. Duplicate conditions are kept once.
    pub fn and(mut self, condition: Condition) -> Self {
        if !self.conditions.contains(&condition) {
            self.conditions.push(condition);
        }
        self
    }

    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Conjunctive combination. The order of `other` wins.
    pub fn merge(self, other: Predicate) -> Predicate {
        let order = other.order;
        other
            .conditions
            .into_iter()
            .fold(self, Predicate::and)
            .ordered(order)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    /// Canonical text form, independent of conjunct order.
    pub fn canonical(&self) -> String {
        let mut parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| match c {
                Condition::KindIs(kind) => format!("kind={}", kind.as_str()),
                Condition::ClubVerification(state) => {
                    format!("club.verification={}", state.as_str())
                }
                Condition::ClubAffiliationIs(id) => format!("club.affiliation={id}"),
                Condition::ClubAffiliationIsNot(id) => format!("club.affiliation!={id}"),
                Condition::NameContains(text) => format!("name~{}", text.to_lowercase()),
                Condition::Window(window) => format!("window={window}"),
            })
            .collect();
        parts.sort();

        let order = match self.order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        format!("{};order={}", parts.join(";"), order)
    }

    /// SHA-256 of the canonical form, hex encoded.
    pub fn fingerprint(&self) -> PredicateHash {
        let digest = Sha256::digest(self.canonical().as_bytes());
        PredicateHash(hex::encode(digest))
    }

    /// Evaluate against a joined listing at the given instant.
    pub fn matches(&self, listing: &EventListing, now: DateTime<Utc>) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::KindIs(kind) => listing.kind == *kind,
            Condition::ClubVerification(state) => listing.club.verification == *state,
            Condition::ClubAffiliationIs(id) => listing.club.affiliation_id == *id,
            Condition::ClubAffiliationIsNot(id) => listing.club.affiliation_id != *id,
            Condition::NameContains(text) => listing
                .name
                .to_lowercase()
                .contains(&text.to_lowercase()),
            Condition::Window(TimeWindow::Upcoming) => listing.starts_at >= now,
            Condition::Window(TimeWindow::Past) => listing.starts_at < now,
        })
    }

    /// Compare two listings under this predicate's ordering.
    pub fn compare(&self, a: &EventListing, b: &EventListing) -> Ordering {
        let ascending = a
            .starts_at
            .cmp(&b.starts_at)
            .then_with(|| a.id.cmp(&b.id));
        match self.order {
            SortOrder::Ascending => ascending,
            SortOrder::Descending => ascending.reverse(),
        }
    }

    /// Render as REST gateway filter pairs (`column=op.value`).
    ///
    /// Name search goes out as a case-insensitive regex with every
    /// metacharacter escaped, so the gateway matches the text literally.
    /// `ilike` can't express that: the gateway turns each `*` into `%`.
    pub fn to_query_pairs(&self, now: DateTime<Utc>) -> Vec<(String, String)> {
        let now = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut pairs: Vec<(String, String)> = self
            .conditions
            .iter()
            .map(|c| match c {
                Condition::KindIs(kind) => ("event_type".into(), format!("eq.{}", kind.as_str())),
                Condition::ClubVerification(state) => (
                    "club.verification_status".into(),
                    format!("eq.{}", state.as_str()),
                ),
                Condition::ClubAffiliationIs(id) => ("club.school_id".into(), format!("eq.{id}")),
                Condition::ClubAffiliationIsNot(id) => {
                    ("club.school_id".into(), format!("neq.{id}"))
                }
                Condition::NameContains(text) => {
                    ("name".into(), format!("imatch.{}", regex::escape(text)))
                }
                Condition::Window(TimeWindow::Upcoming) => ("date".into(), format!("gte.{now}")),
                Condition::Window(TimeWindow::Past) => ("date".into(), format!("lt.{now}")),
            })
            .collect();

        let order = match self.order {
            SortOrder::Ascending => "date.asc,id.asc",
            SortOrder::Descending => "date.desc,id.desc",
        };
        pairs.push(("order".into(), order.into()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::ClubBrief;

    fn listing(name: &str, day: u32, affiliation: &str) -> EventListing {
        EventListing {
            id: format!("e-{day}"),
            name: name.to_string(),
            starts_at: Utc.with_ymd_and_hms(2026, 10, day, 12, 0, 0).unwrap(),
            banner_url: None,
            kind: EventKind::InterAffiliation,
            club: ClubBrief {
                id: "c1".to_string(),
                name: "Chess".to_string(),
                affiliation_id: AffiliationId(affiliation.to_string()),
                affiliation_name: None,
                verification: VerificationState::Verified,
            },
            is_tracked: false,
        }
    }

    #[test]
    fn test_fingerprint_ignores_conjunct_order() {
        let a = Predicate::new()
            .and(Condition::KindIs(EventKind::InterAffiliation))
            .and(Condition::ClubVerification(VerificationState::Verified));
        let b = Predicate::new()
            .and(Condition::ClubVerification(VerificationState::Verified))
            .and(Condition::KindIs(EventKind::InterAffiliation));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_order() {
        let a = Predicate::new().and(Condition::Window(TimeWindow::Past));
        let b = a.clone().ordered(SortOrder::Descending);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_matches_name_case_insensitively() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let p = Predicate::new().and(Condition::NameContains("CHESS".into()));
        assert!(p.matches(&listing("Chess night", 5, "A"), now));
        assert!(!p.matches(&listing("Go night", 5, "A"), now));
    }

    #[test]
    fn test_window_boundaries() {
        let now = Utc.with_ymd_and_hms(2026, 10, 5, 12, 0, 0).unwrap();
        let at_now = listing("x", 5, "A");
        let upcoming = Predicate::new().and(Condition::Window(TimeWindow::Upcoming));
        let past = Predicate::new().and(Condition::Window(TimeWindow::Past));
        assert!(upcoming.matches(&at_now, now));
        assert!(!past.matches(&at_now, now));
    }

    #[test]
    fn test_affiliation_conditions() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let own = Predicate::new().and(Condition::ClubAffiliationIs(AffiliationId("A".into())));
        let other =
            Predicate::new().and(Condition::ClubAffiliationIsNot(AffiliationId("A".into())));
        assert!(own.matches(&listing("x", 2, "A"), now));
        assert!(!own.matches(&listing("x", 2, "B"), now));
        assert!(other.matches(&listing("x", 2, "B"), now));
    }

    #[test]
    fn test_merge_keeps_other_order() {
        let visibility = Predicate::new().and(Condition::KindIs(EventKind::InterAffiliation));
        let fragment = Predicate::new()
            .and(Condition::Window(TimeWindow::Past))
            .ordered(SortOrder::Descending);
        let merged = visibility.merge(fragment);
        assert_eq!(merged.conditions().len(), 2);
        assert_eq!(merged.order(), SortOrder::Descending);
    }

    #[test]
    fn test_name_search_is_literal_on_both_sides() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let p = Predicate::new().and(Condition::NameContains("a_c".into()));
        assert!(!p.matches(&listing("abc", 5, "A"), now));
        assert!(p.matches(&listing("A_C night", 5, "A"), now));
        assert!(p
            .to_query_pairs(now)
            .contains(&("name".to_string(), "imatch.a_c".to_string())));

        let p = Predicate::new().and(Condition::NameContains("50% off (1+1)*".into()));
        assert!(p.to_query_pairs(now).contains(&(
            "name".to_string(),
            r"imatch.50% off \(1\+1\)\*".to_string()
        )));
    }

    #[test]
    fn test_query_pairs() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let p = Predicate::new()
            .and(Condition::ClubAffiliationIsNot(AffiliationId("A".into())))
            .and(Condition::Window(TimeWindow::Upcoming));
        let pairs = p.to_query_pairs(now);
        assert!(pairs.contains(&("club.school_id".to_string(), "neq.A".to_string())));
        assert!(pairs.contains(&(
            "date".to_string(),
            "gte.2026-10-16T00:00:00.000Z".to_string()
        )));
        assert_eq!(
            pairs.last(),
            Some(&("order".to_string(), "date.asc,id.asc".to_string()))
        );
    }
}
