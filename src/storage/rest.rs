//! REST gateway storage implementation.
//!
//! Talks to the hosted service's PostgREST-style endpoints:
//!
//! ```text
//! GET    /rest/v1/events?select=...&<filters>&order=...   Range: a-b, Prefer: count=exact
//!        (name search: name=imatch.<escaped regex>)
//! POST   /rest/v1/tracked_events?on_conflict=student_id,event_id
//! DELETE /rest/v1/tracked_events?student_id=eq.X&event_id=eq.Y
//! POST   /rest/v1/clubs
//! GET    /rest/v1/school?email_suffix=eq.@domain
//! GET    /rest/v1/school?id=eq.X                       (profile)
//! GET    /rest/v1/memberships?student_id=eq.X          (joined clubs)
//! GET    /rest/v1/event_participants?student_id=eq.X   (attended events)
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, ErrorEnvelope, ErrorKind, Result};
use crate::models::{
    Affiliation, AffiliationId, AffiliationProfile, Club, ClubBrief, DataConfig, EventKind,
    EventListing, NewClub, ParticipatedEvent, TrackingMark, VerificationState, ViewerId,
};
use crate::storage::{AffiliationDirectory, EventQuery, EventStore, ProfileStore, RawPage};
use crate::utils::http::create_async_client;

const EVENT_SELECT: &str = "id,name,date,banner_url,event_type,\
club:clubs!inner(id,name,school_id,verification_status,university:school(id,name)),\
tracked_events(student_id)";

/// REST-backed store.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base: Url,
}

impl RestStore {
    /// Create a store from data service settings.
    pub fn new(config: &DataConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(AppError::config("data.base_url is not set"));
        }
        let client = create_async_client(config)?;
        Self::with_client(client, &config.base_url)
    }

    /// Create a store with an existing client.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            client,
            base: Url::parse(&base)?,
        })
    }

    fn endpoint(&self, table: &str) -> Result<Url> {
        Ok(self.base.join(&format!("rest/v1/{table}"))?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::transport(format!("data service unreachable: {e}")))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

/// Error body returned by the gateway.
#[derive(Debug, Default, Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Wrap a non-2xx response into the uniform envelope.
pub(crate) async fn error_from_response(response: Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let gateway: GatewayError = serde_json::from_str(&body).unwrap_or_default();

    let kind = match status {
        StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
        StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT => ErrorKind::ValidationFailure,
        _ => ErrorKind::TransportFailure,
    };
    let message = gateway
        .message
        .clone()
        .unwrap_or_else(|| format!("data service returned {status}"));

    log::warn!("Data service error {}: {}", status, message);

    AppError::Remote(ErrorEnvelope::new(kind, message).with_metadata(serde_json::json!({
        "status": status.as_u16(),
        "upstream_code": gateway.code,
        "details": gateway.details,
        "hint": gateway.hint,
    })))
}

/// Total row count from a `Content-Range: a-b/total` header.
fn parse_total(header: Option<&str>) -> Option<u64> {
    header?.rsplit('/').next()?.trim().parse().ok()
}

#[derive(Debug, Deserialize)]
struct EventRow {
    id: String,
    name: String,
    date: DateTime<Utc>,
    #[serde(default)]
    banner_url: Option<String>,
    event_type: EventKind,
    club: ClubRow,
    #[serde(default)]
    tracked_events: Vec<TrackedRow>,
}

#[derive(Debug, Deserialize)]
struct ClubRow {
    id: String,
    name: String,
    school_id: AffiliationId,
    verification_status: VerificationState,
    #[serde(default)]
    university: Option<UniversityRow>,
}

#[derive(Debug, Deserialize)]
struct UniversityRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackedRow {
    student_id: String,
}

impl EventRow {
    fn into_listing(self, viewer: Option<&str>) -> EventListing {
        let is_tracked = viewer.is_some_and(|v| self.tracked_events.iter().any(|t| t.student_id == v));
        EventListing {
            id: self.id,
            name: self.name,
            starts_at: self.date,
            banner_url: self.banner_url,
            kind: self.event_type,
            club: ClubBrief {
                id: self.club.id,
                name: self.club.name,
                affiliation_id: self.club.school_id,
                affiliation_name: self.club.university.map(|u| u.name),
                verification: self.club.verification_status,
            },
            is_tracked,
        }
    }
}

#[async_trait]
impl EventStore for RestStore {
    async fn query_events(&self, query: &EventQuery<'_>) -> Result<RawPage> {
        let mut url = self.endpoint("events")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", EVENT_SELECT);
            for (column, filter) in query.predicate.to_query_pairs(query.now) {
                pairs.append_pair(&column, &filter);
            }
            if let Some(viewer) = query.viewer {
                pairs.append_pair("tracked_events.student_id", &format!("eq.{viewer}"));
            }
        }

        if query.limit == 0 {
            return Ok(RawPage::default());
        }
        let first = query.offset;
        let last = query.offset + u64::from(query.limit) - 1;

        log::debug!("GET {} (rows {}-{})", url, first, last);
        let response = self
            .send(
                self.client
                    .get(url)
                    .header("Range-Unit", "items")
                    .header("Range", format!("{first}-{last}"))
                    .header("Prefer", "count=exact"),
            )
            .await?;

        let total = parse_total(
            response
                .headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok()),
        );
        let rows: Vec<EventRow> = response.json().await?;
        let viewer = query.viewer.map(|v| v.0.as_str());
        let events: Vec<EventListing> = rows.into_iter().map(|r| r.into_listing(viewer)).collect();
        let total = total.unwrap_or(query.offset + events.len() as u64);

        Ok(RawPage { events, total })
    }

    async fn insert_mark(&self, mark: &TrackingMark) -> Result<()> {
        let mut url = self.endpoint("tracked_events")?;
        url.query_pairs_mut()
            .append_pair("on_conflict", "student_id,event_id");

        self.send(
            self.client
                .post(url)
                .header("Prefer", "resolution=ignore-duplicates,return=minimal")
                .json(&[mark]),
        )
        .await?;
        Ok(())
    }

    async fn delete_mark(&self, mark: &TrackingMark) -> Result<()> {
        let mut url = self.endpoint("tracked_events")?;
        url.query_pairs_mut()
            .append_pair("student_id", &format!("eq.{}", mark.viewer_id))
            .append_pair("event_id", &format!("eq.{}", mark.event_id));

        self.send(self.client.delete(url).header("Prefer", "return=minimal"))
            .await?;
        Ok(())
    }

    async fn insert_club(&self, club: &NewClub) -> Result<Club> {
        let url = self.endpoint("clubs")?;
        let response = self
            .send(
                self.client
                    .post(url)
                    .header("Prefer", "return=representation")
                    .json(&[club]),
            )
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::ValidationFailure => AppError::validation(
                    "Could not register the club. The name might already be taken.",
                ),
                _ => e,
            })?;

        let mut rows: Vec<Club> = response.json().await?;
        if rows.is_empty() {
            return Err(AppError::transport("club insert returned no row"));
        }
        Ok(rows.swap_remove(0))
    }
}

#[async_trait]
impl AffiliationDirectory for RestStore {
    async fn find_by_email_suffix(&self, suffix: &str) -> Result<Option<Affiliation>> {
        let mut url = self.endpoint("school")?;
        url.query_pairs_mut()
            .append_pair("select", "id,name,email_suffix")
            .append_pair("email_suffix", &format!("eq.{suffix}"))
            .append_pair("limit", "1");

        let response = self.send(self.client.get(url)).await?;
        let mut rows: Vec<Affiliation> = response.json().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }
}

#[derive(Debug, Deserialize)]
struct MembershipRow {
    club: Option<Club>,
}

#[derive(Debug, Deserialize)]
struct ParticipationRow {
    event: Option<ParticipatedRow>,
}

#[derive(Debug, Deserialize)]
struct ParticipatedRow {
    id: String,
    name: String,
    date: DateTime<Utc>,
    club: ClubNameRow,
}

#[derive(Debug, Deserialize)]
struct ClubNameRow {
    name: String,
}

#[async_trait]
impl ProfileStore for RestStore {
    async fn joined_clubs(&self, viewer: &ViewerId) -> Result<Vec<Club>> {
        let mut url = self.endpoint("memberships")?;
        url.query_pairs_mut()
            .append_pair("select", "club:clubs(*)")
            .append_pair("student_id", &format!("eq.{viewer}"));

        let response = self.send(self.client.get(url)).await?;
        let rows: Vec<MembershipRow> = response.json().await?;
        let mut clubs: Vec<Club> = rows.into_iter().filter_map(|r| r.club).collect();
        clubs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(clubs)
    }

    async fn participated_events(&self, viewer: &ViewerId) -> Result<Vec<ParticipatedEvent>> {
        let mut url = self.endpoint("event_participants")?;
        url.query_pairs_mut()
            .append_pair("select", "event:events(id,name,date,club:clubs(name))")
            .append_pair("student_id", &format!("eq.{viewer}"));

        let response = self.send(self.client.get(url)).await?;
        let rows: Vec<ParticipationRow> = response.json().await?;
        let mut events: Vec<ParticipatedEvent> = rows
            .into_iter()
            .filter_map(|r| r.event)
            .map(|e| ParticipatedEvent {
                id: e.id,
                name: e.name,
                starts_at: e.date,
                club_name: e.club.name,
            })
            .collect();
        events.sort_by(|a, b| b.starts_at.cmp(&a.starts_at).then_with(|| a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn affiliation_profile(&self, id: &AffiliationId) -> Result<Option<AffiliationProfile>> {
        let mut url = self.endpoint("school")?;
        url.query_pairs_mut()
            .append_pair("select", "name,location,image_url")
            .append_pair("id", &format!("eq.{id}"))
            .append_pair("limit", "1");

        let response = self.send(self.client.get(url)).await?;
        let mut rows: Vec<AffiliationProfile> = response.json().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::matchers::{body_json, header, headers, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::models::{TimeWindow, ViewerId};
    use crate::pipeline::predicate::{Condition, Predicate};

    fn store(server: &MockServer) -> RestStore {
        RestStore::new(&DataConfig {
            base_url: server.uri(),
            api_key: "anon-key".to_string(),
            ..DataConfig::default()
        })
        .unwrap()
    }

    fn row(id: &str, tracked_by: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("Event {id}"),
            "date": "2026-11-02T18:00:00+00:00",
            "banner_url": null,
            "event_type": "inter-school",
            "club": {
                "id": "c1",
                "name": "Chess Club",
                "school_id": "A",
                "verification_status": "verified",
                "university": { "id": "A", "name": "Alpha University" }
            },
            "tracked_events": tracked_by
                .iter()
                .map(|s| serde_json::json!({ "student_id": s }))
                .collect::<Vec<_>>()
        })
    }

    #[test]
    fn test_parse_total() {
        assert_eq!(parse_total(Some("0-8/42")), Some(42));
        assert_eq!(parse_total(Some("*/0")), Some(0));
        assert_eq!(parse_total(Some("0-8/*")), None);
        assert_eq!(parse_total(None), None);
    }

    #[tokio::test]
    async fn test_query_events_sends_filters_and_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param("club.verification_status", "eq.verified"))
            .and(query_param("event_type", "eq.inter-school"))
            .and(query_param("date", "gte.2026-10-16T00:00:00.000Z"))
            .and(query_param("order", "date.asc,id.asc"))
            .and(query_param("tracked_events.student_id", "eq.s1"))
            .and(header("Range", "9-17"))
            .and(header("apikey", "anon-key"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "9-10/11")
                    .set_body_json(vec![row("e10", &["s1"]), row("e11", &[])]),
            )
            .mount(&server)
            .await;

        let predicate = Predicate::new()
            .and(Condition::ClubVerification(VerificationState::Verified))
            .and(Condition::KindIs(EventKind::InterAffiliation))
            .and(Condition::Window(TimeWindow::Upcoming));
        let viewer = ViewerId("s1".into());
        let query = EventQuery {
            predicate: &predicate,
            viewer: Some(&viewer),
            offset: 9,
            limit: 9,
            now: Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap(),
        };

        let page = store(&server).query_events(&query).await.unwrap();
        assert_eq!(page.total, 11);
        assert_eq!(page.events.len(), 2);
        assert!(page.events[0].is_tracked);
        assert!(!page.events[1].is_tracked);
        assert_eq!(
            page.events[0].club.affiliation_name.as_deref(),
            Some("Alpha University")
        );
    }

    #[tokio::test]
    async fn test_name_search_is_escaped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param("name", r"imatch.a_c\*\.%"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Range", "*/0")
                    .set_body_json(serde_json::json!([])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let predicate = Predicate::new().and(Condition::NameContains("a_c*.%".into()));
        let query = EventQuery {
            predicate: &predicate,
            viewer: None,
            offset: 0,
            limit: 9,
            now: Utc::now(),
        };
        let page = store(&server).query_events(&query).await.unwrap();
        assert!(page.events.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_gateway_error_is_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "code": "XX000",
                "message": "connection reset",
                "details": null,
                "hint": null
            })))
            .mount(&server)
            .await;

        let predicate = Predicate::new();
        let query = EventQuery {
            predicate: &predicate,
            viewer: None,
            offset: 0,
            limit: 9,
            now: Utc::now(),
        };
        let err = store(&server).query_events(&query).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);

        let envelope = err.envelope();
        assert_eq!(envelope.message, "connection reset");
        assert_eq!(envelope.metadata.unwrap()["upstream_code"], "XX000");
    }

    #[tokio::test]
    async fn test_insert_mark_ignores_duplicates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/tracked_events"))
            .and(query_param("on_conflict", "student_id,event_id"))
            .and(headers(
                "Prefer",
                vec!["resolution=ignore-duplicates", "return=minimal"],
            ))
            .and(body_json(serde_json::json!([
                { "student_id": "s1", "event_id": "e1" }
            ])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mark = TrackingMark::new(ViewerId("s1".into()), "e1");
        store(&server).insert_mark(&mark).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_mark_targets_pair() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/tracked_events"))
            .and(query_param("student_id", "eq.s1"))
            .and(query_param("event_id", "eq.e1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mark = TrackingMark::new(ViewerId("s1".into()), "e1");
        store(&server).delete_mark(&mark).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_by_email_suffix() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/school"))
            .and(query_param("email_suffix", "eq.@alpha.edu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "A", "name": "Alpha University", "email_suffix": "@alpha.edu" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/school"))
            .and(query_param("email_suffix", "eq.@beta.edu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let store = store(&server);
        let found = store.find_by_email_suffix("@alpha.edu").await.unwrap();
        assert_eq!(found.unwrap().id, AffiliationId("A".into()));
        assert!(store.find_by_email_suffix("@beta.edu").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_club_conflict_is_validation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/clubs"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            })))
            .mount(&server)
            .await;

        let club = NewClub {
            name: "Chess".into(),
            description: "We play chess every week".into(),
            category: "Games".into(),
            logo_url: None,
            affiliation_id: AffiliationId("A".into()),
            leader_id: ViewerId("s1".into()),
            verification: VerificationState::Pending,
        };
        let err = store(&server).insert_club(&club).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_joined_clubs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/memberships"))
            .and(query_param("select", "club:clubs(*)"))
            .and(query_param("student_id", "eq.s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "club": {
                    "id": "c2", "name": "Robotics", "category": "Technology",
                    "school_id": "A", "verification_status": "verified"
                } },
                { "club": null },
                { "club": {
                    "id": "c1", "name": "Chess", "category": "Games",
                    "school_id": "A", "verification_status": "pending"
                } }
            ])))
            .mount(&server)
            .await;

        let clubs = store(&server)
            .joined_clubs(&ViewerId("s1".into()))
            .await
            .unwrap();
        let names: Vec<_> = clubs.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Chess", "Robotics"]);
        assert_eq!(clubs[0].verification, VerificationState::Pending);
    }

    #[tokio::test]
    async fn test_participated_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/event_participants"))
            .and(query_param("student_id", "eq.s1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "event": {
                    "id": "e1", "name": "Kickoff", "date": "2026-03-01T18:00:00+00:00",
                    "club": { "name": "Chess" }
                } },
                { "event": {
                    "id": "e2", "name": "Finals", "date": "2026-06-01T18:00:00+00:00",
                    "club": { "name": "Chess" }
                } }
            ])))
            .mount(&server)
            .await;

        let events = store(&server)
            .participated_events(&ViewerId("s1".into()))
            .await
            .unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
        assert_eq!(events[0].club_name, "Chess");
    }

    #[tokio::test]
    async fn test_affiliation_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/school"))
            .and(query_param("select", "name,location,image_url"))
            .and(query_param("id", "eq.A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "Alpha University", "location": "Seoul", "image_url": null }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/school"))
            .and(query_param("id", "eq.B"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let store = store(&server);
        let profile = store
            .affiliation_profile(&AffiliationId("A".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.location.as_deref(), Some("Seoul"));
        assert!(profile.image_url.is_none());
        assert!(store
            .affiliation_profile(&AffiliationId("B".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        assert!(matches!(
            RestStore::new(&DataConfig::default()),
            Err(AppError::Config(_))
        ));
    }
}
