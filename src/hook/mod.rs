//! Email-domain validation hook.
//!
//! The identity service calls this before an account is created. The
//! caller proves itself with a shared bearer secret; the hook answers with
//! the affiliation matching the email's domain, or rejects the sign-up.
//!
//! ```text
//! POST /  Authorization: Bearer <secret>
//!         {"record": {"email": "someone@uni.edu"}}
//!
//! 200 {"success": true, "schoolId": "..."}
//! 400 / 401 / 404 / 500 {"error": "..."}
//! ```

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{MatchedPath, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, ErrorKind, Result};
use crate::models::{AffiliationId, HookConfig};
use crate::storage::AffiliationDirectory;
use crate::utils::{constant_time_eq, email_domain_suffix};

/// Shared handler state.
#[derive(Clone)]
pub struct HookState {
    secret: Arc<str>,
    directory: Arc<dyn AffiliationDirectory>,
}

impl HookState {
    pub fn new(secret: impl Into<String>, directory: Arc<dyn AffiliationDirectory>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
            directory,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HookRequest {
    record: HookRecord,
}

#[derive(Debug, Deserialize)]
struct HookRecord {
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HookAccepted {
    success: bool,
    school_id: AffiliationId,
}

/// Error response: `{"error": message}` with a status derived from the
/// error kind.
#[derive(Debug)]
pub struct HookRejection(AppError);

impl From<AppError> for HookRejection {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for HookRejection {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ValidationFailure => StatusCode::BAD_REQUEST,
            ErrorKind::TransportFailure | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "domain lookup failed");
            "Could not verify the email domain.".to_string()
        } else {
            match &self.0 {
                AppError::Unauthorized(m) | AppError::NotFound(m) | AppError::Validation(m) => {
                    m.clone()
                }
                other => other.to_string(),
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the hook router. Every path accepts the POST.
pub fn router(state: HookState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            CONTENT_TYPE,
        ]);

    Router::new()
        .route("/", post(validate_email))
        .route("/{*path}", post(validate_email))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();
                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("hook_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process stops.
pub async fn serve(config: &HookConfig, directory: Arc<dyn AffiliationDirectory>) -> Result<()> {
    let addr = config.socket_addr()?;
    if config.secret.is_empty() {
        tracing::warn!("hook.secret is empty; every request will be rejected");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "hook listening");

    axum::serve(listener, router(HookState::new(config.secret.clone(), directory))).await?;
    Ok(())
}

async fn validate_email(
    State(state): State<HookState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<HookAccepted>, HookRejection> {
    authorize(&state.secret, &headers)?;

    let request: HookRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::validation(format!("Malformed hook payload: {e}")))?;
    let suffix = email_domain_suffix(&request.record.email)
        .ok_or_else(|| AppError::validation("The email address has no domain."))?;

    let found = state
        .directory
        .find_by_email_suffix(&suffix)
        .await
        .map_err(AppError::transport)?;

    match found {
        Some(affiliation) => {
            tracing::info!(%suffix, school_id = %affiliation.id, "email domain accepted");
            Ok(Json(HookAccepted {
                success: true,
                school_id: affiliation.id,
            }))
        }
        None => {
            tracing::info!(%suffix, "email domain rejected");
            Err(AppError::not_found(format!("Your email domain \"{suffix}\" is not supported.")).into())
        }
    }
}

/// Require `Authorization: Bearer <secret>`. An unset secret matches
/// nothing.
fn authorize(secret: &str, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if secret.is_empty() || !constant_time_eq(presented, &format!("Bearer {secret}")) {
        return Err(AppError::unauthorized("Unauthorized: Invalid hook secret"));
    }
    Ok(())
}
