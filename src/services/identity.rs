//! Identity collaborator: current user, sign-out and change notifications.
//!
//! Two providers:
//! - `SessionHub`: in-process claims holder, the source of change events
//! - `RestIdentity`: the hosted auth endpoints (`/auth/v1/user`,
//!   `/auth/v1/logout`) with a session access token, publishing through
//!   its own hub

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::watch;
use url::Url;

use crate::error::{AppError, ErrorKind, Result};
use crate::models::{DataConfig, UserClaims};
use crate::storage::rest::error_from_response;
use crate::utils::http::create_async_client;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Claims of the signed-in user, `None` when nobody is signed in.
    async fn current_user(&self) -> Result<Option<UserClaims>>;

    async fn sign_out(&self) -> Result<()>;

    /// Stream of identity changes. The receiver starts at the current value.
    fn subscribe(&self) -> watch::Receiver<Option<UserClaims>>;
}

/// In-process identity state.
#[derive(Debug)]
pub struct SessionHub {
    claims: watch::Sender<Option<UserClaims>>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionHub {
    pub fn new(initial: Option<UserClaims>) -> Self {
        let (claims, _) = watch::channel(initial);
        Self { claims }
    }

    pub fn sign_in(&self, claims: UserClaims) {
        self.publish(Some(claims));
    }

    /// Replace the current claims. Subscribers are only woken on change.
    pub fn publish(&self, claims: Option<UserClaims>) {
        self.claims.send_if_modified(|current| {
            if *current == claims {
                false
            } else {
                *current = claims;
                true
            }
        });
    }

    pub fn current(&self) -> Option<UserClaims> {
        self.claims.borrow().clone()
    }
}

#[async_trait]
impl IdentityProvider for SessionHub {
    async fn current_user(&self) -> Result<Option<UserClaims>> {
        Ok(self.current())
    }

    async fn sign_out(&self) -> Result<()> {
        self.publish(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserClaims>> {
        self.claims.subscribe()
    }
}

/// Hosted auth endpoints, authenticated with the session's access token.
pub struct RestIdentity {
    client: Client,
    base: Url,
    token: Mutex<Option<String>>,
    hub: SessionHub,
}

impl RestIdentity {
    pub fn new(config: &DataConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(AppError::config("data.base_url is not set"));
        }
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            client: create_async_client(config)?,
            base: Url::parse(&base)?,
            token: Mutex::new(None),
            hub: SessionHub::default(),
        })
    }

    /// Attach the access token issued at sign-in.
    pub fn with_session(self, access_token: impl Into<String>) -> Self {
        *self.token() = Some(access_token.into());
        self
    }

    fn token(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(&format!("auth/v1/{path}"))?)
    }

    fn end_session(&self) {
        self.token().take();
        self.hub.publish(None);
    }
}

#[async_trait]
impl IdentityProvider for RestIdentity {
    async fn current_user(&self) -> Result<Option<UserClaims>> {
        let Some(token) = self.token().clone() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.endpoint("user")?)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AppError::transport(format!("identity service unreachable: {e}")))?;

        if !response.status().is_success() {
            let err = error_from_response(response).await;
            if err.kind() == ErrorKind::Unauthorized {
                log::info!("Session token rejected, signing out locally");
                self.end_session();
                return Err(AppError::unauthorized("Your session has expired."));
            }
            return Err(err);
        }

        let claims: UserClaims = response.json().await?;
        self.hub.publish(Some(claims.clone()));
        Ok(Some(claims))
    }

    async fn sign_out(&self) -> Result<()> {
        let token = self.token().clone();
        if let Some(token) = token {
            let result = self
                .client
                .post(self.endpoint("logout")?)
                .bearer_auth(&token)
                .send()
                .await;
            match result {
                Ok(response) if !response.status().is_success() => {
                    log::warn!("Sign-out returned {}", response.status());
                }
                Err(e) => log::warn!("Sign-out request failed: {}", e),
                Ok(_) => {}
            }
        }
        self.end_session();
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserClaims>> {
        self.hub.subscribe()
    }
}
