//! Viewer identity and role.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Scope;

/// Opaque identity issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(pub String);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a home affiliation (school, institution).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AffiliationId(pub String);

impl fmt::Display for AffiliationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role-bearing claims issued after sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Provider-side user metadata. Only the affiliation matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub school_id: Option<String>,
}

/// The person looking at the event list.
///
/// The role is the variant itself: a viewer is a student exactly when a
/// home affiliation is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
    /// Anonymous visitor, or a signed-in account without an affiliation.
    Guest { id: Option<ViewerId> },

    /// Signed-in account attached to a home affiliation.
    Student {
        id: ViewerId,
        affiliation: AffiliationId,
    },
}

/// Role tag derived from a [`Viewer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Student,
}

impl Viewer {
    /// Anonymous guest with no identity.
    pub fn anonymous() -> Self {
        Viewer::Guest { id: None }
    }

    pub fn student(id: impl Into<String>, affiliation: impl Into<String>) -> Self {
        Viewer::Student {
            id: ViewerId(id.into()),
            affiliation: AffiliationId(affiliation.into()),
        }
    }

    /// Derive the viewer from the identity provider's claims.
    pub fn from_claims(claims: Option<&UserClaims>) -> Self {
        let Some(claims) = claims else {
            return Viewer::anonymous();
        };

        let id = ViewerId(claims.id.clone());
        match claims
            .user_metadata
            .school_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(school) => Viewer::Student {
                id,
                affiliation: AffiliationId(school.to_string()),
            },
            None => Viewer::Guest { id: Some(id) },
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Viewer::Guest { .. } => Role::Guest,
            Viewer::Student { .. } => Role::Student,
        }
    }

    pub fn id(&self) -> Option<&ViewerId> {
        match self {
            Viewer::Guest { id } => id.as_ref(),
            Viewer::Student { id, .. } => Some(id),
        }
    }

    pub fn affiliation(&self) -> Option<&AffiliationId> {
        match self {
            Viewer::Guest { .. } => None,
            Viewer::Student { affiliation, .. } => Some(affiliation),
        }
    }

    /// Scope a fresh filter starts with for this role.
    pub fn default_scope(&self) -> Scope {
        match self {
            Viewer::Guest { .. } => Scope::OutAffiliation,
            Viewer::Student { .. } => Scope::InAffiliation,
        }
    }
}
