//! Club registration.

use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Club, NewClub, VerificationState, Viewer};
use crate::storage::EventStore;

/// Registration form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubInput {
    pub name: String,
    pub description: String,
    pub category: String,

    /// Empty when no logo is given
    #[serde(default)]
    pub logo_url: String,
}

impl ClubInput {
    /// Check every field and report all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let name = self.name.trim().chars().count();
        if name < 2 {
            problems.push("Club name must be at least 2 characters long");
        } else if name > 100 {
            problems.push("Club name is too long");
        }

        let description = self.description.trim().chars().count();
        if description < 10 {
            problems.push("Description must be at least 10 characters long");
        } else if description > 500 {
            problems.push("Description is too long");
        }

        if self.category.trim().is_empty() {
            problems.push("Please select a category");
        }

        let logo = self.logo_url.trim();
        if !logo.is_empty() && Url::parse(logo).is_err() {
            problems.push("Please enter a valid URL");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(problems.join("; ")))
        }
    }
}

/// Register a club led by the viewer.
///
/// The club belongs to the viewer's own affiliation and waits for
/// moderation in the pending state.
pub async fn register_club(
    store: &dyn EventStore,
    viewer: &Viewer,
    input: &ClubInput,
) -> Result<Club> {
    let Viewer::Student { id, affiliation } = viewer else {
        return Err(AppError::forbidden(
            "Only students with a verified school can register clubs.",
        ));
    };
    input.validate()?;

    let logo = input.logo_url.trim();
    let club = NewClub {
        name: input.name.trim().to_string(),
        description: input.description.trim().to_string(),
        category: input.category.trim().to_string(),
        logo_url: (!logo.is_empty()).then(|| logo.to_string()),
        affiliation_id: affiliation.clone(),
        leader_id: id.clone(),
        verification: VerificationState::Pending,
    };

    let stored = store.insert_club(&club).await?;
    log::info!("Registered club '{}' ({}) for {}", stored.name, stored.id, affiliation);
    Ok(stored)
}
