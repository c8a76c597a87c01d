//! Role-aware visibility rules.

use crate::models::{EventKind, FilterState, Scope, VerificationState, Viewer};
use crate::pipeline::predicate::{Condition, Predicate};

/// Compute which events the viewer may see under the chosen scope.
///
/// Every branch requires a verified owning club. Guests only ever see
/// inter-affiliation events and their scope is ignored.
pub fn resolve_visibility(viewer: &Viewer, filters: &FilterState) -> Predicate {
    let base = Predicate::new().and(Condition::ClubVerification(VerificationState::Verified));

    match viewer {
        Viewer::Guest { .. } => base.and(Condition::KindIs(EventKind::InterAffiliation)),
        Viewer::Student { affiliation, .. } => match filters.scope {
            Scope::InAffiliation => base.and(Condition::ClubAffiliationIs(affiliation.clone())),
            Scope::OutAffiliation => base
                .and(Condition::ClubAffiliationIsNot(affiliation.clone()))
                .and(Condition::KindIs(EventKind::InterAffiliation)),
        },
    }
}
