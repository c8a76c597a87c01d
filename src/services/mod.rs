//! Service layer around the discovery pipeline.
//!
//! - Identity collaborator (`IdentityProvider`, `SessionHub`, `RestIdentity`)
//! - User-facing notifications (`Notifier`)
//! - Club registration (`register_club`)
//! - Student home feed (`home_feed`)
//! - Student dashboard (`dashboard`)

pub mod clubs;
pub mod dashboard;
pub mod home;
pub mod identity;
pub mod notify;

pub use clubs::{ClubInput, register_club};
pub use dashboard::{Dashboard, dashboard};
pub use home::home_feed;
pub use identity::{IdentityProvider, RestIdentity, SessionHub};
pub use notify::{LogNotifier, Notification, Notifier, RecordingNotifier};
