// src/models/mod.rs

//! Domain models for the event discovery library.
//!
//! This module contains all data structures used throughout the library,
//! organized by their primary purpose.

mod config;
mod event;
mod filter;
mod viewer;

// Re-export all public types
pub use config::{Config, DataConfig, DiscoveryConfig, HookConfig};
pub use event::{
    Affiliation, AffiliationProfile, Club, ClubBrief, Event, EventKind, EventListing, Membership,
    NewClub, ParticipatedEvent, Participation, TrackingMark, VerificationState,
};
pub use filter::{FilterState, Page, Scope, TimeWindow};
pub use viewer::{AffiliationId, Role, UserClaims, UserMetadata, Viewer, ViewerId};
