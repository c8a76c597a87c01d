//! Filter state chosen by the viewer, and the pages it produces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::EventListing;

/// Which side of "now" to list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    Upcoming,
    Past,
}

/// Own-affiliation vs. other-affiliation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "in-college")]
    InAffiliation,
    #[serde(rename = "out-college")]
    OutAffiliation,
}

impl FromStr for TimeWindow {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "upcoming" => Ok(TimeWindow::Upcoming),
            "past" => Ok(TimeWindow::Past),
            other => Err(AppError::validation(format!(
                "unknown time window '{other}' (expected upcoming or past)"
            ))),
        }
    }
}

impl FromStr for Scope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in-college" | "in-affiliation" | "in" => Ok(Scope::InAffiliation),
            "out-college" | "out-affiliation" | "out" => Ok(Scope::OutAffiliation),
            other => Err(AppError::validation(format!(
                "unknown scope '{other}' (expected in-college or out-college)"
            ))),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::Upcoming => f.write_str("upcoming"),
            TimeWindow::Past => f.write_str("past"),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::InAffiliation => f.write_str("in-college"),
            Scope::OutAffiliation => f.write_str("out-college"),
        }
    }
}

/// Filters currently applied to the discovery list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterState {
    /// Free-text search on event name (empty = no constraint)
    #[serde(default)]
    pub search: String,

    #[serde(default, rename = "date")]
    pub window: TimeWindow,

    pub scope: Scope,
}

impl FilterState {
    /// Fresh filters with the given scope.
    pub fn with_scope(scope: Scope) -> Self {
        Self {
            search: String::new(),
            window: TimeWindow::Upcoming,
            scope,
        }
    }
}

/// One fixed-size slice of a query's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page index
    pub index: u32,

    pub events: Vec<EventListing>,

    /// Total rows matching the predicate
    pub total: u64,

    /// Index of the following page, absent when exhausted
    pub next_cursor: Option<u32>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}
