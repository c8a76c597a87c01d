//! Campus events library
//!
//! Role-aware event discovery over a hosted relational store: visibility
//! rules, filter compilation, cursor paging with a shared page cache,
//! tracking marks, plus the email-domain validation hook.

pub mod config;
pub mod error;
#[cfg(feature = "hook")]
pub mod hook;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
