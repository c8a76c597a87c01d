//! Utility functions and helpers.

pub mod clock;
pub mod http;

use std::sync::LazyLock;

use regex::Regex;

pub use clock::{Clock, FixedClock, SystemClock};

/// Host part of an email address: no whitespace, no '@', and not starting
/// with '.' or '/'.
static EMAIL_HOST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@./][^\s@]*$").ok());

/// Compare two secrets without short-circuiting on the first mismatch.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Domain suffix of an email address, "@" included, lowercased.
///
/// Uses the text after the last '@'. Returns `None` when there is no '@'
/// or the rest is not a plausible host name.
pub fn email_domain_suffix(email: &str) -> Option<String> {
    let host = EMAIL_HOST.as_ref()?;

    let email = email.trim();
    let at = email.rfind('@')?;
    let domain = &email[at + 1..];
    if !host.is_match(domain) {
        return None;
    }
    Some(format!("@{}", domain.to_lowercase()))
}
