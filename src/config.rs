//! Configuration loading utilities.
//!
//! A TOML file provides the base settings; deployment environments
//! override the connection details and secrets through variables:
//!
//! | Variable                    | Field                  |
//! |-----------------------------|------------------------|
//! | `SUPABASE_URL`              | `data.base_url`        |
//! | `SUPABASE_SERVICE_ROLE_KEY` | `data.api_key`         |
//! | `AUTH_HOOK_SECRET`          | `hook.secret`          |
//! | `EVENTS_PAGE_SIZE`          | `discovery.page_size`  |
//! | `HOOK_BIND`                 | `hook.bind`            |

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;

/// Load configuration from a TOML file.
///
/// Falls back to defaults if loading fails.
pub fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).or_else(|e| {
        log::warn!("Failed to load config from {:?}: {}", path, e);
        log::warn!("Using default configuration.");
        Ok(Config::default())
    })
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Unparsable numbers are ignored with a warning.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("SUPABASE_URL") {
        config.data.base_url = url;
    }
    if let Some(key) = lookup("SUPABASE_SERVICE_ROLE_KEY") {
        config.data.api_key = key;
    }
    if let Some(secret) = lookup("AUTH_HOOK_SECRET") {
        config.hook.secret = secret;
    }
    if let Some(bind) = lookup("HOOK_BIND") {
        config.hook.bind = bind;
    }
    if let Some(size) = lookup("EVENTS_PAGE_SIZE") {
        match size.trim().parse() {
            Ok(n) => config.discovery.page_size = n,
            Err(e) => log::warn!("Ignoring EVENTS_PAGE_SIZE={:?}: {}", size, e),
        }
    }
}

/// Read a process environment variable, treating empty values as unset.
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Load the file, apply the process environment and validate.
pub fn load_all(path: &Path) -> Result<Config> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, env_var);
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration: {e}")))?;
    Ok(config)
}
