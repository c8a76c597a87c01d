//! Application configuration structures.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Hosted data service connection settings
    #[serde(default)]
    pub data: DataConfig,

    /// Discovery list behavior
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Domain-validation hook server
    #[serde(default)]
    pub hook: HookConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.data.user_agent.trim().is_empty() {
            return Err(AppError::validation("data.user_agent is empty"));
        }
        if self.data.timeout_secs == 0 {
            return Err(AppError::validation("data.timeout_secs must be > 0"));
        }
        if !self.data.base_url.is_empty() {
            url::Url::parse(&self.data.base_url)?;
        }
        if self.discovery.page_size == 0 {
            return Err(AppError::validation("discovery.page_size must be > 0"));
        }
        if self.discovery.home_feed_limit == 0 {
            return Err(AppError::validation(
                "discovery.home_feed_limit must be > 0",
            ));
        }
        if self.discovery.max_search_length == 0 {
            return Err(AppError::validation(
                "discovery.max_search_length must be > 0",
            ));
        }
        self.hook.socket_addr()?;
        Ok(())
    }
}

/// Hosted data service (REST) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Project base URL (e.g. "https://abc.supabase.co")
    #[serde(default)]
    pub base_url: String,

    /// API key sent as `apikey` and bearer token
    #[serde(default)]
    pub api_key: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Discovery list settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Rows per page
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    /// Rows on the student home feed
    #[serde(default = "defaults::home_feed_limit")]
    pub home_feed_limit: u32,

    /// Longest accepted search text, in characters
    #[serde(default = "defaults::max_search_length")]
    pub max_search_length: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: defaults::page_size(),
            home_feed_limit: defaults::home_feed_limit(),
            max_search_length: defaults::max_search_length(),
        }
    }
}

/// Domain-validation hook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Listen address
    #[serde(default = "defaults::bind")]
    pub bind: String,

    /// Shared bearer secret expected from the identity provider
    #[serde(default)]
    pub secret: String,
}

impl HookConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| AppError::config(format!("hook.bind '{}': {}", self.bind, e)))
    }
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            bind: defaults::bind(),
            secret: String::new(),
        }
    }
}

mod defaults {
    // Data service defaults
    pub fn user_agent() -> String {
        "campus-events/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Discovery defaults
    pub fn page_size() -> u32 {
        9
    }
    pub fn home_feed_limit() -> u32 {
        10
    }
    pub fn max_search_length() -> usize {
        100
    }

    // Hook defaults
    pub fn bind() -> String {
        "0.0.0.0:54321".into()
    }
}
