// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::DataConfig;

/// Create a configured asynchronous HTTP client for the data service.
///
/// The API key is attached as both `apikey` and bearer token on every
/// request, which is what the hosted REST gateway expects.
pub fn create_async_client(config: &DataConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if !config.api_key.is_empty() {
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| AppError::config(format!("data.api_key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| AppError::config(format!("data.api_key: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
    }

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}
