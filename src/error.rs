// src/error.rs

//! Unified error handling for the event discovery library.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// No (or an invalid) viewer for an action that requires one
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Action not allowed for the viewer's role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No matching record (e.g. unsupported email domain)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed filter or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Data or identity collaborator unreachable or returned an error envelope
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error re-raised from a shared envelope
    #[error("{}: {}", .0.code, .0.message)]
    Remote(ErrorEnvelope),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    ValidationFailure,
    TransportFailure,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ValidationFailure => "VALIDATION_FAILURE",
            ErrorKind::TransportFailure => "TRANSPORT_FAILURE",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    fn from_code(code: &str) -> Self {
        match code {
            "UNAUTHORIZED" => ErrorKind::Unauthorized,
            "FORBIDDEN" => ErrorKind::Forbidden,
            "NOT_FOUND" => ErrorKind::NotFound,
            "VALIDATION_FAILURE" => ErrorKind::ValidationFailure,
            "INTERNAL" => ErrorKind::Internal,
            _ => ErrorKind::TransportFailure,
        }
    }
}

/// Uniform error shape: a code, a message and optional metadata.
///
/// Cloneable so that a single failed fetch can be handed to every caller
/// waiting on it, and serializable so it can travel to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, rename = "metaData", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code().to_string(),
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(&self.code)
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&AppError> for ErrorEnvelope {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Remote(envelope) => envelope.clone(),
            AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Validation(m)
            | AppError::Transport(m)
            | AppError::Config(m) => ErrorEnvelope::new(err.kind(), m.clone()),
            other => ErrorEnvelope::new(other.kind(), other.to_string()),
        }
    }
}

impl From<ErrorEnvelope> for AppError {
    fn from(envelope: ErrorEnvelope) -> Self {
        AppError::Remote(envelope)
    }
}

impl AppError {
    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl fmt::Display) -> Self {
        Self::Transport(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Validation(_) => ErrorKind::ValidationFailure,
            AppError::Transport(_) | AppError::Http(_) => ErrorKind::TransportFailure,
            AppError::Remote(envelope) => envelope.kind(),
            AppError::Json(_) => ErrorKind::TransportFailure,
            AppError::Io(_) | AppError::Toml(_) | AppError::Url(_) | AppError::Config(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Wrap this error into the uniform envelope shape.
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::from(self)
    }
}
