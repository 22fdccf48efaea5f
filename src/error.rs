//! Error types for Merit API calls.

use reqwest::StatusCode;

/// Errors returned by the Merit clients.
#[derive(thiserror::Error, Debug)]
pub enum MeritError {
    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-200 status.
    #[error("Merit API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    /// The response body was not the JSON we expected.
    #[error("failed to parse Merit response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A 200 response was missing a field the call depends on.
    #[error("response from {endpoint} is missing `{field}`")]
    MissingField {
        endpoint: String,
        field: &'static str,
    },

    #[error("Merit status ({0}) is not valid. Valid statuses are: ({valid})", valid = crate::types::MeritStatus::valid_names().join(", "))]
    InvalidStatus(String),

    #[error("invalid Merit base URL: {0}")]
    InvalidBaseUrl(String),

    /// A raw API path carried a query string or fragment; pass those as `query`.
    #[error("invalid API path `{0}`: query parameters go in `query`, not the path")]
    InvalidPath(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MeritError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }
}

/// Result type used across the crate.
pub type Result<T> = core::result::Result<T, MeritError>;
