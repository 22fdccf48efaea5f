//! Credential types.
//!
//! App credentials authenticate app-level calls with HTTP Basic auth. They are
//! exchanged for an org access token, which is sent as a Bearer token on
//! org-scoped calls.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::require_env;
use crate::error::Result;

/// App ID and secret issued by the Merit developer portal.
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_secret: String,
}

impl AppCredentials {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }

    /// Read `MERIT_APP_ID` and `MERIT_APP_SECRET`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            require_env("MERIT_APP_ID")?,
            require_env("MERIT_APP_SECRET")?,
        ))
    }
}

// Keep the secret out of logs.
impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

/// Org access token plus the instant it was issued.
#[derive(Clone)]
pub struct OrgAccessToken {
    pub token: String,
    pub issued_at: Instant,
}

impl OrgAccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            issued_at: Instant::now(),
        }
    }

    /// Whether the token is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() < ttl
    }
}

impl fmt::Debug for OrgAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgAccessToken")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}
