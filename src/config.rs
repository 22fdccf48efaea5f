//! Environment selection and client configuration.

use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{MeritError, Result};

const PRODUCTION_URL: &str = "https://api.merits.com/v2";
const SANDBOX_URL: &str = "https://sandbox-api.merits.com/v2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Which Merit deployment API calls go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live data at `api.merits.com`.
    #[default]
    Production,
    /// Testing data at `sandbox-api.merits.com`.
    Sandbox,
}

impl Environment {
    /// Map the `production` flag onto an environment.
    pub fn from_production(production: bool) -> Self {
        if production {
            Self::Production
        } else {
            Self::Sandbox
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Production => PRODUCTION_URL,
            Self::Sandbox => SANDBOX_URL,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl From<bool> for Environment {
    fn from(production: bool) -> Self {
        Self::from_production(production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Sandbox => write!(f, "sandbox"),
        }
    }
}

/// Configuration for [`Merit`](crate::Merit) and [`Org`](crate::Org) clients
#[derive(Debug, Clone)]
pub struct MeritConfig {
    pub environment: Environment,
    /// Overrides the environment's base URL (mock servers, proxies).
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for MeritConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("merit-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl MeritConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Default::default()
        }
    }

    /// Base URL every endpoint path is appended to.
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }

    /// Read `MERIT_PRODUCTION` and `MERIT_API_URL`.
    ///
    /// Unset variables keep their defaults (live environment, no override).
    pub fn from_env() -> Result<Self> {
        let environment = match env::var("MERIT_PRODUCTION") {
            Ok(value) => Environment::from_production(parse_bool(&value).ok_or_else(|| {
                MeritError::Config(format!("MERIT_PRODUCTION must be true or false, got '{value}'"))
            })?),
            Err(_) => Environment::Production,
        };

        Ok(Self {
            environment,
            base_url: env::var("MERIT_API_URL").ok().filter(|s| !s.is_empty()),
            ..Default::default()
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Read a required environment variable.
pub(crate) fn require_env(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| MeritError::Config(format!("{name} is not set")))
}
