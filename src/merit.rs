//! App-level client for the Merit API.
//!
//! Calls made here authenticate with the app's own credentials (HTTP Basic
//! auth) and cover onboarding: linking an org to the app and resolving its
//! permanent org ID. Org-scoped calls live in [`crate::org`].

use chrono::{Local, NaiveDateTime};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::MeritConfig;
use crate::credential::AppCredentials;
use crate::error::{MeritError, Result};
use crate::org::Org;
use crate::types::{LinkAppRequest, LinkAppResponse, LinkAppUrl, RequestedPermission};

const LINK_STATE_PREFIX: &str = "initiated-from-merit-registration";
const LINK_PERMISSION: &str = "CanManageOrg";

/// Handler for Merit API calls that are not org-authenticated.
///
/// ```no_run
/// # async fn run() -> merit_rs::Result<()> {
/// let merit = merit_rs::Merit::new("app-id", "app-secret", true)?;
/// let link = merit
///     .link_with_merit("/merit/success", "/merit/failure")
///     .await?;
/// println!("send the user to {}", link.url);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Merit {
    credentials: AppCredentials,
    config: MeritConfig,
    base_url: Url,
    http_client: Client,
}

impl Merit {
    /// Create a client for the live (`production = true`) or sandbox API.
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        production: bool,
    ) -> Result<Self> {
        Self::with_config(
            AppCredentials::new(app_id, app_secret),
            MeritConfig::new(production.into()),
        )
    }

    pub fn with_config(credentials: AppCredentials, config: MeritConfig) -> Result<Self> {
        let base_url = parse_base_url(config.base_url())?;

        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            credentials,
            config,
            base_url,
            http_client,
        })
    }

    /// Read credentials and environment from `MERIT_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::with_config(AppCredentials::from_env()?, MeritConfig::from_env()?)
    }

    pub fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }

    pub fn config(&self) -> &MeritConfig {
        &self.config
    }

    /// Base URL all endpoints hang off, e.g. `https://api.merits.com/v2`.
    pub fn domain(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Org-scoped client sharing this app's credentials and connection pool.
    pub fn org(&self, org_id: impl Into<String>) -> Org {
        Org::from_app(self.clone(), org_id)
    }

    /// Start the link-app flow that connects a Merit org to this app.
    ///
    /// `success_url` and `failure_url` are where Merit redirects the user
    /// after they accept or decline. Returns the URL to redirect the user to.
    pub async fn link_with_merit(&self, success_url: &str, failure_url: &str) -> Result<LinkAppUrl> {
        let url = self.endpoint(&["request_linkapp_url"])?;
        let request = LinkAppRequest {
            requested_permissions: vec![RequestedPermission {
                permission_type: LINK_PERMISSION,
            }],
            success_url,
            failure_url,
            state: link_state(Local::now().naive_local()),
        };

        let body = self
            .execute(self.app_request(Method::POST, url.clone()).json(&request))
            .await?;
        let response: LinkAppResponse = decode(&body)?;

        let link = response
            .request_linkapp_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| missing_field(&url, "request_linkapp_url"))?;

        Ok(LinkAppUrl {
            url: link,
            expiration: response.expiration,
        })
    }

    /// Exchange the `org_id_token` handed back by the link-app flow for the
    /// org's permanent ID.
    pub async fn get_org_id_from_token(&self, org_id_token: &str) -> Result<String> {
        let url = self.endpoint(&["org_id"])?;
        let body = self
            .execute(
                self.app_request(Method::GET, url.clone())
                    .query(&[("org_id_token", org_id_token)]),
            )
            .await?;
        required_str(&decode(&body)?, "/orgId", "orgId", &url)
    }

    /// Ask for a fresh org access token. Prefer [`Org::authenticate`], which caches it.
    pub async fn request_org_access_token(&self, org_id: &str) -> Result<String> {
        let url = self.endpoint(&["orgs", org_id, "access"])?;
        let body = self
            .execute(self.app_request(Method::POST, url.clone()))
            .await?;
        required_str(&decode(&body)?, "/orgAccessToken", "orgAccessToken", &url)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http_client
    }

    /// Request authenticated with the app credentials.
    fn app_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .basic_auth(&self.credentials.app_id, Some(&self.credentials.app_secret))
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MeritError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Same as [`endpoint`](Self::endpoint) for a `/`-separated relative path.
    pub(crate) fn endpoint_path(&self, path: &str) -> Result<Url> {
        if path.contains(['?', '#']) {
            return Err(MeritError::InvalidPath(path.to_string()));
        }
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.endpoint(&segments)
    }

    /// Send a request and return the body of a successful response.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<String> {
        let request = request.build()?;
        let method = request.method().clone();
        let url = request.url().clone();

        tracing::info!("calling: {} {}", method, url.path());
        let response = self.http_client.execute(request).await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("({}) {} {}: {}", status.as_u16(), method, url.path(), body);
            return Err(MeritError::Api { status, body });
        }

        Ok(body)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| MeritError::InvalidBaseUrl(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(MeritError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(url)
}

/// `state` value echoed back by Merit at the end of the link-app flow.
fn link_state(now: NaiveDateTime) -> String {
    format!("{}-{}", LINK_STATE_PREFIX, now.format("%d-%m-%Y-%H-%M-%S"))
}

/// Parse a response body; an empty body reads as JSON `null`.
pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let body = if body.trim().is_empty() { "null" } else { body };
    Ok(serde_json::from_str(body)?)
}

pub(crate) fn missing_field(url: &Url, field: &'static str) -> MeritError {
    MeritError::MissingField {
        endpoint: url.path().to_string(),
        field,
    }
}

/// Pull a non-empty string out of a response by JSON pointer.
pub(crate) fn required_str(
    value: &Value,
    pointer: &str,
    field: &'static str,
    url: &Url,
) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| missing_field(url, field))
}
