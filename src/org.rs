//! Org-scoped client for the Merit API.
//!
//! An [`Org`] is obtained once an org has been linked to the app (see
//! [`Merit::link_with_merit`] and [`Merit::get_org_id_from_token`]). Its calls
//! carry a Bearer org access token that is fetched with the app credentials
//! and cached for [`DEFAULT_AUTH_TIMEOUT`](crate::DEFAULT_AUTH_TIMEOUT).

use std::time::{Duration, Instant};

use futures::future::try_join_all;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::MeritConfig;
use crate::credential::AppCredentials;
use crate::error::Result;
use crate::merit::{Merit, decode, missing_field, required_str};
use crate::token_cache::OrgTokenCache;
use crate::types::{
    Field, IssuedMerit, MeritPage, MeritQuery, MeritStatus, MeritTemplate, MeritTemplateList,
    OrgInfo,
};

/// Label of the empty entry in template choices.
pub const NO_TEMPLATE_LABEL: &str = "-----";

const CURSOR_PARAM: &str = "starting_after";
const NO_QUERY: &[(&str, &str)] = &[];

/// Client for one Merit organization.
///
/// Clones share the connection pool and the access token.
#[derive(Debug, Clone)]
pub struct Org {
    app: Merit,
    org_id: String,
    tokens: OrgTokenCache,
}

impl Org {
    /// Create an org client for the live (`production = true`) or sandbox API.
    ///
    /// No request is made here; the access token is fetched on first use.
    /// Use [`Org::connect`] to authenticate up front.
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        org_id: impl Into<String>,
        production: bool,
    ) -> Result<Self> {
        Ok(Merit::new(app_id, app_secret, production)?.org(org_id))
    }

    /// Like [`Org::new`], then fetch the access token before returning.
    pub async fn connect(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        org_id: impl Into<String>,
        production: bool,
    ) -> Result<Self> {
        let org = Self::new(app_id, app_secret, org_id, production)?;
        org.get_org_access_token().await?;
        Ok(org)
    }

    pub fn with_config(
        credentials: AppCredentials,
        org_id: impl Into<String>,
        config: MeritConfig,
    ) -> Result<Self> {
        Ok(Merit::with_config(credentials, config)?.org(org_id))
    }

    pub(crate) fn from_app(app: Merit, org_id: impl Into<String>) -> Self {
        Self {
            app,
            org_id: org_id.into(),
            tokens: OrgTokenCache::default(),
        }
    }

    /// Replace the token lifetime (default one hour). Starts a fresh cache.
    pub fn with_auth_timeout(mut self, auth_timeout: Duration) -> Self {
        self.tokens = OrgTokenCache::new(auth_timeout);
        self
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// The app-level client this org authenticates through.
    pub fn app(&self) -> &Merit {
        &self.app
    }

    pub fn auth_timeout(&self) -> Duration {
        self.tokens.ttl()
    }

    /// When the current access token was obtained, if any.
    pub async fn authenticated_at(&self) -> Option<Instant> {
        self.tokens.issued_at().await
    }

    /// Fetch a new org access token and cache it.
    pub async fn get_org_access_token(&self) -> Result<String> {
        self.tokens.force_refresh(&self.app, &self.org_id).await
    }

    /// Return a valid access token, fetching one if missing or older than the auth timeout.
    pub async fn authenticate(&self) -> Result<String> {
        if let Some(token) = self.tokens.get_valid_token().await {
            return Ok(token);
        }
        self.tokens.refresh_token(&self.app, &self.org_id).await
    }

    /// GET `path` (relative to the API base, e.g. `/orgs/{id}`) with `query` params.
    ///
    /// `path` holds path segments only; a `?` or `#` in it is
    /// [`MeritError::InvalidPath`](crate::MeritError::InvalidPath).
    pub async fn get_api<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.get_url(self.app.endpoint_path(path)?, query).await
    }

    /// POST `path` (relative to the API base) with an optional JSON body.
    pub async fn post_api<T, B>(&self, path: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_url(self.app.endpoint_path(path)?, body).await
    }

    /// Merit's public profile of this org.
    pub async fn get_org_info(&self) -> Result<OrgInfo> {
        let url = self.app.endpoint(&["orgs", &self.org_id])?;
        let info: OrgInfo = self.get_url(url.clone(), NO_QUERY).await?;
        if info.id.is_none() {
            return Err(missing_field(&url, "id"));
        }
        Ok(info)
    }

    pub async fn get_field(&self, field_id: &str) -> Result<Field> {
        let url = self.app.endpoint(&["fields", field_id])?;
        self.get_url(url, NO_QUERY).await
    }

    /// Merit templates owned by the org.
    pub async fn get_all_org_merit_templates(&self, limit: usize) -> Result<Vec<MeritTemplate>> {
        let url = self.app.endpoint(&["orgs", &self.org_id, "merittemplates"])?;
        let list: Option<MeritTemplateList> = self.get_url(url, &[("limit", limit)]).await?;
        Ok(list.map(|l| l.merittemplates).unwrap_or_default())
    }

    /// `(id, title)` pairs for a template picker, led by an empty choice when
    /// `include_none` is set.
    pub async fn get_org_merit_template_choices(
        &self,
        include_none: bool,
    ) -> Result<Vec<(Option<String>, String)>> {
        let templates = self.get_all_org_merit_templates(100).await?;

        let mut choices = Vec::with_capacity(templates.len() + 1);
        if include_none {
            choices.push((None, NO_TEMPLATE_LABEL.to_string()));
        }
        choices.extend(
            templates
                .into_iter()
                .map(|t| (Some(t.id), t.title.unwrap_or_default())),
        );
        Ok(choices)
    }

    pub async fn get_merit_template(&self, template_id: &str) -> Result<MeritTemplate> {
        let url = self.app.endpoint(&["merittemplates", template_id])?;
        self.get_url(url, NO_QUERY).await
    }

    /// Every field enabled on a template, in template order.
    pub async fn get_template_field_choices(&self, template_id: &str) -> Result<Vec<Field>> {
        let template = self.get_merit_template(template_id).await?;
        try_join_all(
            template
                .enabled_field_settings
                .iter()
                .map(|setting| self.get_field(&setting.field_id)),
        )
        .await
    }

    /// Merits issued by the org matching `query`, following pagination until
    /// `query.limit` merits are collected or the last page is reached.
    pub async fn get_all_merits(&self, query: &MeritQuery) -> Result<Vec<IssuedMerit>> {
        let url = self.app.endpoint(&["orgs", &self.org_id, "merits"])?;
        let mut params = query.to_params();
        let mut merits = Vec::new();

        loop {
            let page: MeritPage = self
                .get_url::<Option<MeritPage>, _>(url.clone(), &params)
                .await?
                .unwrap_or_default();

            let cursor = page.next_cursor().map(str::to_owned);
            let fetched = page.merits.len();
            merits.extend(page.merits);

            if merits.len() >= query.limit {
                merits.truncate(query.limit);
                break;
            }

            match cursor {
                Some(cursor) if fetched > 0 => {
                    tracing::debug!(collected = merits.len(), "fetching next page of merits");
                    params.retain(|(key, _)| *key != CURSOR_PARAM);
                    params.push((CURSOR_PARAM, cursor));
                }
                _ => break,
            }
        }

        Ok(merits)
    }

    /// Merits proposed from a template and still awaiting approval.
    pub async fn get_template_pending_merits(&self, template_id: &str) -> Result<Vec<IssuedMerit>> {
        self.get_all_merits(
            &MeritQuery::default()
                .template(template_id)
                .status(MeritStatus::Unapproved),
        )
        .await
    }

    /// Propose a merit for approval. Returns the new merit's ID.
    pub async fn propose_merit<B: Serialize + ?Sized>(&self, merit: &B) -> Result<String> {
        let url = self.app.endpoint(&["merits", "propose"])?;
        let response: Value = self.post_url(url.clone(), Some(merit)).await?;
        required_str(&response, "/id", "id", &url)
    }

    /// Send a merit to its recipient. Returns the new merit's ID.
    pub async fn send_merit<B: Serialize + ?Sized>(&self, merit: &B) -> Result<String> {
        let url = self.app.endpoint(&["merits", "send"])?;
        let response: Value = self.post_url(url.clone(), Some(merit)).await?;
        required_str(&response, "/id", "id", &url)
    }

    pub async fn edit_merit<B: Serialize + ?Sized>(&self, merit_id: &str, edits: &B) -> Result<()> {
        let url = self.app.endpoint(&["merits", merit_id])?;
        let _: Value = self.post_url(url, Some(edits)).await?;
        Ok(())
    }

    pub async fn revoke_merit(&self, merit_id: &str, reason: &str) -> Result<()> {
        let url = self.app.endpoint(&["merits", merit_id, "revoke"])?;
        let _: Value = self
            .post_url(url, Some(&json!({ "revocationReason": reason })))
            .await?;
        Ok(())
    }

    /// Static QR lookup URL for a member's merit.
    pub async fn uuid_translation(&self, merit_id: &str, email: &str) -> Result<String> {
        let url = self
            .app
            .endpoint(&["uuidTranslation", "merit", merit_id, "email", email])?;
        let response: Value = self.post_url(url.clone(), None::<&Value>).await?;
        required_str(&response, "/translationUrl", "translationUrl", &url)
    }

    /// Transfer a merit to a new email address. Returns the ID of the new merit.
    pub async fn update_email(&self, merit_id: &str, email: &str) -> Result<String> {
        let url = self.app.endpoint(&["merits", merit_id, "transfer"])?;
        let response: Value = self
            .post_url(url.clone(), Some(&json!({ "newRecipientEmail": email })))
            .await?;
        required_str(&response, "/newMerit/id", "newMerit.id", &url)
    }

    async fn get_url<T, Q>(&self, url: Url, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let body = self
            .send_authorized(|token| self.app.http().get(url.clone()).query(query).bearer_auth(token))
            .await?;
        decode(&body)
    }

    async fn post_url<T, B>(&self, url: Url, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = self
            .send_authorized(|token| {
                let request = self.app.http().post(url.clone()).bearer_auth(token);
                match body {
                    Some(body) => request.json(body),
                    None => request,
                }
            })
            .await?;
        decode(&body)
    }

    /// Send with the org token. A 401 drops that token, unless another call
    /// already replaced it, and retries once with a valid one.
    async fn send_authorized<F>(&self, build: F) -> Result<String>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.authenticate().await?;

        match self.app.execute(build(&token)).await {
            Err(e) if e.status() == Some(StatusCode::UNAUTHORIZED) => {
                tracing::warn!(org_id = %self.org_id, "org access token rejected, re-authenticating");
                self.tokens.invalidate_if(&token).await;
                let token = self.authenticate().await?;
                self.app.execute(build(&token)).await
            }
            result => result,
        }
    }
}
