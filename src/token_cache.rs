//! Shared cache for org access tokens.
//!
//! Org access tokens are short-lived (an hour). Every clone of an
//! [`Org`](crate::Org) shares one cache through `Arc<RwLock<>>`, so concurrent
//! calls read the token under a read lock and only one of them fetches a
//! replacement when it goes stale.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::credential::OrgAccessToken;
use crate::error::Result;
use crate::merit::Merit;

/// How long an org access token is trusted before it is re-fetched.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(3600);

/// Thread-safe org access token cache.
///
/// # Example
///
/// ```no_run
/// use merit_rs::{Merit, OrgTokenCache};
///
/// #[tokio::main]
/// async fn main() -> merit_rs::Result<()> {
///     let app = Merit::new("app-id", "app-secret", false)?;
///     let cache = OrgTokenCache::default();
///
///     // Fast path: read lock
///     if let Some(token) = cache.get_valid_token().await {
///         println!("cached token: {} chars", token.len());
///     }
///
///     // Slow path: write lock
///     let token = cache.refresh_token(&app, "org-id").await?;
///     println!("fresh token: {} chars", token.len());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct OrgTokenCache {
    inner: Arc<RwLock<Option<OrgAccessToken>>>,
    ttl: Duration,
}

impl OrgTokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached token if it is younger than the TTL.
    pub async fn get_valid_token(&self) -> Option<String> {
        let cache = self.inner.read().await;
        cache
            .as_ref()
            .filter(|t| t.is_fresh(self.ttl))
            .map(|t| t.token.clone())
    }

    /// When the cached token was issued, fresh or not.
    pub async fn issued_at(&self) -> Option<Instant> {
        self.inner.read().await.as_ref().map(|t| t.issued_at)
    }

    /// Fetch a new token unless another task already did while we waited.
    ///
    /// The write lock is held across the fetch, so callers that all observed
    /// a stale token queue up behind a single request.
    pub async fn refresh_token(&self, app: &Merit, org_id: &str) -> Result<String> {
        let mut cache = self.inner.write().await;

        if let Some(ref token) = *cache
            && token.is_fresh(self.ttl)
        {
            tracing::debug!("org access token already refreshed by another task");
            return Ok(token.token.clone());
        }

        tracing::debug!(org_id, "refreshing org access token");
        let token = app.request_org_access_token(org_id).await?;
        *cache = Some(OrgAccessToken::new(token.clone()));
        Ok(token)
    }

    /// Fetch and store a new token regardless of the cached one.
    pub async fn force_refresh(&self, app: &Merit, org_id: &str) -> Result<String> {
        let mut cache = self.inner.write().await;
        tracing::debug!(org_id, "fetching org access token");
        let token = app.request_org_access_token(org_id).await?;
        *cache = Some(OrgAccessToken::new(token.clone()));
        Ok(token)
    }

    /// Drop the cached token, e.g. after the API rejected it with 401.
    pub async fn invalidate(&self) {
        let mut cache = self.inner.write().await;
        tracing::debug!("invalidating org access token");
        *cache = None;
    }

    /// Drop the cached token only if it is still `rejected`.
    ///
    /// A task whose request failed with an old token must not wipe the
    /// replacement another task already fetched.
    pub async fn invalidate_if(&self, rejected: &str) {
        let mut cache = self.inner.write().await;
        if cache.as_ref().is_some_and(|t| t.token == rejected) {
            tracing::debug!("invalidating rejected org access token");
            *cache = None;
        }
    }
}

impl Default for OrgTokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_TIMEOUT)
    }
}
