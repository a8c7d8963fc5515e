//! Identity/authentication is out of scope for the core (spec §1); this module
//! specifies only the interface the gateway needs against it, plus an HTTP-backed
//! implementation and a cache, mirroring how the teacher layers `moka` over a
//! network-backed lookup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use thiserror::Error;

use crate::models::UserId;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid token")]
    InvalidToken,
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub user_id: UserId,
    pub display_name: String,
    pub rating: f64,
    pub banned: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves an auth token to a verified identity and current rating. An
    /// `InvalidToken` error is the only expected failure on the gateway's hot path;
    /// anything else is a Resource/Transport-level failure upstream.
    async fn resolve_token(&self, token: &str) -> Result<ResolvedIdentity, IdentityError>;

    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedIdentity, IdentityError>;
}

/// HTTP-backed identity provider, calling out to the profile service this core treats
/// as an external collaborator.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve_token(&self, token: &str) -> Result<ResolvedIdentity, IdentityError> {
        #[derive(serde::Deserialize)]
        struct Resp {
            user_id: UserId,
            display_name: String,
            rating: f64,
            banned: bool,
        }

        let resp = self
            .client
            .get(format!("{}/internal/resolve-token", self.base_url))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(IdentityError::InvalidToken);
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Ok(ResolvedIdentity {
            user_id: body.user_id,
            display_name: body.display_name,
            rating: body.rating,
            banned: body.banned,
        })
    }

    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedIdentity, IdentityError> {
        #[derive(serde::Deserialize)]
        struct Resp {
            display_name: String,
            rating: f64,
            banned: bool,
        }

        let resp = self
            .client
            .get(format!("{}/internal/users/{}", self.base_url, user_id))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Ok(ResolvedIdentity {
            user_id,
            display_name: body.display_name,
            rating: body.rating,
            banned: body.banned,
        })
    }
}

/// Caches token resolutions briefly so a reconnect storm doesn't hammer the identity
/// service; ratings go stale for at most the TTL, which only affects matchmaking
/// freshness, not correctness of the settlement (settlement re-reads via persistence).
pub struct CachedIdentityProvider<P: IdentityProvider> {
    inner: Arc<P>,
    token_cache: Cache<String, ResolvedIdentity>,
}

impl<P: IdentityProvider> CachedIdentityProvider<P> {
    pub fn new(inner: Arc<P>, ttl: Duration) -> Self {
        Self {
            inner,
            token_cache: Cache::builder().time_to_live(ttl).build(),
        }
    }
}

#[async_trait]
impl<P: IdentityProvider> IdentityProvider for CachedIdentityProvider<P> {
    async fn resolve_token(&self, token: &str) -> Result<ResolvedIdentity, IdentityError> {
        if let Some(cached) = self.token_cache.get(token).await {
            return Ok(cached);
        }
        let resolved = self.inner.resolve_token(token).await?;
        self.token_cache
            .insert(token.to_string(), resolved.clone())
            .await;
        Ok(resolved)
    }

    async fn resolve_user(&self, user_id: UserId) -> Result<ResolvedIdentity, IdentityError> {
        self.inner.resolve_user(user_id).await
    }
}
