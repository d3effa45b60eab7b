use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::discovery::FETCH_TIMEOUT;
use crate::error::Error;
use crate::resolve::{
    BoxError, ExchangedTokens, IdentitySync, RowIdResolver, SyncOutcome, TokenExchange,
};
use crate::types::{BaseUser, RowId, SubjectId};

/// Upstream identity API configuration.
///
/// Required fields are constructor parameters — no runtime "missing
/// field" errors. Endpoints default to well-known paths under the
/// authority base and can be overridden individually.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    token_url: Url,
    sync_url: Url,
    resolve_url: Url,
}

fn endpoint(base: &Url, path: &str) -> Url {
    format!("{}/{path}", base.as_str().trim_end_matches('/'))
        .parse()
        .expect("authority base joined with a fixed path is a valid URL")
}

impl UpstreamConfig {
    /// Create a configuration rooted at the authority base URL.
    #[must_use]
    pub fn new(authority_base: &Url) -> Self {
        Self {
            token_url: endpoint(authority_base, "oauth/token"),
            sync_url: endpoint(authority_base, "identity/sync"),
            resolve_url: endpoint(authority_base, "identity/resolve"),
        }
    }

    /// Override the token-exchange endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the identity-sync endpoint.
    #[must_use]
    pub fn with_sync_url(mut self, url: Url) -> Self {
        self.sync_url = url;
        self
    }

    /// Override the row-id resolution endpoint.
    #[must_use]
    pub fn with_resolve_url(mut self, url: Url) -> Self {
        self.resolve_url = url;
        self
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn sync_url(&self) -> &Url {
        &self.sync_url
    }

    #[must_use]
    pub fn resolve_url(&self) -> &Url {
        &self.resolve_url
    }
}

/// Reqwest-backed implementations of the upstream collaborator traits.
///
/// Batteries-included default; consumers with bespoke identity backends
/// implement [`TokenExchange`], [`IdentitySync`], and [`RowIdResolver`]
/// themselves instead.
pub struct UpstreamClient {
    config: UpstreamConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ResolveResponse {
    #[serde(rename = "rowId", default)]
    row_id: Option<RowId>,
}

impl UpstreamClient {
    #[must_use]
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("reqwest client with static configuration"),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Checks HTTP response status; returns the response on success or
    /// the status and body for the caller to wrap.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, String> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(format!("{operation} returned {status}: {body}"))
    }
}

impl TokenExchange for UpstreamClient {
    async fn exchange(&self, subject_id: Option<&SubjectId>) -> Result<ExchangedTokens, BoxError> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .json(&json!({ "subjectId": subject_id }))
            .send()
            .await
            .map_err(Error::Http)?;

        let response = Self::ensure_success(response, "token exchange").await?;
        Ok(response.json::<ExchangedTokens>().await.map_err(Error::Http)?)
    }
}

impl IdentitySync for UpstreamClient {
    async fn sync(&self, user: &BaseUser) -> Result<SyncOutcome, BoxError> {
        let response = self
            .http
            .post(self.config.sync_url.clone())
            .json(user)
            .send()
            .await
            .map_err(Error::Http)?;

        let response = Self::ensure_success(response, "identity sync")
            .await
            .map_err(Error::Sync)?;
        Ok(response.json::<SyncOutcome>().await.map_err(Error::Http)?)
    }
}

impl RowIdResolver for UpstreamClient {
    async fn resolve(
        &self,
        access_token: &str,
        subject_id: &SubjectId,
    ) -> Result<Option<RowId>, BoxError> {
        let response = self
            .http
            .post(self.config.resolve_url.clone())
            .bearer_auth(access_token)
            .json(&json!({ "subjectId": subject_id }))
            .send()
            .await
            .map_err(Error::Http)?;

        let response = Self::ensure_success(response, "row id resolution")
            .await
            .map_err(Error::RowIdResolution)?;
        let resolved = response
            .json::<ResolveResponse>()
            .await
            .map_err(Error::Http)?;
        Ok(resolved.row_id.filter(|r| !r.is_empty()))
    }
}
