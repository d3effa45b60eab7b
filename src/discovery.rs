use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::clock::Clock;
use crate::error::Error;

/// Timeout applied to every outbound authority fetch.
pub(crate) const FETCH_TIMEOUT: StdDuration = StdDuration::from_secs(15);

const DISCOVERY_TTL: Duration = Duration::hours(24);
const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Identity authority metadata: where the issuer identity and signing
/// keys live.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
}

type Entry = (DiscoveryDocument, OffsetDateTime);

/// Process-wide cache of the authority's discovery document.
///
/// Lazily created, refreshed on expiry (24 h TTL), never torn down. The
/// slot is read and swapped under a short-lived lock; the fetch itself
/// happens outside it, so concurrent refreshes are possible and last
/// write wins — benign, since the document is idempotent.
pub struct DiscoveryCache {
    http: reqwest::Client,
    endpoint: Url,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<Entry>>,
}

impl DiscoveryCache {
    /// Create a cache for the authority rooted at `authority_base`.
    #[must_use]
    pub fn new(authority_base: &Url, clock: Arc<dyn Clock>) -> Self {
        let endpoint = format!(
            "{}/{DISCOVERY_PATH}",
            authority_base.as_str().trim_end_matches('/')
        )
        .parse()
        .expect("authority base joined with a fixed path is a valid URL");

        Self {
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("reqwest client with static configuration"),
            endpoint,
            clock,
            slot: Mutex::new(None),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Return the discovery document, fetching it if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryUnavailable`] if the endpoint is
    /// unreachable, responds with a non-success status, or the document
    /// lacks a non-empty `issuer` or `jwks_uri`.
    pub async fn get(&self) -> Result<DiscoveryDocument, Error> {
        let now = self.clock.now();
        {
            let slot = self.slot.lock().expect("discovery cache lock");
            if let Some((document, expires_at)) = slot.as_ref()
                && now < *expires_at
            {
                return Ok(document.clone());
            }
        }

        let document = self.fetch().await?;

        let mut slot = self.slot.lock().expect("discovery cache lock");
        *slot = Some((document.clone(), now + DISCOVERY_TTL));
        Ok(document)
    }

    async fn fetch(&self) -> Result<DiscoveryDocument, Error> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| Error::DiscoveryUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::DiscoveryUnavailable(format!(
                "discovery endpoint returned status {}",
                response.status().as_u16()
            )));
        }

        let document: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| Error::DiscoveryUnavailable(e.to_string()))?;

        if document.issuer.is_empty() || document.jwks_uri.is_empty() {
            return Err(Error::DiscoveryUnavailable(
                "document is missing issuer or jwks_uri".into(),
            ));
        }

        tracing::debug!(issuer = %document.issuer, "discovery document refreshed");
        Ok(document)
    }
}
