use std::sync::{Arc, Mutex};

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use time::{Duration, OffsetDateTime};

use crate::clock::Clock;
use crate::discovery::{DiscoveryCache, FETCH_TIMEOUT};
use crate::error::Error;

const KEY_SET_TTL: Duration = Duration::hours(1);
const FAILURE_COOLDOWN: Duration = Duration::seconds(30);

#[derive(Default)]
struct CacheState {
    keys: Option<(JwkSet, OffsetDateTime)>,
    cooldown_until: Option<OffsetDateTime>,
}

/// Process-wide cache of the authority's signing key set.
///
/// Refreshed on expiry (1 h TTL). A fetch or verification failure arms a
/// 30 s cooldown during which no refetch is attempted, preventing refetch
/// storms while the authority rotates keys or is unhealthy. While cooling
/// down, a stale cached set is still served if one exists.
pub struct KeySetCache {
    http: reqwest::Client,
    discovery: Arc<DiscoveryCache>,
    clock: Arc<dyn Clock>,
    slot: Mutex<CacheState>,
}

impl KeySetCache {
    #[must_use]
    pub fn new(discovery: Arc<DiscoveryCache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("reqwest client with static configuration"),
            discovery,
            clock,
            slot: Mutex::new(CacheState::default()),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Return the key set, fetching it if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DiscoveryUnavailable`] if the key-set location
    /// cannot be discovered, or [`Error::KeySetUnavailable`] if the fetch
    /// fails or a cooldown is armed with no cached set to fall back on.
    pub async fn get(&self) -> Result<JwkSet, Error> {
        let now = self.clock.now();
        {
            let slot = self.slot.lock().expect("key set cache lock");
            if let Some((keys, expires_at)) = slot.keys.as_ref()
                && now < *expires_at
            {
                return Ok(keys.clone());
            }
            if let Some(cooldown_until) = slot.cooldown_until
                && now < cooldown_until
            {
                // Stale keys beat no keys while the authority recovers.
                if let Some((keys, _)) = slot.keys.as_ref() {
                    return Ok(keys.clone());
                }
                return Err(Error::KeySetUnavailable(
                    "key set fetch is cooling down after a failure".into(),
                ));
            }
        }

        let jwks_uri = self.discovery.get().await?.jwks_uri;
        match self.fetch(&jwks_uri).await {
            Ok(keys) => {
                let mut slot = self.slot.lock().expect("key set cache lock");
                slot.keys = Some((keys.clone(), now + KEY_SET_TTL));
                slot.cooldown_until = None;
                Ok(keys)
            }
            Err(e) => {
                self.arm_cooldown(now);
                Err(e)
            }
        }
    }

    /// Arm the refetch cooldown after a verification failure.
    ///
    /// Called by the verifier when a key lookup against a freshly served
    /// set fails, so the next requests within the cooldown window do not
    /// hammer the authority.
    pub fn report_failure(&self) {
        let now = self.clock.now();
        tracing::warn!("key set verification failure reported, arming cooldown");
        let mut slot = self.slot.lock().expect("key set cache lock");
        // Expire the cached set so the next get() past the cooldown refetches.
        if let Some((_, expires_at)) = slot.keys.as_mut() {
            *expires_at = now;
        }
        slot.cooldown_until = Some(now + FAILURE_COOLDOWN);
    }

    async fn fetch(&self, jwks_uri: &str) -> Result<JwkSet, Error> {
        let response = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| Error::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::KeySetUnavailable(format!(
                "key set endpoint returned status {}",
                response.status().as_u16()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| Error::KeySetUnavailable(e.to_string()))?;

        tracing::debug!(keys = keys.keys.len(), "key set refreshed");
        Ok(keys)
    }

    fn arm_cooldown(&self, now: OffsetDateTime) {
        let mut slot = self.slot.lock().expect("key set cache lock");
        slot.cooldown_until = Some(now + FAILURE_COOLDOWN);
    }
}

/// Resolve the decoding key for `kid` from a cached key set.
///
/// # Errors
///
/// Returns [`Error::TokenVerification`] if the key id is not present in
/// the set or the key material cannot be used.
pub fn decoding_key(keys: &JwkSet, kid: &str) -> Result<DecodingKey, Error> {
    let jwk = keys
        .find(kid)
        .ok_or_else(|| Error::TokenVerification(format!("unknown key id: {kid}")))?;
    DecodingKey::from_jwk(jwk).map_err(|e| Error::TokenVerification(e.to_string()))
}
