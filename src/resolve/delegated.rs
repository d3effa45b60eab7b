use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation};
use serde_json::Value as JsonValue;

use super::traits::{IdentityStrategy, RowIdResolver, TokenExchange};
use super::types::{DegradeReason, StrategyOutcome};
use crate::claims::extract_organizations;
use crate::clock::Clock;
use crate::discovery::DiscoveryCache;
use crate::error::Error;
use crate::keys::{KeySetCache, decoding_key};
use crate::types::{BaseUser, CachedIdentity, PersistedIdentityRecord, SubjectId};

/// Token acquisition via a delegated third-party identity provider.
///
/// Exchanges the base session for an access token and ID token, verifies
/// the ID token against the authority's published key set, and resolves
/// the canonical row id when it is not already known. Verification
/// failures degrade the result instead of failing it.
pub struct DelegatedStrategy<X, R> {
    exchange: X,
    rows: R,
    discovery: Arc<DiscoveryCache>,
    keys: Arc<KeySetCache>,
    clock: Arc<dyn Clock>,

    /// When provided, this is used instead of the key set. Should only be
    /// used in tests.
    pub(crate) decoding_key: Option<DecodingKey>,
}

impl<X: TokenExchange, R: RowIdResolver> DelegatedStrategy<X, R> {
    #[must_use]
    pub fn new(
        exchange: X,
        rows: R,
        discovery: Arc<DiscoveryCache>,
        keys: Arc<KeySetCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            exchange,
            rows,
            discovery,
            keys,
            clock,
            decoding_key: None,
        }
    }

    /// Verify an ID token's signature and issuer, returning its payload.
    ///
    /// The discovery document and key set are fetched concurrently; both
    /// are cached, so the common case touches no network at all.
    async fn verify_id_token(&self, id_token: &str) -> Result<JsonValue, Error> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| Error::TokenVerification(e.to_string()))?;

        let (discovery, keys) = tokio::join!(self.discovery.get(), self.keys.get());
        let discovery = discovery?;

        let key = match &self.decoding_key {
            Some(key) => key.clone(),
            None => {
                let keys = keys?;
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| Error::TokenVerification("token header has no kid".into()))?;
                decoding_key(&keys, kid).inspect_err(|_| self.keys.report_failure())?
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[discovery.issuer]);
        validation.validate_aud = false;

        jsonwebtoken::decode::<JsonValue>(id_token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| Error::TokenVerification(e.to_string()))
    }
}

impl<X: TokenExchange, R: RowIdResolver> IdentityStrategy for DelegatedStrategy<X, R> {
    async fn acquire(&self, _user: &BaseUser, cached: &CachedIdentity) -> StrategyOutcome {
        let tokens = match self.exchange.exchange(cached.subject_id.as_ref()).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "delegated token exchange failed");
                return StrategyOutcome {
                    access_token: None,
                    row_id: cached.row_id.clone(),
                    subject_id: cached.subject_id.clone(),
                    organizations: cached.organizations.clone(),
                    updated_record: None,
                    degraded: Some(DegradeReason::ExchangeFailed),
                };
            }
        };

        let mut subject_id = cached.subject_id.clone().filter(|s| !s.is_empty());
        let mut organizations = cached.organizations.clone();
        let mut degraded = None;

        if let Some(id_token) = tokens.id_token.as_deref() {
            match self.verify_id_token(id_token).await {
                Ok(payload) => {
                    if subject_id.is_none() {
                        subject_id = payload
                            .get("sub")
                            .and_then(JsonValue::as_str)
                            .map(|sub| SubjectId(sub.to_string()));
                    }
                    organizations = extract_organizations(&payload);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "id token verification failed, continuing degraded");
                    organizations = Vec::new();
                    degraded = Some(DegradeReason::VerificationFailed);
                }
            }
        }

        let mut row_id = cached.row_id.clone().filter(|r| !r.is_empty());
        let mut updated_record = None;

        if row_id.is_none()
            && let Some(subject) = subject_id.as_ref()
        {
            match self.rows.resolve(&tokens.access_token, subject).await {
                Ok(Some(resolved)) if !resolved.is_empty() => {
                    updated_record = Some(PersistedIdentityRecord {
                        row_id: resolved.clone(),
                        subject_id: subject.clone(),
                        organizations: organizations.clone(),
                        issued_at: self.clock.now(),
                    });
                    row_id = Some(resolved);
                }
                Ok(_) => {
                    tracing::warn!(subject = %subject, "upstream knows no row for subject");
                    degraded = degraded.or(Some(DegradeReason::RowIdUnresolved));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "row id resolution failed");
                    degraded = degraded.or(Some(DegradeReason::RowIdUnresolved));
                }
            }
        }

        StrategyOutcome {
            access_token: Some(tokens.access_token),
            row_id,
            subject_id,
            organizations,
            updated_record,
            degraded,
        }
    }
}
