use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Value as JsonValue, json};
use uuid::Uuid;

use super::traits::{IdentityStrategy, IdentitySync};
use super::types::{DegradeReason, StrategyOutcome};
use crate::claims::{ORGANIZATIONS_CLAIM, extract_organizations};
use crate::clock::Clock;
use crate::error::Error;
use crate::types::{BaseUser, CachedIdentity, PersistedIdentityRecord, SubjectId};

/// Issuer embedded in locally minted tokens.
const LOCAL_ISSUER: &str = "plank-local";
/// Audience embedded in locally minted tokens.
const LOCAL_AUDIENCE: &str = "plank-api";
/// Lifetime of a locally minted token, in seconds.
const LOCAL_TOKEN_TTL_SECS: i64 = 3600;

/// Namespace for deriving subject ids from stable user ids.
const SUBJECT_NAMESPACE: Uuid = Uuid::from_u128(0x5eb1_c2a9_77f3_4b84_9c3d_2f6a_1d08_44e2);

/// Derive a subject id deterministically from a stable user id.
///
/// Stable across calls for the same user id — a namespaced UUID v5, not a
/// random value — so repeated resolutions of the same user converge on
/// one identity.
#[must_use]
pub fn derive_subject_id(user_id: &str) -> SubjectId {
    SubjectId(Uuid::new_v5(&SUBJECT_NAMESPACE, user_id.as_bytes()).to_string())
}

/// Token acquisition for locally hosted identity authorities.
///
/// Cache hit (persisted row id, subject id, and non-empty organizations):
/// mints a signed token embedding the cached claims with zero network
/// calls. Cache miss: one [`IdentitySync`] round-trip, after which the
/// refreshed record is persisted.
pub struct LocalStrategy<Y> {
    sync: Y,
    signing_key: EncodingKey,
    clock: Arc<dyn Clock>,
}

impl<Y: IdentitySync> LocalStrategy<Y> {
    #[must_use]
    pub fn new(sync: Y, token_secret: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            sync,
            signing_key: EncodingKey::from_secret(token_secret.as_bytes()),
            clock,
        }
    }

    fn mint_token(&self, cached: &CachedIdentity) -> Result<String, Error> {
        let issued_at = self.clock.now().unix_timestamp();
        let mut claims = json!({
            "iss": LOCAL_ISSUER,
            "aud": LOCAL_AUDIENCE,
            "sub": cached.subject_id.as_ref().map(SubjectId::as_str),
            "rowId": cached.row_id,
            "iat": issued_at,
            "exp": issued_at + LOCAL_TOKEN_TTL_SECS,
        });
        claims[ORGANIZATIONS_CLAIM] = json!(cached.organizations);

        jsonwebtoken::encode(&Header::default(), &claims, &self.signing_key)
            .map_err(|e| Error::TokenVerification(e.to_string()))
    }
}

/// Decode a self-issued token's payload without re-verifying it.
///
/// The sync endpoint signs its own tokens; this path only needs the
/// embedded claims, so the signature and expiry are not checked.
fn decode_unverified(token: &str) -> Result<JsonValue, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&Vec::<String>::with_capacity(0));

    jsonwebtoken::decode::<JsonValue>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| Error::TokenVerification(e.to_string()))
}

impl<Y: IdentitySync> IdentityStrategy for LocalStrategy<Y> {
    async fn acquire(&self, user: &BaseUser, cached: &CachedIdentity) -> StrategyOutcome {
        let subject_id = cached
            .subject_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| derive_subject_id(&user.id));

        if cached.is_complete() {
            return match self.mint_token(cached) {
                Ok(token) => StrategyOutcome {
                    access_token: Some(token),
                    row_id: cached.row_id.clone(),
                    subject_id: Some(subject_id),
                    organizations: cached.organizations.clone(),
                    updated_record: None,
                    degraded: None,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "local token minting failed");
                    StrategyOutcome {
                        access_token: None,
                        row_id: cached.row_id.clone(),
                        subject_id: Some(subject_id),
                        organizations: cached.organizations.clone(),
                        updated_record: None,
                        degraded: Some(DegradeReason::MintFailed),
                    }
                }
            };
        }

        match self.sync.sync(user).await {
            Ok(outcome) => {
                let organizations = match decode_unverified(&outcome.access_token) {
                    Ok(payload) => extract_organizations(&payload),
                    Err(e) => {
                        tracing::warn!(error = %e, "sync token decode failed");
                        Vec::new()
                    }
                };

                let row_id = Some(outcome.row_id.clone()).filter(|r| !r.is_empty());
                let synced_subject = Some(outcome.subject_id.clone()).filter(|s| !s.is_empty());

                // Persist only when the sync produced both identifiers.
                let updated_record = match (&row_id, &synced_subject) {
                    (Some(row_id), Some(subject_id)) => Some(PersistedIdentityRecord {
                        row_id: row_id.clone(),
                        subject_id: subject_id.clone(),
                        organizations: organizations.clone(),
                        issued_at: self.clock.now(),
                    }),
                    _ => None,
                };

                StrategyOutcome {
                    access_token: Some(outcome.access_token),
                    row_id: row_id.or_else(|| cached.row_id.clone()),
                    subject_id: synced_subject.or(Some(subject_id)),
                    organizations,
                    updated_record,
                    degraded: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity sync failed, continuing degraded");
                StrategyOutcome {
                    access_token: None,
                    row_id: cached.row_id.clone(),
                    subject_id: Some(subject_id),
                    organizations: Vec::new(),
                    updated_record: None,
                    degraded: Some(DegradeReason::SyncFailed),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::macros::datetime;

    use super::*;
    use crate::clock::test::ManualClock;
    use crate::resolve::traits::BoxError;
    use crate::resolve::types::SyncOutcome;
    use crate::types::{OrganizationClaim, OrganizationId, RowId};

    struct StubSync {
        calls: AtomicUsize,
        outcome: Option<SyncOutcome>,
    }

    impl StubSync {
        fn succeeding(outcome: SyncOutcome) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome: Some(outcome),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                outcome: None,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl IdentitySync for StubSync {
        async fn sync(&self, _user: &BaseUser) -> Result<SyncOutcome, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Some(outcome) => Ok(outcome.clone()),
                None => Err("sync endpoint down".into()),
            }
        }
    }

    fn user() -> BaseUser {
        BaseUser {
            id: "user_1".into(),
            email: Some("user@example.com".into()),
            name: Some("User One".into()),
            image: None,
        }
    }

    fn claim(id: &str) -> OrganizationClaim {
        OrganizationClaim {
            organization_id: OrganizationId(id.to_string()),
            roles: vec!["member".into()],
            name: None,
            slug: None,
        }
    }

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::starting_at(datetime!(2025-01-01 00:00 UTC)))
    }

    fn sync_token(organizations: &[OrganizationClaim]) -> String {
        let mut claims = json!({
            "sub": "sub_synced",
            "exp": 4_102_444_800i64,
        });
        claims[ORGANIZATIONS_CLAIM] = json!(organizations);
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"sync-secret"),
        )
        .unwrap()
    }

    #[test]
    fn subject_derivation_is_deterministic() {
        assert_eq!(derive_subject_id("user_1"), derive_subject_id("user_1"));
        assert_ne!(derive_subject_id("user_1"), derive_subject_id("user_2"));
    }

    #[tokio::test]
    async fn warm_cache_mints_locally_without_sync() {
        let sync = StubSync::failing();
        let strategy = LocalStrategy::new(sync, "token-secret", test_clock());

        let cached = CachedIdentity {
            row_id: Some(RowId("row_1".into())),
            subject_id: Some(SubjectId("sub_1".into())),
            organizations: vec![claim("org_1")],
        };

        let outcome = strategy.acquire(&user(), &cached).await;

        assert_eq!(strategy.sync.call_count(), 0);
        assert!(outcome.degraded.is_none());
        assert!(outcome.updated_record.is_none());
        assert_eq!(outcome.organizations, cached.organizations);

        // The minted token embeds the cached claims.
        let payload = decode_unverified(outcome.access_token.as_deref().unwrap()).unwrap();
        assert_eq!(payload["iss"], LOCAL_ISSUER);
        assert_eq!(payload["sub"], "sub_1");
        assert_eq!(extract_organizations(&payload), cached.organizations);
    }

    #[tokio::test]
    async fn cold_cache_syncs_once_and_persists() {
        let organizations = vec![claim("org_1"), claim("org_2")];
        let sync = StubSync::succeeding(SyncOutcome {
            access_token: sync_token(&organizations),
            row_id: RowId("row_synced".into()),
            subject_id: SubjectId("sub_synced".into()),
        });
        let strategy = LocalStrategy::new(sync, "token-secret", test_clock());

        let outcome = strategy.acquire(&user(), &CachedIdentity::default()).await;

        assert_eq!(strategy.sync.call_count(), 1);
        assert!(outcome.degraded.is_none());
        assert_eq!(outcome.organizations, organizations);
        assert_eq!(outcome.row_id.unwrap().as_str(), "row_synced");

        let record = outcome.updated_record.expect("record should be persisted");
        assert_eq!(record.row_id.as_str(), "row_synced");
        assert_eq!(record.subject_id.as_str(), "sub_synced");
        assert_eq!(record.organizations, organizations);
    }

    #[tokio::test]
    async fn sync_without_row_id_is_not_persisted() {
        let sync = StubSync::succeeding(SyncOutcome {
            access_token: sync_token(&[claim("org_1")]),
            row_id: RowId(String::new()),
            subject_id: SubjectId("sub_synced".into()),
        });
        let strategy = LocalStrategy::new(sync, "token-secret", test_clock());

        let outcome = strategy.acquire(&user(), &CachedIdentity::default()).await;

        assert!(outcome.updated_record.is_none());
        assert!(outcome.access_token.is_some());
    }

    #[tokio::test]
    async fn sync_failure_degrades() {
        let sync = StubSync::failing();
        let strategy = LocalStrategy::new(sync, "token-secret", test_clock());

        let outcome = strategy.acquire(&user(), &CachedIdentity::default()).await;

        assert_eq!(strategy.sync.call_count(), 1);
        assert_eq!(outcome.degraded, Some(DegradeReason::SyncFailed));
        assert!(outcome.access_token.is_none());
        assert!(outcome.organizations.is_empty());
        // Identity resolution still proceeds with a derived subject.
        assert_eq!(outcome.subject_id.unwrap(), derive_subject_id("user_1"));
    }

    #[tokio::test]
    async fn missing_subject_is_derived_not_random() {
        let sync = StubSync::failing();
        let strategy = LocalStrategy::new(sync, "token-secret", test_clock());

        let first = strategy.acquire(&user(), &CachedIdentity::default()).await;
        let second = strategy.acquire(&user(), &CachedIdentity::default()).await;

        assert_eq!(first.subject_id, second.subject_id);
    }
}
