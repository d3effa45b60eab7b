use cookie::Cookie;
use http::HeaderMap;

use super::config::CookieSettings;
use super::cookies;
use super::traits::{IdentityStrategy, SessionSource};
use super::types::Resolution;
use crate::codec::IdentityCodec;
use crate::types::{CachedIdentity, IdentityContext};

/// Result of one resolution pass: the identity outcome plus the cookie
/// to set on the response being built, when the strategy refreshed the
/// persisted record.
pub struct ResolvedIdentity {
    pub resolution: Resolution,
    pub set_cookie: Option<Cookie<'static>>,
}

/// Entry point for per-request identity resolution.
///
/// Obtains the base session, merges any persisted identity fields, runs
/// the configured strategy, and produces an [`IdentityContext`]. The
/// caller always receives a usable (possibly degraded) resolution or
/// [`Resolution::Unauthenticated`] — never an error.
pub struct SessionOrchestrator<S, T, C> {
    source: S,
    strategy: T,
    codec: C,
    cookie: CookieSettings,
}

impl<S, T, C> SessionOrchestrator<S, T, C>
where
    S: SessionSource,
    T: IdentityStrategy,
    C: IdentityCodec,
{
    #[must_use]
    pub fn new(source: S, strategy: T, codec: C, cookie: CookieSettings) -> Self {
        Self {
            source,
            strategy,
            codec,
            cookie,
        }
    }

    /// Resolve the caller's identity for one request.
    ///
    /// `sealed_record` is the value of the identity cookie from the
    /// inbound request, if present. A record that fails to decode is
    /// treated as a cache miss, not an error.
    pub async fn resolve(
        &self,
        headers: &HeaderMap,
        sealed_record: Option<&str>,
    ) -> ResolvedIdentity {
        let session = match self.source.lookup(headers).await {
            Ok(Some(session)) => session,
            Ok(None) => return Self::unauthenticated(),
            Err(e) => {
                tracing::error!(error = %e, "base session lookup failed");
                return Self::unauthenticated();
            }
        };

        let mut cached = CachedIdentity {
            row_id: session.row_id.clone(),
            subject_id: session.subject_id.clone(),
            organizations: session.organizations.clone(),
        };
        if let Some(sealed) = sealed_record {
            match self.codec.decrypt(sealed) {
                Ok(record) => cached.merge_record(record),
                Err(e) => {
                    tracing::warn!(error = %e, "persisted identity decode failed, treating as cache miss");
                }
            }
        }

        let outcome = self.strategy.acquire(&session.user, &cached).await;

        let set_cookie = outcome.updated_record.as_ref().and_then(|record| {
            match self.codec.encrypt(record) {
                Ok(sealed) => Some(cookies::identity_cookie(
                    &self.cookie.name,
                    &sealed,
                    self.cookie.max_age_days,
                    self.cookie.secure,
                )),
                Err(e) => {
                    tracing::warn!(error = %e, "identity record encryption failed, skipping cookie");
                    None
                }
            }
        });

        // Empty-string ids count as absent here too.
        let row_id = outcome
            .row_id
            .filter(|r| !r.is_empty())
            .or_else(|| cached.row_id.filter(|r| !r.is_empty()));
        let subject_id = outcome
            .subject_id
            .filter(|s| !s.is_empty())
            .or_else(|| cached.subject_id.filter(|s| !s.is_empty()));

        let context = IdentityContext {
            user: session.user,
            row_id,
            subject_id,
            access_token: outcome.access_token,
            organizations: outcome.organizations,
        };

        let resolution = match outcome.degraded {
            Some(reason) => Resolution::Degraded(context, reason),
            None => Resolution::Resolved(context),
        };

        ResolvedIdentity {
            resolution,
            set_cookie,
        }
    }

    fn unauthenticated() -> ResolvedIdentity {
        ResolvedIdentity {
            resolution: Resolution::Unauthenticated,
            set_cookie: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::macros::datetime;

    use super::*;
    use crate::error::Error;
    use crate::resolve::traits::BoxError;
    use crate::resolve::types::{DegradeReason, StrategyOutcome};
    use crate::types::{
        BaseSession, BaseUser, OrganizationClaim, OrganizationId, PersistedIdentityRecord, RowId,
        SubjectId,
    };

    /// JSON passthrough codec — no cryptographic material needed.
    struct PlainCodec;

    impl IdentityCodec for PlainCodec {
        fn encrypt(&self, record: &PersistedIdentityRecord) -> Result<String, Error> {
            serde_json::to_string(record).map_err(|e| Error::CodecDecode(e.to_string()))
        }

        fn decrypt(&self, sealed: &str) -> Result<PersistedIdentityRecord, Error> {
            serde_json::from_str(sealed).map_err(|e| Error::CodecDecode(e.to_string()))
        }
    }

    enum SourceBehavior {
        Session(BaseSession),
        Anonymous,
        Failing,
    }

    struct StubSource {
        behavior: SourceBehavior,
    }

    impl SessionSource for StubSource {
        async fn lookup(&self, _headers: &HeaderMap) -> Result<Option<BaseSession>, BoxError> {
            match &self.behavior {
                SourceBehavior::Session(session) => Ok(Some(session.clone())),
                SourceBehavior::Anonymous => Ok(None),
                SourceBehavior::Failing => Err("session backend down".into()),
            }
        }
    }

    struct StubStrategy {
        calls: AtomicUsize,
        seen_cached: Mutex<Option<CachedIdentity>>,
        outcome: StrategyOutcome,
    }

    impl StubStrategy {
        fn returning(outcome: StrategyOutcome) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen_cached: Mutex::new(None),
                outcome,
            }
        }
    }

    impl IdentityStrategy for StubStrategy {
        async fn acquire(&self, _user: &BaseUser, cached: &CachedIdentity) -> StrategyOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_cached.lock().unwrap() = Some(cached.clone());
            self.outcome.clone()
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

    fn record() -> PersistedIdentityRecord {
        PersistedIdentityRecord {
            row_id: RowId("row_1".into()),
            subject_id: SubjectId("sub_1".into()),
            organizations: vec![claim("org_1")],
            issued_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    fn orchestrator(
        behavior: SourceBehavior,
        outcome: StrategyOutcome,
    ) -> SessionOrchestrator<StubSource, StubStrategy, PlainCodec> {
        SessionOrchestrator::new(
            StubSource { behavior },
            StubStrategy::returning(outcome),
            PlainCodec,
            CookieSettings::default(),
        )
    }

    #[tokio::test]
    async fn anonymous_request_resolves_to_unauthenticated() {
        let orch = orchestrator(SourceBehavior::Anonymous, StrategyOutcome::default());

        let resolved = orch.resolve(&HeaderMap::new(), None).await;

        assert!(resolved.resolution.is_unauthenticated());
        assert!(resolved.set_cookie.is_none());
        // No downstream calls were made.
        assert_eq!(orch.strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_session_lookup_resolves_to_unauthenticated() {
        let orch = orchestrator(SourceBehavior::Failing, StrategyOutcome::default());

        let resolved = orch.resolve(&HeaderMap::new(), None).await;

        assert!(resolved.resolution.is_unauthenticated());
        assert_eq!(orch.strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolved_outcome_merges_into_context() {
        let outcome = StrategyOutcome {
            access_token: Some("token_1".into()),
            row_id: Some(RowId("row_1".into())),
            subject_id: Some(SubjectId("sub_1".into())),
            organizations: vec![claim("org_1")],
            updated_record: None,
            degraded: None,
        };
        let orch = orchestrator(
            SourceBehavior::Session(BaseSession::new(user())),
            outcome,
        );

        let resolved = orch.resolve(&HeaderMap::new(), None).await;

        let context = resolved.resolution.context().unwrap();
        assert_eq!(context.user.id, "user_1");
        assert_eq!(context.access_token.as_deref(), Some("token_1"));
        assert_eq!(context.row_id.unwrap().as_str(), "row_1");
        assert_eq!(context.organizations.len(), 1);
    }

    #[tokio::test]
    async fn updated_record_sets_the_cookie() {
        let outcome = StrategyOutcome {
            access_token: Some("token_1".into()),
            row_id: Some(RowId("row_1".into())),
            subject_id: Some(SubjectId("sub_1".into())),
            organizations: vec![claim("org_1")],
            updated_record: Some(record()),
            degraded: None,
        };
        let orch = orchestrator(
            SourceBehavior::Session(BaseSession::new(user())),
            outcome,
        );

        let resolved = orch.resolve(&HeaderMap::new(), None).await;

        let cookie = resolved.set_cookie.expect("cookie should be set");
        assert_eq!(cookie.name(), "__plank_identity");
        let roundtripped = PlainCodec.decrypt(cookie.value()).unwrap();
        assert_eq!(roundtripped.row_id.as_str(), "row_1");
    }

    #[tokio::test]
    async fn degraded_outcome_is_still_a_context() {
        let outcome = StrategyOutcome {
            access_token: Some("token_1".into()),
            organizations: Vec::new(),
            degraded: Some(DegradeReason::VerificationFailed),
            ..StrategyOutcome::default()
        };
        let orch = orchestrator(
            SourceBehavior::Session(BaseSession::new(user())),
            outcome,
        );

        let resolved = orch.resolve(&HeaderMap::new(), None).await;

        match resolved.resolution {
            Resolution::Degraded(context, reason) => {
                assert_eq!(reason, DegradeReason::VerificationFailed);
                assert_eq!(context.access_token.as_deref(), Some("token_1"));
                assert!(context.organizations.is_empty());
            }
            other => panic!("expected degraded resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sealed_record_feeds_the_strategy() {
        let sealed = PlainCodec.encrypt(&record()).unwrap();
        let orch = orchestrator(
            SourceBehavior::Session(BaseSession::new(user())),
            StrategyOutcome::default(),
        );

        orch.resolve(&HeaderMap::new(), Some(&sealed)).await;

        let seen = orch.strategy.seen_cached.lock().unwrap().clone().unwrap();
        assert!(seen.is_complete());
        assert_eq!(seen.row_id.unwrap().as_str(), "row_1");
    }

    #[tokio::test]
    async fn undecodable_record_is_a_cache_miss() {
        let orch = orchestrator(
            SourceBehavior::Session(BaseSession::new(user())),
            StrategyOutcome::default(),
        );

        orch.resolve(&HeaderMap::new(), Some("garbage")).await;

        let seen = orch.strategy.seen_cached.lock().unwrap().clone().unwrap();
        assert!(seen.row_id.is_none());
        assert!(seen.organizations.is_empty());
    }

    #[tokio::test]
    async fn empty_string_ids_are_absent_in_the_context() {
        let mut session = BaseSession::new(user());
        session.row_id = Some(RowId(String::new()));
        session.subject_id = Some(SubjectId(String::new()));

        let orch = orchestrator(
            SourceBehavior::Session(session),
            StrategyOutcome {
                access_token: Some("token_1".into()),
                ..StrategyOutcome::default()
            },
        );

        let resolved = orch.resolve(&HeaderMap::new(), None).await;

        let context = resolved.resolution.context().unwrap();
        assert!(context.row_id.is_none());
        assert!(context.subject_id.is_none());
    }

    #[tokio::test]
    async fn session_attached_fields_beat_the_cookie() {
        let sealed = PlainCodec.encrypt(&record()).unwrap();
        let mut session = BaseSession::new(user());
        session.row_id = Some(RowId("row_session".into()));

        let orch = orchestrator(
            SourceBehavior::Session(session),
            StrategyOutcome::default(),
        );

        orch.resolve(&HeaderMap::new(), Some(&sealed)).await;

        let seen = orch.strategy.seen_cached.lock().unwrap().clone().unwrap();
        assert_eq!(seen.row_id.unwrap().as_str(), "row_session");
        assert_eq!(seen.subject_id.unwrap().as_str(), "sub_1");
    }
}
