use std::future::Future;

use http::HeaderMap;

use super::types::{ExchangedTokens, StrategyOutcome, SyncOutcome};
use crate::types::{BaseSession, BaseUser, CachedIdentity, RowId, SubjectId};

/// Boxed error type returned by consumer-provided collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer-provided base-session lookup.
///
/// Resolves the inbound request's opaque session into a [`BaseSession`],
/// or `None` for anonymous requests. This is the only collaborator whose
/// failure makes the whole resolution unauthenticated.
pub trait SessionSource: Send + Sync + 'static {
    fn lookup(
        &self,
        headers: &HeaderMap,
    ) -> impl Future<Output = Result<Option<BaseSession>, BoxError>> + Send;
}

/// Upstream token exchange for the delegated deployment mode.
pub trait TokenExchange: Send + Sync + 'static {
    /// Exchange the base session for an access token and, when the
    /// provider issues one, an ID token.
    fn exchange(
        &self,
        subject_id: Option<&SubjectId>,
    ) -> impl Future<Output = Result<ExchangedTokens, BoxError>> + Send;
}

/// Canonical row-identifier resolution against the upstream API.
pub trait RowIdResolver: Send + Sync + 'static {
    /// Resolve (or create) the canonical row id for `subject_id`.
    /// Returns `None` when the upstream knows no such identity.
    fn resolve(
        &self,
        access_token: &str,
        subject_id: &SubjectId,
    ) -> impl Future<Output = Result<Option<RowId>, BoxError>> + Send;
}

/// Upstream resolver invoked on the local-strategy cache-miss path.
///
/// Obtains or creates the canonical row identifier and refreshed claims
/// for a base user, returned as a self-issued token plus identifiers.
pub trait IdentitySync: Send + Sync + 'static {
    fn sync(&self, user: &BaseUser) -> impl Future<Output = Result<SyncOutcome, BoxError>> + Send;
}

/// One deployment mode's way of acquiring a token and claims.
///
/// Selected once at startup by configuration; both implementations yield
/// the same output shape. Implementations never return errors — failures
/// surface as degraded outcomes.
pub trait IdentityStrategy: Send + Sync + 'static {
    fn acquire(
        &self,
        user: &BaseUser,
        cached: &CachedIdentity,
    ) -> impl Future<Output = StrategyOutcome> + Send;
}
