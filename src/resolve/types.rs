use serde::Deserialize;

use crate::types::{
    IdentityContext, OrganizationClaim, PersistedIdentityRecord, RowId, SubjectId,
};

/// Token pair returned by the delegated token-exchange collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangedTokens {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "idToken", default)]
    pub id_token: Option<String>,
}

/// Result of an identity sync call (local-strategy cache-miss path).
#[derive(Debug, Clone, Deserialize)]
pub struct SyncOutcome {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "rowId")]
    pub row_id: RowId,
    #[serde(rename = "subjectId")]
    pub subject_id: SubjectId,
}

/// Why a resolution came back partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// The token-exchange endpoint was unreachable or rejected the call.
    ExchangeFailed,
    /// The ID token could not be verified.
    VerificationFailed,
    /// The identity sync endpoint failed.
    SyncFailed,
    /// No canonical row id could be resolved.
    RowIdUnresolved,
    /// Local token minting failed.
    MintFailed,
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::ExchangeFailed => "token exchange failed",
            Self::VerificationFailed => "token verification failed",
            Self::SyncFailed => "identity sync failed",
            Self::RowIdUnresolved => "row id unresolved",
            Self::MintFailed => "token minting failed",
        };
        f.write_str(reason)
    }
}

/// What a strategy produced for the current request.
///
/// Strategies never fail outward; a partial result carries a
/// [`DegradeReason`] instead.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutcome {
    pub access_token: Option<String>,
    pub row_id: Option<RowId>,
    pub subject_id: Option<SubjectId>,
    pub organizations: Vec<OrganizationClaim>,
    /// Record to persist in the encrypted cookie, when the strategy
    /// learned something worth caching.
    pub updated_record: Option<PersistedIdentityRecord>,
    pub degraded: Option<DegradeReason>,
}

/// Tri-state outcome of identity resolution.
///
/// Degradation is a typed outcome, not a logged side effect: callers can
/// distinguish a fully resolved identity from one missing its token or
/// claims, and both from an unauthenticated request.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Full identity: token and claims present.
    Resolved(IdentityContext),
    /// Usable identity missing one or more optional fields.
    Degraded(IdentityContext, DegradeReason),
    /// No base session; the caller is anonymous.
    Unauthenticated,
}

impl Resolution {
    /// The identity context, if any — degraded contexts included.
    #[must_use]
    pub fn context(self) -> Option<IdentityContext> {
        match self {
            Self::Resolved(context) | Self::Degraded(context, _) => Some(context),
            Self::Unauthenticated => None,
        }
    }

    #[must_use]
    pub fn as_context(&self) -> Option<&IdentityContext> {
        match self {
            Self::Resolved(context) | Self::Degraded(context, _) => Some(context),
            Self::Unauthenticated => None,
        }
    }

    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }
}
