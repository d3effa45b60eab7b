use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Canonical internal row identifier for a user.
///
/// Distinct from the identity-provider-issued subject id: once a `RowId`
/// has been issued for a given [`SubjectId`], that mapping is stable and
/// must not change across syncs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct RowId(pub String);

impl RowId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity-provider-issued subject identifier (OIDC `sub` claim).
///
/// In local deployments, derived deterministically from the stable user id
/// when the authority has not issued one yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Organization identifier within the claims array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Immutable caller identity produced by the base-session collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Base session returned by the session-source collaborator.
///
/// `row_id`, `subject_id`, and `organizations` are identity fields the
/// collaborator may already have attached from its own store; the
/// orchestrator merges them with the persisted cookie record before
/// running a strategy.
#[derive(Debug, Clone)]
pub struct BaseSession {
    pub user: BaseUser,
    pub row_id: Option<RowId>,
    pub subject_id: Option<SubjectId>,
    pub organizations: Vec<OrganizationClaim>,
}

impl BaseSession {
    /// Create a base session carrying only the user identity.
    #[must_use]
    pub fn new(user: BaseUser) -> Self {
        Self {
            user,
            row_id: None,
            subject_id: None,
            organizations: Vec::new(),
        }
    }
}

/// One organization-membership claim.
///
/// Unique by `organization_id` within a claims array; the upstream
/// contract guarantees uniqueness, and the extractor enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationClaim {
    #[serde(rename = "organizationId")]
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Per-request output of identity resolution.
///
/// Constructed fresh every request; never cached beyond the
/// request/response cycle. A context missing `access_token` or with empty
/// `organizations` is *degraded* but still usable for partial
/// functionality.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub user: BaseUser,
    pub row_id: Option<RowId>,
    pub subject_id: Option<SubjectId>,
    pub access_token: Option<String>,
    pub organizations: Vec<OrganizationClaim>,
}

/// Encrypted cookie payload holding resolved identity across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedIdentityRecord {
    #[serde(rename = "rowId")]
    pub row_id: RowId,
    #[serde(rename = "subjectId")]
    pub subject_id: SubjectId,
    pub organizations: Vec<OrganizationClaim>,
    #[serde(rename = "issuedAt", with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
}

/// Identity fields already known before a strategy runs, merged from the
/// session-attached fields and the decrypted cookie record.
#[derive(Debug, Clone, Default)]
pub struct CachedIdentity {
    pub row_id: Option<RowId>,
    pub subject_id: Option<SubjectId>,
    pub organizations: Vec<OrganizationClaim>,
}

impl CachedIdentity {
    /// True when the cached fields are sufficient to skip all network calls.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.row_id.as_ref().is_some_and(|r| !r.is_empty())
            && self.subject_id.as_ref().is_some_and(|s| !s.is_empty())
            && !self.organizations.is_empty()
    }

    /// Fill any gaps from a persisted record, keeping already-known fields.
    pub fn merge_record(&mut self, record: PersistedIdentityRecord) {
        if self.row_id.is_none() && !record.row_id.is_empty() {
            self.row_id = Some(record.row_id);
        }
        if self.subject_id.is_none() && !record.subject_id.is_empty() {
            self.subject_id = Some(record.subject_id);
        }
        if self.organizations.is_empty() {
            self.organizations = record.organizations;
        }
    }
}
