#![doc = include_str!("../README.md")]

pub mod claims;
pub mod clock;
pub mod codec;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod resolve;
pub mod types;
pub mod upstream;

// Re-exports for convenient access
pub use claims::{ORGANIZATIONS_CLAIM, extract_organizations};
pub use clock::{Clock, SystemClock};
pub use codec::{IdentityCodec, SealedCodec};
pub use discovery::{DiscoveryCache, DiscoveryDocument};
pub use error::Error;
pub use keys::KeySetCache;
pub use resolve::{
    DegradeReason, DelegatedStrategy, DeploymentMode, IdentityConfig, LocalStrategy, Resolution,
    ResolvedIdentity, SessionOrchestrator,
};
pub use types::{
    BaseSession, BaseUser, IdentityContext, OrganizationClaim, OrganizationId,
    PersistedIdentityRecord, RowId, SubjectId,
};
pub use upstream::{UpstreamClient, UpstreamConfig};
