//! Per-request identity resolution.
//!
//! The [`SessionOrchestrator`] is the entry point: it obtains the base
//! session from the consumer's [`SessionSource`], merges the persisted
//! identity record from the encrypted cookie, runs the deployment's
//! token-acquisition strategy, and yields a [`Resolution`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use plank_identity::resolve::{
//!     DeploymentMode, IdentityConfig, LocalStrategy, SessionOrchestrator,
//! };
//! use plank_identity::{SealedCodec, SystemClock, UpstreamClient, UpstreamConfig};
//!
//! // 1. Implement SessionSource for your session backend (or use the
//! //    upstream client for the remaining collaborators).
//! let config = IdentityConfig::from_env()?;
//! let clock = std::sync::Arc::new(SystemClock);
//!
//! // 2. Select the strategy for the deployment mode, once, at startup.
//! let upstream = UpstreamClient::new(UpstreamConfig::new(config.authority_base()));
//! let strategy = LocalStrategy::new(upstream, config.token_secret().unwrap(), clock);
//!
//! // 3. Resolve per request.
//! let orchestrator = SessionOrchestrator::new(
//!     session_source,
//!     strategy,
//!     SealedCodec::new(config.cookie_secret()),
//!     config.cookie_settings().clone(),
//! );
//! let resolved = orchestrator.resolve(&headers, identity_cookie_value).await;
//! ```

mod config;
mod cookies;
mod delegated;
mod local;
mod orchestrator;
mod traits;
mod types;

pub use config::{CookieSettings, DeploymentMode, IdentityConfig};
pub use cookies::{clear_identity_cookie, identity_cookie};
pub use delegated::DelegatedStrategy;
pub use local::{LocalStrategy, derive_subject_id};
pub use orchestrator::{ResolvedIdentity, SessionOrchestrator};
pub use traits::{
    BoxError, IdentityStrategy, IdentitySync, RowIdResolver, SessionSource, TokenExchange,
};
pub use types::{DegradeReason, ExchangedTokens, Resolution, StrategyOutcome, SyncOutcome};
