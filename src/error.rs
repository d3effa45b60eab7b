#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("discovery document unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("token verification failed: {0}")]
    TokenVerification(String),

    #[error("identity sync failed: {0}")]
    Sync(String),

    #[error("row id resolution failed: {0}")]
    RowIdResolution(String),

    #[error("persisted identity decode failed: {0}")]
    CodecDecode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
