use url::Url;

use crate::error::Error;

/// Which token-acquisition strategy the deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Tokens and claims minted by a locally hosted authority.
    Local,
    /// Tokens and claims obtained from a third-party identity provider.
    Delegated,
}

impl std::str::FromStr for DeploymentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "delegated" => Ok(Self::Delegated),
            other => Err(Error::Config(format!(
                "unknown deployment mode '{other}' (expected 'local' or 'delegated')"
            ))),
        }
    }
}

/// Cookie attributes the orchestrator applies to the identity cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub max_age_days: i64,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: "__plank_identity".into(),
            max_age_days: 30,
            secure: true,
        }
    }
}

/// Identity-core configuration.
///
/// Required fields are constructor parameters — no runtime "missing
/// field" errors. Use [`from_env()`](IdentityConfig::from_env) for
/// convention-based setup, or [`new()`](IdentityConfig::new) with
/// `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    mode: DeploymentMode,
    authority_base: Url,
    cookie_secret: String,
    token_secret: Option<String>,
    cookie: CookieSettings,
}

impl IdentityConfig {
    /// Create a configuration with the required fields.
    #[must_use]
    pub fn new(mode: DeploymentMode, authority_base: Url, cookie_secret: impl Into<String>) -> Self {
        Self {
            mode,
            authority_base,
            cookie_secret: cookie_secret.into(),
            token_secret: None,
            cookie: CookieSettings::default(),
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `PLANK_IDENTITY_MODE`: `local` or `delegated`
    /// - `PLANK_AUTH_BASE_URL`: identity authority base URL
    /// - `PLANK_COOKIE_SECRET`: identity cookie encryption secret
    ///
    /// # Optional env vars
    /// - `PLANK_TOKEN_SECRET`: local token signing secret (required when
    ///   the mode is `local`)
    /// - `PLANK_IDENTITY_COOKIE_NAME`: override the cookie name
    /// - `PLANK_IDENTITY_COOKIE_MAX_AGE_DAYS`: override the cookie max-age
    /// - `DEV_AUTH`: set to `"1"` or `"true"` to disable secure cookies
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required vars are missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let mode: DeploymentMode = std::env::var("PLANK_IDENTITY_MODE")
            .map_err(|_| Error::Config("PLANK_IDENTITY_MODE is required".into()))?
            .parse()?;

        let authority_base: Url = std::env::var("PLANK_AUTH_BASE_URL")
            .map_err(|_| Error::Config("PLANK_AUTH_BASE_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("PLANK_AUTH_BASE_URL: {e}")))?;

        let cookie_secret = std::env::var("PLANK_COOKIE_SECRET")
            .map_err(|_| Error::Config("PLANK_COOKIE_SECRET is required".into()))?;

        let token_secret = std::env::var("PLANK_TOKEN_SECRET").ok();
        if mode == DeploymentMode::Local && token_secret.is_none() {
            return Err(Error::Config(
                "PLANK_TOKEN_SECRET is required in local mode".into(),
            ));
        }

        let dev_auth = matches!(std::env::var("DEV_AUTH").as_deref(), Ok("1") | Ok("true"));

        let mut config = Self::new(mode, authority_base, cookie_secret)
            .with_secure_cookies(!dev_auth);
        config.token_secret = token_secret;

        if let Ok(name) = std::env::var("PLANK_IDENTITY_COOKIE_NAME") {
            config = config.with_cookie_name(name);
        }
        if let Ok(days) = std::env::var("PLANK_IDENTITY_COOKIE_MAX_AGE_DAYS") {
            let days: i64 = days
                .parse()
                .map_err(|e| Error::Config(format!("PLANK_IDENTITY_COOKIE_MAX_AGE_DAYS: {e}")))?;
            config = config.with_cookie_max_age_days(days);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_token_secret(mut self, secret: impl Into<String>) -> Self {
        self.token_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie.name = name.into();
        self
    }

    #[must_use]
    pub fn with_cookie_max_age_days(mut self, days: i64) -> Self {
        self.cookie.max_age_days = days;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.cookie.secure = secure;
        self
    }

    #[must_use]
    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    #[must_use]
    pub fn authority_base(&self) -> &Url {
        &self.authority_base
    }

    #[must_use]
    pub fn cookie_secret(&self) -> &str {
        &self.cookie_secret
    }

    /// Local token signing secret, when configured.
    #[must_use]
    pub fn token_secret(&self) -> Option<&str> {
        self.token_secret.as_deref()
    }

    #[must_use]
    pub fn cookie_settings(&self) -> &CookieSettings {
        &self.cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses() {
        assert_eq!("local".parse::<DeploymentMode>().unwrap(), DeploymentMode::Local);
        assert_eq!(
            "delegated".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::Delegated
        );
        assert!("saml".parse::<DeploymentMode>().is_err());
    }

    #[test]
    fn defaults_and_overrides() {
        let config = IdentityConfig::new(
            DeploymentMode::Local,
            "https://auth.plank.dev".parse().unwrap(),
            "cookie-secret",
        );
        assert_eq!(config.cookie_settings().name, "__plank_identity");
        assert_eq!(config.cookie_settings().max_age_days, 30);
        assert!(config.cookie_settings().secure);
        assert!(config.token_secret().is_none());

        let config = config
            .with_token_secret("token-secret")
            .with_cookie_name("__custom")
            .with_cookie_max_age_days(7)
            .with_secure_cookies(false);
        assert_eq!(config.cookie_settings().name, "__custom");
        assert_eq!(config.cookie_settings().max_age_days, 7);
        assert!(!config.cookie_settings().secure);
        assert_eq!(config.token_secret(), Some("token-secret"));
    }
}
