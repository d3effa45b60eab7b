use cookie::{Cookie, SameSite};
use time::Duration;

/// Create the encrypted identity cookie.
///
/// Server-set and server-only-readable: `HttpOnly`, `SameSite=Lax`,
/// `Secure` outside development, fixed max-age. The value is the sealed
/// [`PersistedIdentityRecord`](crate::types::PersistedIdentityRecord).
pub fn identity_cookie(
    name: &str,
    sealed: &str,
    max_age_days: i64,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), sealed.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::days(max_age_days))
        .build()
}

/// Create a removal cookie for the identity record.
pub fn clear_identity_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_cookie_attributes() {
        let cookie = identity_cookie("__plank_identity", "sealed-blob", 30, true);

        assert_eq!(cookie.name(), "__plank_identity");
        assert_eq!(cookie.value(), "sealed-blob");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::days(30)));
    }

    #[test]
    fn insecure_cookies_for_development() {
        let cookie = identity_cookie("__plank_identity", "sealed-blob", 30, false);
        assert_eq!(cookie.secure(), Some(false));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_identity_cookie("__plank_identity");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    }
}
