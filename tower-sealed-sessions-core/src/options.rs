//! Cookie attributes and expiry shared by a store and its sessions.
use std::borrow::Cow;

use time::{Duration, OffsetDateTime};
use tower_cookies::{cookie::SameSite, Cookie};

use crate::Expiry;

/// Default inactivity window of a session, thirty days.
pub const DEFAULT_MAX_AGE: Duration = Duration::days(30);

/// Attributes applied to the session cookie, plus the session's expiry.
///
/// Every store carries a set of `Options`; individual sessions may override
/// them with [`Session::set_options`](crate::Session::set_options).
///
/// # Examples
///
/// ```rust
/// use time::Duration;
/// use tower_sealed_sessions_core::{cookie::SameSite, Expiry, Options};
///
/// let options = Options::default()
///     .with_path("/app")
///     .with_same_site(SameSite::Lax)
///     .with_expiry(Expiry::OnInactivity(Duration::hours(8)));
///
/// let cookie = options.build_cookie("id", "value".to_string());
/// assert_eq!(cookie.path(), Some("/app"));
/// assert_eq!(cookie.max_age(), Some(Duration::hours(8)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub path: Cow<'static, str>,
    pub domain: Option<Cow<'static, str>>,
    pub expiry: Expiry,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: "/".into(),
            domain: None,
            expiry: Expiry::OnInactivity(DEFAULT_MAX_AGE),
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
        }
    }
}

impl Options {
    /// Configures the `"Path"` attribute. The default value is `"/"`.
    pub fn with_path<P: Into<Cow<'static, str>>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    /// Configures the `"Domain"` attribute. The default value is `None`.
    pub fn with_domain<D: Into<Cow<'static, str>>>(mut self, domain: D) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Configures when the session expires.
    ///
    /// Anything but [`Expiry::OnSessionEnd`] sets the cookie's `"Max-Age"`.
    /// The default is thirty days of inactivity.
    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Configures the `"Secure"` attribute. The default value is `true`.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Configures the `"HttpOnly"` attribute.
    ///
    /// # ⚠️ **Warning: Cross-site scripting risk**
    ///
    /// Applications should generally **not** override the default value of
    /// `true`. If you do, you are exposing your application to increased risk
    /// of cookie theft via techniques like cross-site scripting.
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Configures the `"SameSite"` attribute. The default value is
    /// [`SameSite::Strict`].
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Builds the cookie carrying `value` under `name`.
    pub fn build_cookie(&self, name: &str, value: String) -> Cookie<'static> {
        let mut cookie_builder = Cookie::build((name.to_string(), value))
            .http_only(self.http_only)
            .same_site(self.same_site)
            .secure(self.secure)
            .path(self.path.clone());

        match self.expiry {
            Expiry::OnSessionEnd => {}
            Expiry::OnInactivity(duration) => cookie_builder = cookie_builder.max_age(duration),
            Expiry::AtDateTime(_) => {
                cookie_builder = cookie_builder.max_age(self.expiry.expiry_age())
            }
        }

        if let Some(domain) = self.domain.clone() {
            cookie_builder = cookie_builder.domain(domain);
        }

        cookie_builder.build()
    }

    /// Builds a cookie that makes the browser drop `name` right away.
    ///
    /// Path and domain must match the session cookie for the removal to take
    /// effect.
    pub fn removal_cookie(&self, name: &str) -> Cookie<'static> {
        let mut cookie_builder = Cookie::build((name.to_string(), ""))
            .http_only(self.http_only)
            .same_site(self.same_site)
            .secure(self.secure)
            .path(self.path.clone())
            .max_age(Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH);

        if let Some(domain) = self.domain.clone() {
            cookie_builder = cookie_builder.domain(domain);
        }

        cookie_builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cookie = Options::default().build_cookie("id", "abc".to_string());

        assert_eq!(cookie.name(), "id");
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.domain(), None);
        assert_eq!(cookie.max_age(), Some(DEFAULT_MAX_AGE));
    }

    #[test]
    fn fixed_date_max_age() {
        let expiry = Expiry::AtDateTime(OffsetDateTime::now_utc() + Duration::days(1));
        let cookie = Options::default()
            .with_expiry(expiry)
            .build_cookie("id", "abc".to_string());

        let max_age = cookie.max_age().unwrap();
        assert!(max_age <= Duration::days(1));
        assert!(max_age > Duration::days(1) - Duration::seconds(1));
    }

    #[test]
    fn session_end_has_no_max_age() {
        let cookie = Options::default()
            .with_expiry(Expiry::OnSessionEnd)
            .build_cookie("id", "abc".to_string());
        assert!(cookie.max_age().is_none());
    }

    #[test]
    fn removal_cookie_keeps_path_and_domain() {
        let options = Options::default()
            .with_path("/app")
            .with_domain("example.com");
        let cookie = options.removal_cookie("id");

        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.path(), Some("/app"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(
            cookie.expires_datetime(),
            Some(OffsetDateTime::UNIX_EPOCH)
        );
    }
}
