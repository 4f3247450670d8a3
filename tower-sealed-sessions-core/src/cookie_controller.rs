//! Where the session token lives on the request and the response.
use std::fmt::Debug;

use tower_cookies::{Cookie, Cookies};

/// Reads and writes the session token.
///
/// Stores are generic over a controller so the token can be carried somewhere
/// other than the plain cookie jar, for instance a header or a jar with its own
/// signing.
pub trait CookieController: Clone + Debug + Send + Sync + 'static {
    /// Returns the raw token stored under `name`, if any.
    fn get(&self, cookies: &Cookies, name: &str) -> Option<String>;

    /// Writes `cookie` to the response.
    fn set(&self, cookies: &Cookies, cookie: Cookie<'static>);
}

/// Carries the token in the request's cookie jar as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCookie;

impl CookieController for PlaintextCookie {
    fn get(&self, cookies: &Cookies, name: &str) -> Option<String> {
        cookies.get(name).map(|cookie| cookie.value().to_string())
    }

    fn set(&self, cookies: &Cookies, cookie: Cookie<'static>) {
        cookies.add(cookie)
    }
}
