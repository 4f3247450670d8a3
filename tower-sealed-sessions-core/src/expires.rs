//! Session expiry configuration.
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// How long stores keep sessions that end with the browser session.
pub const DEFAULT_DURATION: Duration = Duration::weeks(2);

/// Session expiry configuration.
///
/// # Examples
///
/// ```rust
/// use time::{Duration, OffsetDateTime};
/// use tower_sealed_sessions_core::Expiry;
///
/// // Will be expired on "session end".
/// let expiry = Expiry::OnSessionEnd;
///
/// // Will be expired in five minutes from last activity.
/// let expiry = Expiry::OnInactivity(Duration::minutes(5));
///
/// // Will be expired at the given timestamp.
/// let expired_at = OffsetDateTime::now_utc().saturating_add(Duration::weeks(2));
/// let expiry = Expiry::AtDateTime(expired_at);
/// ```
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Expiry {
    /// Expire on [current session end][current-session-end], as defined by the
    /// browser.
    ///
    /// The cookie carries no `Max-Age`. Server-side stores still need a
    /// horizon and keep the record for [`DEFAULT_DURATION`].
    ///
    /// [current-session-end]: https://developer.mozilla.org/en-US/docs/Web/HTTP/Cookies#removal_defining_the_lifetime_of_a_cookie
    OnSessionEnd,

    /// Expire on inactivity.
    ///
    /// Reading a session is not considered activity for expiration purposes.
    /// Expiration is computed from the last time the session was _saved_.
    OnInactivity(Duration),

    /// Expire at a specific date and time.
    AtDateTime(OffsetDateTime),
}

impl Expiry {
    /// Get expiry as `OffsetDateTime`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use time::{Duration, OffsetDateTime};
    /// use tower_sealed_sessions_core::Expiry;
    ///
    /// let expiry = Expiry::OnInactivity(Duration::hours(1));
    /// let expected = OffsetDateTime::now_utc().saturating_add(Duration::hours(1));
    ///
    /// assert!(expiry.expiry_date() > expected.saturating_sub(Duration::seconds(1)));
    /// assert!(expiry.expiry_date() < expected.saturating_add(Duration::seconds(1)));
    /// ```
    pub fn expiry_date(&self) -> OffsetDateTime {
        match self {
            Expiry::OnInactivity(duration) => OffsetDateTime::now_utc().saturating_add(*duration),
            Expiry::AtDateTime(datetime) => *datetime,
            Expiry::OnSessionEnd => OffsetDateTime::now_utc().saturating_add(DEFAULT_DURATION),
        }
    }

    /// Get expiry as `Duration`, never negative.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use time::Duration;
    /// use tower_sealed_sessions_core::Expiry;
    ///
    /// let expected_duration = Duration::weeks(2);
    /// let age = Expiry::OnSessionEnd.expiry_age();
    ///
    /// assert!(age > expected_duration.saturating_sub(Duration::seconds(1)));
    /// assert!(age < expected_duration.saturating_add(Duration::seconds(1)));
    /// ```
    pub fn expiry_age(&self) -> Duration {
        std::cmp::max(
            self.expiry_date() - OffsetDateTime::now_utc(),
            Duration::ZERO,
        )
    }
}
