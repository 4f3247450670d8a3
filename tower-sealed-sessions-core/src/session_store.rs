//! A session store for loading and persisting session state.
//!
//! The [`SessionStore`] trait is what the middleware drives: it turns the
//! request's cookies into [`SessionData`] and, once the handler is done,
//! writes any changes back. Stores that keep state on the server usually
//! don't implement it directly; they implement
//! [`Backend`](crate::backend::Backend) and are wrapped in a
//! [`BackendStore`](crate::backend::BackendStore), which takes care of the
//! cookie and codec plumbing.
use std::fmt::Debug;

use async_trait::async_trait;
use tower_cookies::Cookies;

use crate::{codec, session::SessionData};

/// Stores must map any errors that might occur during their use to this type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid session id")]
    InvalidId,

    #[error("Invalid modified timestamp")]
    InvalidModified,

    #[error(transparent)]
    Codec(#[from] codec::Error),

    #[error("Encoding failed with: {0}")]
    Encode(String),

    #[error("Decoding failed with: {0}")]
    Decode(String),

    #[error("{0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Defines the interface between sessions and the place they are kept.
///
/// `load` must only fail on hard errors such as an unreachable backend. A
/// missing, malformed, forged or expired cookie, as well as a cookie that
/// points at nothing, all yield a fresh [`SessionData`].
#[async_trait]
pub trait SessionStore: Debug + Send + Sync + 'static {
    /// Loads the session referenced by the cookie `name`.
    async fn load(&self, cookies: &Cookies, name: &str) -> Result<SessionData>;

    /// Persists `data` and writes the session cookie.
    ///
    /// A session marked deleted is removed instead, along with its cookie.
    async fn save(&self, cookies: &Cookies, name: &str, data: &mut SessionData) -> Result<()>;
}

/// Provides a method for deleting expired sessions.
///
/// Implemented by backends that can find expired records on their own, and by
/// any [`BackendStore`](crate::backend::BackendStore) wrapping one of them.
#[async_trait]
pub trait ExpiredDeletion: Debug + Send + Sync + 'static
where
    Self: Sized,
{
    /// A method for deleting expired sessions from the store.
    async fn delete_expired(&self) -> Result<()>;

    /// This function will keep running indefinitely, deleting expired rows and
    /// then waiting for the specified period before deleting again.
    ///
    /// Generally this will be used as a task, for example via
    /// `tokio::task::spawn`.
    ///
    /// # Errors
    ///
    /// This function returns a `Result` that contains an error of type
    /// `session_store::Error` if deletion fails.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let session_store = BackendStore::new(backend, codecs);
    ///
    /// let deletion_task = tokio::task::spawn(
    ///     session_store
    ///         .clone()
    ///         .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    /// );
    ///
    /// deletion_task.await.unwrap().unwrap();
    /// ```
    #[cfg(feature = "deletion-task")]
    #[cfg_attr(docsrs, doc(cfg(feature = "deletion-task")))]
    async fn continuously_delete_expired(self, period: tokio::time::Duration) -> Result<()> {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // The first tick completes immediately.
        loop {
            self.delete_expired().await?;
            interval.tick().await;
        }
    }
}
