//! Core types and traits for `tower-sealed-sessions`.
//!
//! A [`Session`] is a lazily loaded key-value bag bound to one cookie of a
//! request. It is loaded and saved through a [`SessionStore`]. Cookies are
//! authenticated, and optionally encrypted, with [`Codecs`].
//!
//! Server-side stores implement [`Backend`] and are wrapped in a
//! [`BackendStore`].
pub use tower_cookies::cookie;

#[doc(inline)]
pub use self::{
    backend::{Backend, BackendStore},
    codec::{Codecs, SecureCookie},
    cookie_controller::{CookieController, PlaintextCookie},
    expires::Expiry,
    id::Id,
    options::Options,
    session::{Session, SessionData},
    session_store::{ExpiredDeletion, SessionStore},
};

#[cfg(feature = "axum-core")]
#[cfg_attr(docsrs, doc(cfg(feature = "axum-core")))]
pub mod extract;

pub mod backend;
pub mod codec;
pub mod cookie_controller;
pub mod expires;
pub mod id;
pub mod options;
pub mod session;
pub mod session_store;
