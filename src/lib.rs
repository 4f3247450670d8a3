//! # Overview
//!
//! This crate provides sessions, key-value pairs associated with a site
//! visitor, as a [`tower`](https://docs.rs/tower/latest/tower/) middleware.
//! Session cookies are signed, and optionally encrypted, so they can't be
//! forged or read by the user agent.
//!
//! It offers:
//!
//! - **Sealed Cookies:** Cookie values are authenticated with HMAC-SHA256 and
//!   may be encrypted with AES. Keys can be rotated by configuring several
//!   [`Codecs`] key pairs; the first pair encodes, all of them decode.
//! - **Pluggable Storage Backends:** Keep session values in the cookie itself
//!   with `CookieStore`, or keep them server side by implementing [`Backend`]
//!   and wrapping it in a [`BackendStore`]. Fully custom stores implement
//!   [`SessionStore`].
//! - **Minimal Overhead**: Sessions are only loaded from their backing stores
//!   when they're actually used and only saved when they've been written to.
//!   That means this middleware can be installed at any point in your route
//!   graph with minimal overhead.
//! - **An `axum` Extractor for [`Session`]:** Applications built with `axum`
//!   can use `Session` as an extractor directly in their handlers.
//! - **Flash Messages:** Values added with [`Session::add_flash`] are returned
//!   once by [`Session::flashes`] and then discarded.
//!
//! ### Session stores
//!
//! | Feature          | Persistent | Description                                      |
//! | ---------------- | ---------- | ------------------------------------------------ |
//! | `cookie-store`   | Client     | Values sealed into the cookie itself (default)   |
//! | `dal-store`      | Varies     | Any document database behind a `Connection`      |
//! | `mongodb-store`  | Yes        | MongoDB session store                            |
//! | `redis-store`    | Yes        | Redis via `fred` session store                   |
//! | `dynamodb-store` | Yes        | DynamoDB session store                           |
//!
//! # Usage with an `axum` application
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//!
//! use axum::{response::IntoResponse, routing::get, Router};
//! use serde::{Deserialize, Serialize};
//! use time::Duration;
//! use tower_sealed_sessions::{Codecs, CookieStore, Expiry, Options, Session, SessionManagerLayer};
//!
//! const COUNTER_KEY: &str = "counter";
//!
//! #[derive(Default, Deserialize, Serialize)]
//! struct Counter(usize);
//!
//! async fn handler(session: Session) -> impl IntoResponse {
//!     let counter: Counter = session.get(COUNTER_KEY).await.unwrap().unwrap_or_default();
//!     session.insert(COUNTER_KEY, counter.0 + 1).await.unwrap();
//!     format!("Current count: {}", counter.0)
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // A single 64 byte hash key; pass a second key to also encrypt.
//!     let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
//!     let session_store = CookieStore::new(codecs).with_options(
//!         Options::default()
//!             .with_secure(false)
//!             .with_expiry(Expiry::OnInactivity(Duration::seconds(10))),
//!     );
//!     let session_layer = SessionManagerLayer::new(session_store);
//!
//!     let app = Router::new().route("/", get(handler)).layer(session_layer);
//!
//!     let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
//!     let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
//!     axum::serve(listener, app.into_make_service())
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Session expiry management
//!
//! Stores whose backends lack automatic expiry implement [`ExpiredDeletion`].
//! With the `deletion-task` feature enabled, `continuously_delete_expired`
//! can be spawned as a recurring task.
//!
//! ```rust,ignore
//! # use tower_sealed_sessions::{Codecs, ExpiredDeletion, MongoDBBackend, MongoDBStore, mongodb::Client};
//! # tokio_test::block_on(async {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await.unwrap();
//! let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
//! let session_store = MongoDBStore::new(MongoDBBackend::new(client, "app".to_string()), codecs);
//! let deletion_task = tokio::task::spawn(
//!     session_store
//!         .clone()
//!         .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
//! );
//! deletion_task.await.unwrap().unwrap();
//! # });
//! ```
//!
//! Note that when using browser session expiration, server-side records are
//! considered expired after two weeks.
//!
//! # Extractor pattern
//!
//! When using `axum`, the [`Session`] will already function as an extractor.
//! It's possible to build further on this to create extractors of custom types.
//! ```rust,no_run
//! # use async_trait::async_trait;
//! # use axum::extract::FromRequestParts;
//! # use http::request::Parts;
//! # use serde::{Deserialize, Serialize};
//! # use tower_sealed_sessions::Session;
//! const COUNTER_KEY: &str = "counter";
//!
//! #[derive(Default, Deserialize, Serialize)]
//! struct Counter(usize);
//!
//! #[async_trait]
//! impl<S> FromRequestParts<S> for Counter
//! where
//!     S: Send + Sync,
//! {
//!     type Rejection = (http::StatusCode, &'static str);
//!
//!     async fn from_request_parts(req: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
//!         let session = Session::from_request_parts(req, state).await?;
//!         let counter: Counter = session.get(COUNTER_KEY).await.unwrap().unwrap_or_default();
//!         session.insert(COUNTER_KEY, counter.0 + 1).await.unwrap();
//!
//!         Ok(counter)
//!     }
//! }
//! ```
//!
//! A strongly-typed variant of this pattern can be found in
//! `demos/strongly-typed.rs`.
//!
//! # Implementation
//!
//! ## Session
//!
//! A [`Session`] is handed to each request by the middleware. Nothing is read
//! until a handler first touches it; at that point the store loads the
//! session from the request's cookies. Values live in a JSON map behind a
//! `Mutex` that is only held while reading from or writing to it.
//!
//! Any mutation marks the session as written. Only written sessions are
//! saved once the inner service has produced its response, and only then is
//! a `Set-Cookie` header added.
//!
//! ## Session store
//!
//! `CookieStore` seals the whole value map into the cookie. A
//! [`BackendStore`] instead seals only the session [`Id`] and keeps the value
//! map, its last modification time and its expiry in a [`Backend`]. A
//! cookie that fails to decode, or names a record the backend doesn't have,
//! yields a fresh session; ids chosen by the client are never adopted.
//!
//! Flushed sessions are removed from the backend and a removal cookie is
//! sent to the user agent.
#![warn(
    clippy::all,
    nonstandard_style,
    future_incompatible,
    missing_debug_implementations
)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use tower_cookies::cookie;
pub use tower_sealed_sessions_core::{backend, codec, session, session_store};
#[doc(inline)]
pub use tower_sealed_sessions_core::{
    backend::{Backend, BackendStore},
    codec::{Codecs, SecureCookie},
    cookie_controller::{CookieController, PlaintextCookie},
    expires::Expiry,
    id::Id,
    options::Options,
    session::{Session, SessionData},
    session_store::{ExpiredDeletion, SessionStore},
};
#[cfg(feature = "cookie-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "cookie-store")))]
#[doc(inline)]
pub use tower_sealed_sessions_cookie_store::CookieStore;
#[cfg(feature = "dal-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "dal-store")))]
#[doc(inline)]
pub use tower_sealed_sessions_dal_store::{
    Collection, Connection, DalBackend, DalStore, Document, Index, MemoryCollection,
    MemoryConnection,
};
#[cfg(feature = "dynamodb-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "dynamodb-store")))]
#[doc(inline)]
pub use tower_sealed_sessions_dynamodb_store::{
    aws_config, aws_sdk_dynamodb, DynamoDBBackend, DynamoDBStore, DynamoDBStoreKey,
    DynamoDBStoreProps,
};
#[cfg(feature = "mongodb-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "mongodb-store")))]
#[doc(inline)]
pub use tower_sealed_sessions_mongodb_store::{mongodb, MongoDBBackend, MongoDBStore};
#[cfg(feature = "redis-store")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis-store")))]
#[doc(inline)]
pub use tower_sealed_sessions_redis_store::{fred, RedisBackend, RedisStore};

pub use crate::service::{SessionManager, SessionManagerLayer};

pub mod service;
