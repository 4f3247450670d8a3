//! A middleware that provides [`Session`] as a request extension.
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::{Request, Response};
use tower_cookies::{CookieManager, Cookies};
use tower_layer::Layer;
use tower_service::Service;
use tracing::Instrument;

use crate::{Session, SessionStore};

/// Default name of the session cookie.
///
/// See: <https://cheatsheetseries.owasp.org/cheatsheets/Session_Management_Cheat_Sheet.html#session-id-name-fingerprinting>
pub const DEFAULT_NAME: &str = "id";

/// A middleware that provides [`Session`] as a request extension.
#[derive(Debug, Clone)]
pub struct SessionManager<S> {
    inner: S,
    session_store: Arc<dyn SessionStore>,
    name: Arc<str>,
}

impl<S> SessionManager<S> {
    /// Create a new [`SessionManager`].
    pub fn new(inner: S, session_store: impl SessionStore) -> Self {
        Self {
            inner,
            session_store: Arc::new(session_store),
            name: DEFAULT_NAME.into(),
        }
    }
}

impl<ReqBody, ResBody, S> Service<Request<ReqBody>> for SessionManager<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let span = tracing::debug_span!("session", name = %self.name);

        let session_store = self.session_store.clone();
        let name = self.name.clone();

        // Because the inner service can panic until ready, we need to ensure we only
        // use the ready service.
        //
        // See: https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let Some(cookies) = req.extensions().get::<Cookies>().cloned() else {
                    // In practice this should never happen because we wrap `CookieManager`
                    // directly.
                    tracing::error!("missing cookies request extension");
                    return Ok(Response::default());
                };

                let session = Session::new(name, session_store, cookies);

                req.extensions_mut().insert(session.clone());

                let res = inner.call(req).await?;

                let written = session.is_written();
                tracing::trace!(written = written, "session response state");

                if written {
                    tracing::debug!("saving session");
                    if let Err(err) = session.save().await {
                        tracing::error!(err = %err, "failed to save session");
                    }
                }

                Ok(res)
            }
            .instrument(span),
        )
    }
}

/// A layer for providing [`Session`] as a request extension.
#[derive(Debug, Clone)]
pub struct SessionManagerLayer {
    session_store: Arc<dyn SessionStore>,
    name: Arc<str>,
}

impl SessionManagerLayer {
    /// Create a new [`SessionManagerLayer`] with the provided session store.
    ///
    /// Cookie attributes and expiry are configured on the store.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tower_sealed_sessions::{Codecs, CookieStore, SessionManagerLayer};
    ///
    /// let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
    /// let session_store = CookieStore::new(codecs);
    /// let session_service = SessionManagerLayer::new(session_store);
    /// ```
    pub fn new(session_store: impl SessionStore) -> Self {
        Self {
            session_store: Arc::new(session_store),
            name: DEFAULT_NAME.into(),
        }
    }

    /// Configures the name of the cookie used for the session.
    /// The default value is `"id"`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tower_sealed_sessions::{Codecs, CookieStore, SessionManagerLayer};
    ///
    /// let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
    /// let session_store = CookieStore::new(codecs);
    /// let session_service = SessionManagerLayer::new(session_store).with_name("my.sid");
    /// ```
    pub fn with_name<N: Into<Arc<str>>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }
}

impl<S> Layer<S> for SessionManagerLayer {
    type Service = CookieManager<SessionManager<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        let session_manager = SessionManager {
            inner,
            session_store: self.session_store.clone(),
            name: self.name.clone(),
        };

        CookieManager::new(session_manager)
    }
}
