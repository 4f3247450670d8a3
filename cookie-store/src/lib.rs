use async_trait::async_trait;
use tower_cookies::Cookies;
use tower_sealed_sessions_core::{
    session::{Data, SessionData, Status},
    session_store, Codecs, CookieController, Expiry, Options, PlaintextCookie, SessionStore,
};

/// A session store keeping all values in the cookie itself.
///
/// Values are serialized and sealed with [`Codecs`], so nothing is kept on the
/// server. Sessions are bounded by the codecs' maximum length, 4096 bytes by
/// default.
#[derive(Clone, Debug)]
pub struct CookieStore<C = PlaintextCookie> {
    configured: Codecs,
    codecs: Codecs,
    options: Options,
    controller: C,
}

impl CookieStore {
    /// Create a new cookie store sealing values with `codecs`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tower_sealed_sessions_cookie_store::CookieStore;
    /// use tower_sealed_sessions_core::Codecs;
    ///
    /// let codecs = Codecs::from_key_pairs(&[[7u8; 32], [9u8; 32]]).unwrap();
    /// let session_store = CookieStore::new(codecs);
    /// ```
    pub fn new(codecs: Codecs) -> Self {
        Self {
            configured: codecs.clone(),
            codecs,
            options: Options::default(),
            controller: PlaintextCookie,
        }
    }
}

impl<C: CookieController> CookieStore<C> {
    /// Sets the cookie options.
    ///
    /// An inactivity expiry also becomes the codecs' maximum age, so a
    /// cookie the browser kept past its `Max-Age` still fails to decode.
    /// Other expiries keep the maximum age the codecs were created with.
    pub fn with_options(mut self, options: Options) -> Self {
        self.codecs = match options.expiry {
            Expiry::OnInactivity(max_age) => self.configured.clone().with_max_age(Some(max_age)),
            Expiry::OnSessionEnd | Expiry::AtDateTime(_) => self.configured.clone(),
        };
        self.options = options;
        self
    }

    /// Carries the sealed payload through `controller` instead of the plain
    /// cookie jar.
    pub fn with_cookie_controller<D: CookieController>(self, controller: D) -> CookieStore<D> {
        CookieStore {
            configured: self.configured,
            codecs: self.codecs,
            options: self.options,
            controller,
        }
    }
}

#[async_trait]
impl<C: CookieController> SessionStore for CookieStore<C> {
    async fn load(&self, cookies: &Cookies, name: &str) -> session_store::Result<SessionData> {
        let Some(token) = self.controller.get(cookies, name) else {
            return Ok(SessionData::new(self.options.clone()));
        };

        match self.codecs.decode::<Data>(name, &token) {
            Ok(values) => Ok(SessionData::loaded(None, values, self.options.clone())),
            Err(err) => {
                tracing::warn!(err = %err, "possibly suspicious activity: invalid session cookie");
                Ok(SessionData::new(self.options.clone()))
            }
        }
    }

    async fn save(
        &self,
        cookies: &Cookies,
        name: &str,
        data: &mut SessionData,
    ) -> session_store::Result<()> {
        if data.status == Status::Deleted {
            tracing::debug!("removing session cookie");
            self.controller
                .set(cookies, data.options.removal_cookie(name));
            data.values.clear();
            data.status = Status::New;
            return Ok(());
        }

        let token = self.codecs.encode(name, &data.values)?;
        self.controller
            .set(cookies, data.options.build_cookie(name, token));
        data.status = Status::Loaded;

        Ok(())
    }
}
