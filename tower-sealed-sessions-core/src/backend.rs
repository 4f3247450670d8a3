//! Server-side stores built from an id-addressed backend.
//!
//! A [`Backend`] only knows how to find, upsert and remove encoded records by
//! id. [`BackendStore`] supplies everything else a [`SessionStore`] needs:
//! reading the token from the cookie, authenticating it with [`Codecs`],
//! encoding values, and writing the cookie back.
use std::fmt::Debug;

use async_trait::async_trait;
use tower_cookies::Cookies;

use crate::{
    cookie_controller::{CookieController, PlaintextCookie},
    session::{Data, Record, SessionData, Status},
    session_store::{self, ExpiredDeletion},
    Codecs, Id, Options, SessionStore,
};

/// The persistence half of a server-side store.
#[async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// Returns the encoded values stored under `id`, unless missing or
    /// expired.
    async fn find(&self, id: &Id) -> session_store::Result<Option<String>>;

    /// Creates or replaces the record with the record's id.
    async fn upsert(&self, record: &Record) -> session_store::Result<()>;

    /// Removes the record stored under `id`, if any.
    async fn remove(&self, id: &Id) -> session_store::Result<()>;
}

/// A [`SessionStore`] keeping values in a [`Backend`] and only the session id
/// in the cookie.
///
/// # Examples
///
/// ```rust,ignore
/// use tower_sealed_sessions_core::{backend::BackendStore, Codecs};
///
/// let codecs = Codecs::from_key_pairs(&[hash_key, block_key])?;
/// let session_store = BackendStore::new(backend, codecs);
/// ```
#[derive(Clone, Debug)]
pub struct BackendStore<B, C = PlaintextCookie> {
    backend: B,
    codecs: Codecs,
    options: Options,
    controller: C,
}

impl<B: Backend> BackendStore<B> {
    /// Create a new store over `backend`, sealing session ids with `codecs`.
    pub fn new(backend: B, codecs: Codecs) -> Self {
        Self {
            backend,
            codecs,
            options: Options::default(),
            controller: PlaintextCookie,
        }
    }
}

impl<B: Backend, C: CookieController> BackendStore<B, C> {
    /// Sets the cookie options and expiry of new sessions.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Carries the session token through `controller` instead of the plain
    /// cookie jar.
    pub fn with_cookie_controller<D: CookieController>(self, controller: D) -> BackendStore<B, D> {
        BackendStore {
            backend: self.backend,
            codecs: self.codecs,
            options: self.options,
            controller,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    fn new_session(&self) -> SessionData {
        SessionData::new(self.options.clone())
    }

    fn load_id(&self, cookies: &Cookies, name: &str) -> Option<Id> {
        let token = self.controller.get(cookies, name)?;
        let id = match self.codecs.decode::<String>(name, &token) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(err = %err, "possibly suspicious activity: invalid session cookie");
                return None;
            }
        };

        match id.parse() {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(err = %err, "possibly suspicious activity: malformed session id");
                None
            }
        }
    }
}

#[async_trait]
impl<B: Backend, C: CookieController> SessionStore for BackendStore<B, C> {
    async fn load(&self, cookies: &Cookies, name: &str) -> session_store::Result<SessionData> {
        let Some(id) = self.load_id(cookies, name) else {
            return Ok(self.new_session());
        };

        let Some(encoded) = self.backend.find(&id).await? else {
            tracing::debug!("session not found");
            return Ok(self.new_session());
        };

        match self.codecs.decode::<Data>(name, &encoded) {
            Ok(values) => Ok(SessionData::loaded(
                Some(id),
                values,
                self.options.clone(),
            )),
            Err(err) => {
                tracing::warn!(err = %err, "discarding undecodable session record");
                Ok(self.new_session())
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
            if let Some(id) = data.id.take() {
                tracing::debug!("deleting session");
                self.backend.remove(&id).await?;
            }
            self.controller
                .set(cookies, data.options.removal_cookie(name));
            data.status = Status::New;
            return Ok(());
        }

        let id = *data.id.get_or_insert_with(Id::default);
        let record = Record {
            id,
            data: self.codecs.encode(name, &data.values)?,
            modified: data.modified()?,
            expiry_date: data.options.expiry.expiry_date(),
        };

        tracing::debug!("saving session");
        self.backend.upsert(&record).await?;

        let token = self.codecs.encode(name, &id.to_string())?;
        self.controller
            .set(cookies, data.options.build_cookie(name, token));
        data.status = Status::Loaded;

        Ok(())
    }
}

#[async_trait]
impl<B, C> ExpiredDeletion for BackendStore<B, C>
where
    B: Backend + ExpiredDeletion,
    C: CookieController,
{
    async fn delete_expired(&self) -> session_store::Result<()> {
        self.backend.delete_expired().await
    }
}

#[cfg(test)]
mod tests {
    use mockall::{mock, predicate::eq};
    use serde_json::json;
    use tower_cookies::Cookie;

    use super::*;
    use crate::SecureCookie;

    mock! {
        #[derive(Debug)]
        pub Store {}

        #[async_trait]
        impl Backend for Store {
            async fn find(&self, id: &Id) -> session_store::Result<Option<String>>;
            async fn upsert(&self, record: &Record) -> session_store::Result<()>;
            async fn remove(&self, id: &Id) -> session_store::Result<()>;
        }
    }

    fn codecs() -> Codecs {
        Codecs::new(SecureCookie::new(&[7u8; 32], Some(&[9u8; 32][..])).unwrap())
    }

    fn store(backend: MockStore) -> BackendStore<MockStore> {
        BackendStore::new(backend, codecs())
    }

    fn cookies_with(name: &str, value: String) -> Cookies {
        let cookies = Cookies::default();
        cookies.add(Cookie::new(name.to_string(), value));
        cookies
    }

    #[tokio::test]
    async fn missing_cookie_is_new_session() {
        let mut backend = MockStore::new();
        backend.expect_find().never();

        let data = store(backend)
            .load(&Cookies::default(), "id")
            .await
            .unwrap();
        assert_eq!(data.status, Status::New);
        assert!(data.id.is_none());
    }

    #[tokio::test]
    async fn forged_cookie_is_new_session() {
        let mut backend = MockStore::new();
        backend.expect_find().never();

        let id = Id::default();
        let cookies = cookies_with("id", id.to_string());
        let data = store(backend).load(&cookies, "id").await.unwrap();
        assert!(data.is_new());
        assert!(data.id.is_none());
    }

    #[tokio::test]
    async fn unknown_id_is_not_adopted() {
        let id = Id::default();
        let mut backend = MockStore::new();
        backend
            .expect_find()
            .with(eq(id))
            .times(1)
            .returning(|_| Ok(None));

        let token = codecs().encode("id", &id.to_string()).unwrap();
        let data = store(backend)
            .load(&cookies_with("id", token), "id")
            .await
            .unwrap();
        assert!(data.is_new());
        assert!(data.id.is_none());
    }

    #[tokio::test]
    async fn loads_existing_session() {
        let id = Id::default();
        let encoded = codecs()
            .encode("id", &Data::from([("foo".to_string(), json!("bar"))]))
            .unwrap();
        let mut backend = MockStore::new();
        backend
            .expect_find()
            .with(eq(id))
            .times(1)
            .returning(move |_| Ok(Some(encoded.clone())));

        let token = codecs().encode("id", &id.to_string()).unwrap();
        let data = store(backend)
            .load(&cookies_with("id", token), "id")
            .await
            .unwrap();
        assert_eq!(data.status, Status::Loaded);
        assert_eq!(data.id, Some(id));
        assert_eq!(data.values.get("foo"), Some(&json!("bar")));
    }

    #[tokio::test]
    async fn backend_errors_propagate() {
        let id = Id::default();
        let mut backend = MockStore::new();
        backend
            .expect_find()
            .returning(|_| Err(session_store::Error::Backend("unreachable".into())));

        let token = codecs().encode("id", &id.to_string()).unwrap();
        let err = store(backend)
            .load(&cookies_with("id", token), "id")
            .await
            .unwrap_err();
        assert!(matches!(err, session_store::Error::Backend(_)));
    }

    #[tokio::test]
    async fn save_assigns_id_and_sets_cookie() {
        let mut backend = MockStore::new();
        backend.expect_upsert().times(1).returning(|record| {
            let values: Data = codecs().decode("id", &record.data).unwrap();
            assert_eq!(values.get("foo"), Some(&json!(1)));
            assert!(record.expiry_date > record.modified);
            Ok(())
        });

        let cookies = Cookies::default();
        let mut data = SessionData::new(Options::default());
        data.values.insert("foo".to_string(), json!(1));
        store(backend)
            .save(&cookies, "id", &mut data)
            .await
            .unwrap();

        let id = data.id.unwrap();
        assert_eq!(data.status, Status::Loaded);

        let cookie = cookies.get("id").unwrap();
        let decoded: String = codecs().decode("id", cookie.value()).unwrap();
        assert_eq!(decoded, id.to_string());
    }

    #[tokio::test]
    async fn save_rejects_invalid_modified() {
        let mut backend = MockStore::new();
        backend.expect_upsert().never();

        let mut data = SessionData::new(Options::default());
        data.values.insert("modified".to_string(), json!(true));
        let err = store(backend)
            .save(&Cookies::default(), "id", &mut data)
            .await
            .unwrap_err();
        assert!(matches!(err, session_store::Error::InvalidModified));
    }

    #[tokio::test]
    async fn save_deleted_removes_record() {
        let id = Id::default();
        let mut backend = MockStore::new();
        backend
            .expect_remove()
            .with(eq(id))
            .times(1)
            .returning(|_| Ok(()));
        backend.expect_upsert().never();

        let cookies = Cookies::default();
        let mut data = SessionData::loaded(Some(id), Data::new(), Options::default());
        data.status = Status::Deleted;
        store(backend)
            .save(&cookies, "id", &mut data)
            .await
            .unwrap();

        assert!(data.id.is_none());
        assert_eq!(data.status, Status::New);
        let cookie = cookies.get("id").unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
