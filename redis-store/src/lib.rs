use std::borrow::Cow;

use async_trait::async_trait;
pub use fred;
use fred::{
    prelude::{KeysInterface, RedisClient},
    types::Expiration,
};
use tower_sealed_sessions_core::{
    backend::{Backend, BackendStore},
    session::Record,
    session_store, Id,
};

/// An error type for `RedisBackend`.
#[derive(thiserror::Error, Debug)]
pub enum RedisStoreError {
    /// A variant to map to `fred::error::RedisError` errors.
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::RedisError),
}

impl From<RedisStoreError> for session_store::Error {
    fn from(err: RedisStoreError) -> Self {
        match err {
            RedisStoreError::Redis(inner) => session_store::Error::Backend(inner.to_string()),
        }
    }
}

/// Default prefix of session keys.
pub const DEFAULT_KEY_PREFIX: &str = "session_";

/// A Redis session store.
pub type RedisStore = BackendStore<RedisBackend>;

/// Session records kept as Redis strings that expire on their own.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    client: RedisClient,
    key_prefix: Cow<'static, str>,
}

impl RedisBackend {
    /// Create a new Redis backend with the provided client.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use fred::prelude::*;
    /// use tower_sealed_sessions::{Codecs, RedisBackend, RedisStore};
    ///
    /// # tokio_test::block_on(async {
    /// let client = RedisClient::default();
    ///
    /// let _ = client.connect();
    /// client.wait_for_connect().await.unwrap();
    ///
    /// let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
    /// let session_store = RedisStore::new(RedisBackend::new(client), codecs);
    /// })
    /// ```
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            key_prefix: DEFAULT_KEY_PREFIX.into(),
        }
    }

    /// Sets the prefix prepended to session ids to form keys.
    pub fn with_key_prefix<P: Into<Cow<'static, str>>>(mut self, key_prefix: P) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    fn key(&self, id: &Id) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

#[async_trait]
impl Backend for RedisBackend {
    async fn find(&self, id: &Id) -> session_store::Result<Option<String>> {
        let data = self
            .client
            .get::<Option<String>, _>(self.key(id))
            .await
            .map_err(RedisStoreError::Redis)?;

        Ok(data)
    }

    async fn upsert(&self, record: &Record) -> session_store::Result<()> {
        let expire = Some(Expiration::EXAT(record.expiry_date.unix_timestamp()));

        self.client
            .set::<(), _, _>(
                self.key(&record.id),
                record.data.as_str(),
                expire,
                None,
                false,
            )
            .await
            .map_err(RedisStoreError::Redis)?;

        Ok(())
    }

    async fn remove(&self, id: &Id) -> session_store::Result<()> {
        self.client
            .del::<(), _>(self.key(id))
            .await
            .map_err(RedisStoreError::Redis)?;

        Ok(())
    }
}
