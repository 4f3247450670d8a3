//! Sessions kept behind a pluggable data access layer.
//!
//! Any document database that can find, upsert and remove documents by id can
//! hold sessions: implement [`Connection`] and [`Collection`] for it and hand
//! the connection to a [`DalBackend`]. [`MemoryConnection`] is an in-process
//! implementation for tests and development.
use std::{error::Error as StdError, fmt::Debug};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tower_sealed_sessions_core::{
    backend::{Backend, BackendStore},
    session::Record,
    session_store, ExpiredDeletion, Id,
};

pub use self::memory::{MemoryCollection, MemoryConnection, MemoryError};

mod memory;

/// One stored session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub data: String,
    pub modified: OffsetDateTime,
    pub expiry_date: OffsetDateTime,
}

impl From<&Record> for Document {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.to_string(),
            data: record.data.clone(),
            modified: record.modified,
            expiry_date: record.expiry_date,
        }
    }
}

/// An index over document fields.
///
/// With `expire_after` set, documents whose first key field is older than
/// the given duration are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    pub key: Vec<String>,
    pub background: bool,
    pub sparse: bool,
    pub expire_after: Option<Duration>,
}

/// A connection handing out collections.
pub trait Connection: Clone + Debug + Send + Sync + 'static {
    type Collection: Collection;

    /// Returns `collection` of `database`.
    fn collection(&self, database: &str, collection: &str) -> Self::Collection;
}

/// A collection of documents addressed by id.
#[async_trait]
pub trait Collection: Debug + Send + Sync + 'static {
    type Error: StdError + Send + Sync + 'static;

    /// Returns the document stored under `id`, unless missing or expired.
    async fn find_id(&self, id: &str) -> Result<Option<Document>, Self::Error>;

    /// Creates or replaces the document stored under the document's id.
    async fn upsert_id(&self, document: Document) -> Result<(), Self::Error>;

    /// Removes the document stored under `id`, if any.
    async fn remove_id(&self, id: &str) -> Result<(), Self::Error>;

    async fn ensure_index(&self, index: Index) -> Result<(), Self::Error>;

    /// Removes every expired document.
    ///
    /// Collections that expire documents on their own can keep the default.
    async fn remove_expired(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn backend_error<E: StdError>(err: E) -> session_store::Error {
    session_store::Error::Backend(err.to_string())
}

/// A dal session store.
pub type DalStore<C> = BackendStore<DalBackend<C>>;

/// Session records kept in one collection of a [`Connection`].
///
/// # Examples
///
/// ```rust
/// use tower_sealed_sessions_core::Codecs;
/// use tower_sealed_sessions_dal_store::{DalBackend, DalStore, MemoryConnection};
///
/// let backend = DalBackend::new(MemoryConnection::default(), "app", "sessions");
/// let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
/// let session_store = DalStore::new(backend, codecs);
/// ```
#[derive(Clone, Debug)]
pub struct DalBackend<C> {
    connection: C,
    database: String,
    collection: String,
}

impl<C: Connection> DalBackend<C> {
    pub fn new(connection: C, database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            connection,
            database: database.into(),
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> C::Collection {
        self.connection.collection(&self.database, &self.collection)
    }

    /// Creates a TTL index on `modified`, letting the collection drop sessions
    /// idle for longer than `max_age`.
    pub async fn ensure_ttl(
        &self,
        max_age: Duration,
    ) -> Result<(), <C::Collection as Collection>::Error> {
        tracing::debug!(max_age = %max_age, "ensuring session ttl index");
        self.collection()
            .ensure_index(Index {
                key: vec!["modified".to_string()],
                background: true,
                sparse: true,
                expire_after: Some(max_age),
            })
            .await
    }
}

#[async_trait]
impl<C: Connection> Backend for DalBackend<C> {
    async fn find(&self, id: &Id) -> session_store::Result<Option<String>> {
        let document = self
            .collection()
            .find_id(&id.to_string())
            .await
            .map_err(backend_error)?;

        Ok(document.map(|document| document.data))
    }

    async fn upsert(&self, record: &Record) -> session_store::Result<()> {
        self.collection()
            .upsert_id(record.into())
            .await
            .map_err(backend_error)
    }

    async fn remove(&self, id: &Id) -> session_store::Result<()> {
        self.collection()
            .remove_id(&id.to_string())
            .await
            .map_err(backend_error)
    }
}

#[async_trait]
impl<C: Connection> ExpiredDeletion for DalBackend<C> {
    async fn delete_expired(&self) -> session_store::Result<()> {
        self.collection()
            .remove_expired()
            .await
            .map_err(backend_error)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower_cookies::{Cookie, Cookies};
    use tower_sealed_sessions_core::{
        session::{Data, SessionData, Status},
        Codecs, Options, SessionStore,
    };

    use super::*;

    fn store(connection: MemoryConnection) -> DalStore<MemoryConnection> {
        let codecs = Codecs::from_key_pairs(&[&[1u8; 32][..], &[2u8; 16][..]]).unwrap();
        DalStore::new(DalBackend::new(connection, "app", "sessions"), codecs)
    }

    fn follow_up(cookies: &Cookies) -> Cookies {
        let next = Cookies::default();
        let cookie = cookies.get("id").unwrap();
        next.add(Cookie::new("id", cookie.value().to_string()));
        next
    }

    #[tokio::test]
    async fn round_trip() {
        let connection = MemoryConnection::default();
        let store = store(connection.clone());

        let cookies = Cookies::default();
        let mut data = store.load(&cookies, "id").await.unwrap();
        data.values.insert("foo".to_string(), json!("bar"));
        store.save(&cookies, "id", &mut data).await.unwrap();
        let id = data.id.unwrap();

        let collection = connection.collection("app", "sessions");
        assert_eq!(collection.len().await, 1);
        assert!(collection.find_id(&id.to_string()).await.unwrap().is_some());

        let loaded = store.load(&follow_up(&cookies), "id").await.unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.status, Status::Loaded);
        assert_eq!(loaded.values.get("foo"), Some(&json!("bar")));
    }

    #[tokio::test]
    async fn flushed_session_is_removed() {
        let connection = MemoryConnection::default();
        let store = store(connection.clone());

        let cookies = Cookies::default();
        let mut data = SessionData::new(Options::default());
        data.values.insert("foo".to_string(), json!(1));
        store.save(&cookies, "id", &mut data).await.unwrap();

        let cookies = follow_up(&cookies);
        let mut data = store.load(&cookies, "id").await.unwrap();
        data.values.clear();
        data.status = Status::Deleted;
        store.save(&cookies, "id", &mut data).await.unwrap();

        assert!(connection.collection("app", "sessions").is_empty().await);
        assert_eq!(cookies.get("id").unwrap().value(), "");
    }

    #[tokio::test]
    async fn stale_modified_is_dropped_by_ttl() {
        let connection = MemoryConnection::default();
        let backend = DalBackend::new(connection.clone(), "app", "sessions");
        backend.ensure_ttl(Duration::hours(1)).await.unwrap();
        let codecs = Codecs::from_key_pairs(&[[1u8; 32]]).unwrap();
        let store = DalStore::new(backend, codecs);

        let modified = OffsetDateTime::now_utc() - Duration::hours(2);
        let mut values = Data::new();
        values.insert(
            "modified".to_string(),
            json!(modified
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap()),
        );
        let cookies = Cookies::default();
        let mut data = SessionData::new(Options::default());
        data.values = values;
        store.save(&cookies, "id", &mut data).await.unwrap();

        let loaded = store.load(&follow_up(&cookies), "id").await.unwrap();
        assert!(loaded.is_new());
        assert!(loaded.id.is_none());
    }

    #[tokio::test]
    async fn delete_expired_purges_documents() {
        let connection = MemoryConnection::default();
        let collection = connection.collection("app", "sessions");
        let now = OffsetDateTime::now_utc();
        collection
            .upsert_id(Document {
                id: "expired".to_string(),
                data: String::new(),
                modified: now - Duration::days(2),
                expiry_date: now - Duration::days(1),
            })
            .await
            .unwrap();
        collection
            .upsert_id(Document {
                id: "active".to_string(),
                data: String::new(),
                modified: now,
                expiry_date: now + Duration::days(1),
            })
            .await
            .unwrap();

        store(connection).delete_expired().await.unwrap();

        assert_eq!(collection.len().await, 1);
        assert!(collection.find_id("active").await.unwrap().is_some());
    }
}
