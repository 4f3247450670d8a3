use async_trait::async_trait;
use bson::doc;
pub use mongodb;
use mongodb::{
    options::{IndexOptions, UpdateOptions},
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use time::Duration;
use tower_sealed_sessions_core::{
    backend::{Backend, BackendStore},
    session::Record,
    session_store, ExpiredDeletion, Id,
};

/// An error type for `MongoDBBackend`.
#[derive(thiserror::Error, Debug)]
pub enum MongoDBStoreError {
    /// A variant to map to `mongodb::error::Error` errors.
    #[error(transparent)]
    MongoDB(#[from] mongodb::error::Error),

    /// A TTL index was requested with a negative maximum age.
    #[error("negative ttl: {0}")]
    NegativeTtl(Duration),
}

impl From<MongoDBStoreError> for session_store::Error {
    fn from(err: MongoDBStoreError) -> Self {
        match err {
            MongoDBStoreError::MongoDB(inner) => session_store::Error::Backend(inner.to_string()),
            err @ MongoDBStoreError::NegativeTtl(_) => {
                session_store::Error::Backend(err.to_string())
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct MongoDBSessionRecord {
    data: String,
    modified: bson::DateTime,

    #[serde(rename = "expireAt")]
    expiry_date: bson::DateTime,
}

/// A MongoDB session store.
pub type MongoDBStore = BackendStore<MongoDBBackend>;

/// Session records kept in a MongoDB collection.
///
/// Each session is one document:
///
/// ```text
/// { _id: <session id>, data: <sealed values>, modified: <date>, expireAt: <date> }
/// ```
#[derive(Clone, Debug)]
pub struct MongoDBBackend {
    collection: Collection<MongoDBSessionRecord>,
}

impl MongoDBBackend {
    /// Create a new backend over the `sessions` collection of `database`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use tower_sealed_sessions::{mongodb::Client, Codecs, MongoDBBackend, MongoDBStore};
    ///
    /// # tokio_test::block_on(async {
    /// let database_url = std::option_env!("DATABASE_URL").unwrap();
    /// let client = Client::with_uri_str(database_url).await.unwrap();
    /// let backend = MongoDBBackend::new(client, "database".to_string());
    /// let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
    /// let session_store = MongoDBStore::new(backend, codecs);
    /// # })
    /// ```
    pub fn new(client: Client, database: String) -> Self {
        Self::with_collection(client, database, "sessions".to_string())
    }

    /// Create a new backend over `collection` of `database`.
    pub fn with_collection(client: Client, database: String, collection: String) -> Self {
        Self {
            collection: client.database(&database).collection(&collection),
        }
    }

    /// Creates a TTL index on `modified`, letting MongoDB drop sessions idle
    /// for longer than `max_age`.
    ///
    /// A negative `max_age` is rejected rather than creating an index that
    /// would purge every session.
    pub async fn ensure_ttl(&self, max_age: Duration) -> Result<(), MongoDBStoreError> {
        let options = IndexOptions::builder()
            .background(true)
            .sparse(true)
            .expire_after(ttl(max_age)?)
            .build();
        let index = IndexModel::builder()
            .keys(doc! { "modified": 1 })
            .options(options)
            .build();

        tracing::debug!(max_age = %max_age, "ensuring session ttl index");
        self.collection.create_index(index, None).await?;

        Ok(())
    }
}

fn ttl(max_age: Duration) -> Result<std::time::Duration, MongoDBStoreError> {
    std::time::Duration::try_from(max_age).map_err(|_| MongoDBStoreError::NegativeTtl(max_age))
}

#[async_trait]
impl ExpiredDeletion for MongoDBBackend {
    async fn delete_expired(&self) -> session_store::Result<()> {
        self.collection
            .delete_many(doc! { "expireAt": {"$lt": bson::DateTime::now()} }, None)
            .await
            .map_err(MongoDBStoreError::MongoDB)?;

        Ok(())
    }
}

#[async_trait]
impl Backend for MongoDBBackend {
    async fn find(&self, id: &Id) -> session_store::Result<Option<String>> {
        let doc = self
            .collection
            .find_one(
                doc! {
                    "_id": id.to_string(),
                    "expireAt": {"$gt": bson::DateTime::now()}
                },
                None,
            )
            .await
            .map_err(MongoDBStoreError::MongoDB)?;

        Ok(doc.map(|doc| doc.data))
    }

    async fn upsert(&self, record: &Record) -> session_store::Result<()> {
        self.collection
            .update_one(
                doc! { "_id": record.id.to_string() },
                doc! {
                    "$set": {
                        "data": record.data.as_str(),
                        "modified": bson::DateTime::from(record.modified),
                        "expireAt": bson::DateTime::from(record.expiry_date),
                    }
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(MongoDBStoreError::MongoDB)?;

        Ok(())
    }

    async fn remove(&self, id: &Id) -> session_store::Result<()> {
        self.collection
            .delete_one(doc! { "_id": id.to_string() }, None)
            .await
            .map_err(MongoDBStoreError::MongoDB)?;

        Ok(())
    }
}
