use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::{Collection, Connection, Document, Index};

/// Errors raised by the in-memory collections.
#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    /// The index named no key, or a key that is not a document field.
    #[error("invalid index key: {0:?}")]
    InvalidIndex(Vec<String>),
}

#[derive(Debug, Default)]
struct State {
    documents: HashMap<String, Document>,
    ttl: Vec<(Field, Duration)>,
}

#[derive(Clone, Copy, Debug)]
enum Field {
    Modified,
    ExpiryDate,
}

impl Field {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "modified" => Some(Self::Modified),
            "expiry_date" | "expireAt" => Some(Self::ExpiryDate),
            _ => None,
        }
    }

    fn get(self, document: &Document) -> OffsetDateTime {
        match self {
            Self::Modified => document.modified,
            Self::ExpiryDate => document.expiry_date,
        }
    }
}

impl State {
    fn is_active(&self, document: &Document, now: OffsetDateTime) -> bool {
        document.expiry_date > now
            && self
                .ttl
                .iter()
                .all(|(field, expire_after)| field.get(document) + *expire_after > now)
    }
}

/// A collection that lives only in memory.
///
/// This is useful for testing but not recommended for real applications.
#[derive(Clone, Debug, Default)]
pub struct MemoryCollection(Arc<Mutex<State>>);

impl MemoryCollection {
    /// Number of documents held, expired ones included.
    pub async fn len(&self) -> usize {
        self.0.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.lock().await.documents.is_empty()
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    type Error = MemoryError;

    async fn find_id(&self, id: &str) -> Result<Option<Document>, Self::Error> {
        let mut state = self.0.lock().await;
        let Some(document) = state.documents.get(id) else {
            return Ok(None);
        };

        if state.is_active(document, OffsetDateTime::now_utc()) {
            return Ok(Some(document.clone()));
        }

        state.documents.remove(id);
        Ok(None)
    }

    async fn upsert_id(&self, document: Document) -> Result<(), Self::Error> {
        self.0
            .lock()
            .await
            .documents
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn remove_id(&self, id: &str) -> Result<(), Self::Error> {
        self.0.lock().await.documents.remove(id);
        Ok(())
    }

    async fn ensure_index(&self, index: Index) -> Result<(), Self::Error> {
        let field = index.key.first().map(|key| Field::parse(key));
        match (field, index.expire_after) {
            (Some(Some(field)), Some(expire_after)) => {
                self.0.lock().await.ttl.push((field, expire_after));
                Ok(())
            }
            // Plain indexes don't change lookups by id.
            (Some(_), None) => Ok(()),
            _ => Err(MemoryError::InvalidIndex(index.key)),
        }
    }

    async fn remove_expired(&self) -> Result<(), Self::Error> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.0.lock().await;
        let expired = state
            .documents
            .values()
            .filter(|document| !state.is_active(document, now))
            .map(|document| document.id.clone())
            .collect::<Vec<_>>();

        tracing::debug!(count = expired.len(), "removing expired documents");
        for id in expired {
            state.documents.remove(&id);
        }

        Ok(())
    }
}

/// A connection to collections that live only in memory.
///
/// Clones share the same collections.
#[derive(Clone, Debug, Default)]
pub struct MemoryConnection(Arc<parking_lot::Mutex<HashMap<(String, String), MemoryCollection>>>);

impl Connection for MemoryConnection {
    type Collection = MemoryCollection;

    fn collection(&self, database: &str, collection: &str) -> Self::Collection {
        self.0
            .lock()
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, modified: OffsetDateTime, expiry_date: OffsetDateTime) -> Document {
        Document {
            id: id.to_string(),
            data: "data".to_string(),
            modified,
            expiry_date,
        }
    }

    #[tokio::test]
    async fn clones_share_collections() {
        let connection = MemoryConnection::default();
        let now = OffsetDateTime::now_utc();
        connection
            .clone()
            .collection("db", "sessions")
            .upsert_id(document("a", now, now + Duration::hours(1)))
            .await
            .unwrap();

        let found = connection
            .collection("db", "sessions")
            .find_id("a")
            .await
            .unwrap();
        assert_eq!(found.map(|document| document.data), Some("data".to_string()));
        assert!(connection.collection("db", "other").is_empty().await);
    }

    #[tokio::test]
    async fn expired_documents_are_not_found() {
        let collection = MemoryCollection::default();
        let now = OffsetDateTime::now_utc();
        collection
            .upsert_id(document("a", now, now - Duration::seconds(1)))
            .await
            .unwrap();

        assert!(collection.find_id("a").await.unwrap().is_none());
        assert!(collection.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_index_is_rejected() {
        let collection = MemoryCollection::default();
        let index = Index {
            key: vec!["data".to_string()],
            background: true,
            sparse: true,
            expire_after: Some(Duration::hours(1)),
        };
        assert!(matches!(
            collection.ensure_index(index).await,
            Err(MemoryError::InvalidIndex(_))
        ));

        let index = Index {
            key: Vec::new(),
            background: false,
            sparse: false,
            expire_after: None,
        };
        assert!(collection.ensure_index(index).await.is_err());
    }
}
