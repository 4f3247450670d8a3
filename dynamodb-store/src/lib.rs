use std::collections::HashMap;

use async_trait::async_trait;
pub use aws_config;
pub use aws_sdk_dynamodb;
use aws_sdk_dynamodb::{
    operation::{
        batch_write_item::BatchWriteItemError, delete_item::DeleteItemError,
        put_item::PutItemError, query::QueryError, scan::ScanError,
    },
    types::{AttributeValue, DeleteRequest, WriteRequest},
    Client,
};
use time::OffsetDateTime;
use tower_sealed_sessions_core::{
    backend::{Backend, BackendStore},
    session::Record,
    session_store, ExpiredDeletion, Id,
};

/// An error type for `DynamoDBBackend`.
#[derive(thiserror::Error, Debug)]
pub enum DynamoDBStoreError {
    /// A variant to map `aws_sdk_dynamodb::error::BuildError` errors.
    #[error("DynamoDb build error: {0}")]
    DynamoDbBuild(#[from] aws_sdk_dynamodb::error::BuildError),

    /// A variant to map `aws_sdk_dynamodb::error::SdkError<QueryError>` errors.
    #[error("DynamoDb query error: {0}")]
    DynamoDbQuery(#[from] aws_sdk_dynamodb::error::SdkError<QueryError>),

    /// A variant to map `aws_sdk_dynamodb::error::SdkError<PutItemError>` errors.
    #[error("DynamoDb PutItem error: {0}")]
    DynamoDbPutItem(#[from] aws_sdk_dynamodb::error::SdkError<PutItemError>),

    /// A variant to map `aws_sdk_dynamodb::error::SdkError<DeleteItemError>` errors.
    #[error("DynamoDb DeleteItem error: {0}")]
    DynamoDbDeleteItem(#[from] aws_sdk_dynamodb::error::SdkError<DeleteItemError>),

    /// A variant to map `aws_sdk_dynamodb::error::SdkError<BatchWriteItemError>` errors.
    #[error("DynamoDb batch write item error: {0}")]
    DynamoDbBatchWriteItem(#[from] aws_sdk_dynamodb::error::SdkError<BatchWriteItemError>),

    /// A variant to map `aws_sdk_dynamodb::error::SdkError<ScanError>` errors.
    #[error("DynamoDb scan error: {0}")]
    DynamoDbScan(#[from] aws_sdk_dynamodb::error::SdkError<ScanError>),
}

impl From<DynamoDBStoreError> for session_store::Error {
    fn from(err: DynamoDBStoreError) -> Self {
        session_store::Error::Backend(err.to_string())
    }
}

/// A key attribute and the affixes wrapped around session ids stored in it.
#[derive(Clone, Debug)]
pub struct DynamoDBStoreKey {
    pub name: String,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl DynamoDBStoreKey {
    fn value(&self, id: &Id) -> AttributeValue {
        AttributeValue::S(format!(
            "{}{}{}",
            self.prefix.as_deref().unwrap_or_default(),
            id,
            self.suffix.as_deref().unwrap_or_default()
        ))
    }
}

impl Default for DynamoDBStoreKey {
    fn default() -> Self {
        DynamoDBStoreKey {
            name: "session_id".to_string(),
            prefix: Some("SESSIONS::TOWER::".to_string()),
            suffix: None,
        }
    }
}

/// Table layout used by [`DynamoDBBackend`].
#[derive(Clone, Debug)]
pub struct DynamoDBStoreProps {
    pub table_name: String,
    pub partition_key: DynamoDBStoreKey,
    pub sort_key: Option<DynamoDBStoreKey>,
    pub expiry_name: String,
    pub data_name: String,
    pub modified_name: String,
}

impl Default for DynamoDBStoreProps {
    fn default() -> Self {
        Self {
            table_name: "tower-sealed-sessions".to_string(),
            partition_key: DynamoDBStoreKey::default(),
            sort_key: None,
            expiry_name: "expire_at".to_string(),
            data_name: "data".to_string(),
            modified_name: "modified".to_string(),
        }
    }
}

/// A DynamoDB session store.
pub type DynamoDBStore = BackendStore<DynamoDBBackend>;

/// Session records kept in a DynamoDB table.
///
/// Expiry is stored as a unix timestamp in seconds, suitable for the table's
/// [time to live](https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/TTL.html)
/// setting.
#[derive(Clone, Debug)]
pub struct DynamoDBBackend {
    client: Client,
    props: DynamoDBStoreProps,
}

impl DynamoDBBackend {
    /// Create a new DynamoDB backend with the provided client and table
    /// layout.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use tower_sealed_sessions::{
    ///     aws_config, aws_sdk_dynamodb, Codecs, DynamoDBBackend, DynamoDBStore, DynamoDBStoreProps,
    /// };
    ///
    /// # tokio_test::block_on(async {
    /// let config = aws_config::load_from_env().await;
    /// let client = aws_sdk_dynamodb::Client::new(&config);
    /// let backend = DynamoDBBackend::new(client, DynamoDBStoreProps::default());
    /// let codecs = Codecs::from_key_pairs(&[[7u8; 64]]).unwrap();
    /// let session_store = DynamoDBStore::new(backend, codecs);
    /// # })
    /// ```
    pub fn new(client: Client, props: DynamoDBStoreProps) -> Self {
        Self { client, props }
    }

    pub fn props(&self) -> &DynamoDBStoreProps {
        &self.props
    }

    fn key(&self, id: &Id) -> HashMap<String, AttributeValue> {
        let mut key = HashMap::from([(
            self.props.partition_key.name.clone(),
            self.props.partition_key.value(id),
        )]);
        if let Some(sk) = &self.props.sort_key {
            key.insert(sk.name.clone(), sk.value(id));
        }
        key
    }
}

#[async_trait]
impl ExpiredDeletion for DynamoDBBackend {
    // Scans are expensive; pair this with a TTL setting on the table so that
    // DynamoDB culls most expired sessions between runs.
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now_av = AttributeValue::N(OffsetDateTime::now_utc().unix_timestamp().to_string());

        let mut projection = "#pk";
        let mut attribute_names = HashMap::new();
        attribute_names.insert("#expire_at".to_string(), self.props.expiry_name.clone());
        attribute_names.insert("#pk".to_string(), self.props.partition_key.name.clone());
        if let Some(sk) = &self.props.sort_key {
            attribute_names.insert("#sk".to_string(), sk.name.clone());
            projection = "#pk, #sk";
        }

        let mut expired_sessions = self
            .client
            .scan()
            .table_name(&self.props.table_name)
            .set_expression_attribute_names(Some(attribute_names))
            .expression_attribute_values(":expire_at", now_av)
            .filter_expression("#expire_at < :expire_at")
            .projection_expression(projection)
            .into_paginator()
            .page_size(25)
            .items()
            .send();

        // BatchWriteItem accepts at most 25 requests.
        let mut batches: Vec<Vec<WriteRequest>> = Vec::new();
        let mut batch: Vec<WriteRequest> = Vec::with_capacity(25);
        while let Some(session) = expired_sessions.next().await {
            if batch.len() == 25 {
                batches.push(batch);
                batch = Vec::with_capacity(25);
            }
            let key = session.map_err(DynamoDBStoreError::from)?;
            let delete_request = DeleteRequest::builder()
                .set_key(Some(key))
                .build()
                .map_err(DynamoDBStoreError::from)?;
            batch.push(WriteRequest::builder().delete_request(delete_request).build());
        }
        if !batch.is_empty() {
            batches.push(batch);
        }

        for delete_batch in batches {
            tracing::debug!(count = delete_batch.len(), "deleting expired sessions");
            let mut unprocessed_count = delete_batch.len();
            let mut unprocessed = Some(HashMap::from([(
                self.props.table_name.clone(),
                delete_batch,
            )]));
            while unprocessed_count > 0 {
                let new_unprocessed_items = self
                    .client
                    .batch_write_item()
                    .set_request_items(unprocessed)
                    .send()
                    .await
                    .map_err(DynamoDBStoreError::from)?
                    .unprocessed_items;
                unprocessed_count = new_unprocessed_items
                    .as_ref()
                    .and_then(|items| items.get(&self.props.table_name))
                    .map(Vec::len)
                    .unwrap_or_default();
                unprocessed = new_unprocessed_items;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Backend for DynamoDBBackend {
    async fn find(&self, id: &Id) -> session_store::Result<Option<String>> {
        let now_sec = OffsetDateTime::now_utc().unix_timestamp();

        let mut attribute_names = HashMap::new();
        let mut attribute_values = HashMap::new();
        let mut key_condition = "#pk = :pk";

        attribute_names.insert("#expire_at".to_string(), self.props.expiry_name.clone());
        attribute_values.insert(
            ":expire_at".to_string(),
            AttributeValue::N(now_sec.to_string()),
        );

        attribute_names.insert("#pk".to_string(), self.props.partition_key.name.clone());
        attribute_values.insert(":pk".to_string(), self.props.partition_key.value(id));

        if let Some(sk) = &self.props.sort_key {
            attribute_names.insert("#sk".to_string(), sk.name.clone());
            attribute_values.insert(":sk".to_string(), sk.value(id));
            key_condition = "#pk = :pk AND #sk = :sk";
        }

        let data = self
            .client
            .query()
            .table_name(&self.props.table_name)
            .set_expression_attribute_names(Some(attribute_names))
            .set_expression_attribute_values(Some(attribute_values))
            .key_condition_expression(key_condition)
            .filter_expression("#expire_at > :expire_at")
            .send()
            .await
            .map_err(DynamoDBStoreError::from)?
            .items
            .and_then(|items| items.into_iter().next())
            .and_then(|mut item| match item.remove(&self.props.data_name) {
                Some(AttributeValue::S(data)) => Some(data),
                _ => None,
            });

        Ok(data)
    }

    async fn upsert(&self, record: &Record) -> session_store::Result<()> {
        let mut item = self.key(&record.id);
        item.insert(
            self.props.data_name.clone(),
            AttributeValue::S(record.data.clone()),
        );
        item.insert(
            self.props.modified_name.clone(),
            AttributeValue::N(record.modified.unix_timestamp().to_string()),
        );
        item.insert(
            self.props.expiry_name.clone(),
            AttributeValue::N(record.expiry_date.unix_timestamp().to_string()),
        );

        self.client
            .put_item()
            .table_name(&self.props.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(DynamoDBStoreError::from)?;

        Ok(())
    }

    async fn remove(&self, id: &Id) -> session_store::Result<()> {
        self.client
            .delete_item()
            .table_name(&self.props.table_name)
            .set_key(Some(self.key(id)))
            .send()
            .await
            .map_err(DynamoDBStoreError::from)?;

        Ok(())
    }
}
