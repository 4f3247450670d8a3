use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Router};
use serde::{Deserialize, Serialize};
use time::Duration;
use tower_sealed_sessions::{
    aws_config,
    aws_sdk_dynamodb::{
        self,
        types::{
            AttributeDefinition, KeySchemaElement, KeyType, ProvisionedThroughput,
            ScalarAttributeType,
        },
    },
    Codecs, DynamoDBBackend, DynamoDBStore, DynamoDBStoreKey, DynamoDBStoreProps, ExpiredDeletion,
    Expiry, Options, Session, SessionManagerLayer,
};

const COUNTER_KEY: &str = "counter";

// Use a randomly generated key, kept secret, outside of demos.
const SESSION_KEY: [u8; 64] = [42; 64];

#[derive(Serialize, Deserialize, Default)]
struct Counter(usize);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Credentials are unused by DynamoDB local but required by `aws_config`.
    // See: https://docs.aws.amazon.com/sdk-for-rust/latest/dg/dynamodb-local.html
    std::env::set_var("AWS_REGION", "us-east-1");
    std::env::set_var("AWS_ACCESS_KEY_ID", "AKIDLOCALSTACK");
    std::env::set_var("AWS_SECRET_ACCESS_KEY", "localstacksecret");

    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region("us-east-1")
        .load()
        .await;

    let dynamodb_local_config = aws_sdk_dynamodb::config::Builder::from(&config)
        .endpoint_url("http://localhost:8000")
        .build();

    let client = aws_sdk_dynamodb::Client::from_conf(dynamodb_local_config);

    let props = DynamoDBStoreProps {
        table_name: "TowerSealedSessions".to_string(),
        sort_key: Some(DynamoDBStoreKey {
            name: "sort_key".to_string(),
            prefix: Some("TOWER_SEALED_SESSIONS::".to_string()),
            suffix: None,
        }),
        ..Default::default()
    };

    let mut create_table_request = client
        .create_table()
        .table_name(&props.table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(&props.partition_key.name)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(&props.partition_key.name)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .provisioned_throughput(
            ProvisionedThroughput::builder()
                .read_capacity_units(10)
                .write_capacity_units(5)
                .build()?,
        );

    if let Some(sk) = &props.sort_key {
        create_table_request = create_table_request
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(&sk.name)
                    .attribute_type(ScalarAttributeType::S)
                    .build()?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(&sk.name)
                    .key_type(KeyType::Range)
                    .build()?,
            );
    }

    // The table may already exist.
    let _ = create_table_request.send().await;

    let backend = DynamoDBBackend::new(client, props);
    let session_store = DynamoDBStore::new(backend, Codecs::from_key_pairs(&[SESSION_KEY])?)
        .with_options(
            Options::default()
                .with_secure(false)
                .with_expiry(Expiry::OnInactivity(Duration::seconds(10))),
        );

    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );

    let app = Router::new()
        .route("/", get(handler))
        .layer(SessionManagerLayer::new(session_store));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    deletion_task.await??;

    Ok(())
}

async fn handler(session: Session) -> impl IntoResponse {
    let counter: Counter = session.get(COUNTER_KEY).await.unwrap().unwrap_or_default();
    session.insert(COUNTER_KEY, counter.0 + 1).await.unwrap();
    format!("Current count: {}", counter.0)
}
