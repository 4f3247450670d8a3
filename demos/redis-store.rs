use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Router};
use serde::{Deserialize, Serialize};
use time::Duration;
use tower_sealed_sessions::{
    fred::prelude::*, Codecs, Expiry, Options, RedisBackend, RedisStore, Session,
    SessionManagerLayer,
};

const COUNTER_KEY: &str = "counter";

// Use a randomly generated key, kept secret, outside of demos.
const SESSION_KEY: [u8; 64] = [42; 64];

#[derive(Serialize, Deserialize, Default)]
struct Counter(usize);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let client = RedisClient::default();

    let redis_conn = client.connect();
    client.wait_for_connect().await?;

    let backend = RedisBackend::new(client).with_key_prefix("demo_session_");
    let session_store = RedisStore::new(backend, Codecs::from_key_pairs(&[SESSION_KEY])?)
        .with_options(
            Options::default()
                .with_secure(false)
                .with_expiry(Expiry::OnInactivity(Duration::days(10))),
        );

    let app = Router::new()
        .route("/insert", get(insert_handler))
        .route("/get", get(get_handler))
        .layer(SessionManagerLayer::new(session_store));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    redis_conn.await??;

    Ok(())
}

async fn insert_handler(session: Session) -> impl IntoResponse {
    let counter: Counter = session.get(COUNTER_KEY).await.unwrap().unwrap_or_default();
    session.insert(COUNTER_KEY, counter.0 + 1).await.unwrap();
    format!("Current count: {}", counter.0)
}

async fn get_handler(session: Session) -> impl IntoResponse {
    let counter: Counter = session.get(COUNTER_KEY).await.unwrap().unwrap_or_default();
    format!("Current count: {}", counter.0)
}
