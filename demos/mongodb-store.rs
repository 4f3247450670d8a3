use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Router};
use serde::{Deserialize, Serialize};
use time::Duration;
use tower_sealed_sessions::{
    mongodb::Client, Codecs, ExpiredDeletion, Expiry, MongoDBBackend, MongoDBStore, Options,
    Session, SessionManagerLayer,
};

const COUNTER_KEY: &str = "counter";

// Use a randomly generated key, kept secret, outside of demos.
const SESSION_KEY: [u8; 64] = [42; 64];

#[derive(Serialize, Deserialize, Default)]
struct Counter(usize);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let database_url = std::option_env!("DATABASE_URL").ok_or("Missing DATABASE_URL.")?;
    let client = Client::with_uri_str(database_url).await?;

    let max_age = Duration::seconds(10);
    let backend = MongoDBBackend::new(client, "tower-sealed-sessions".to_string());
    backend.ensure_ttl(max_age).await?;

    let session_store = MongoDBStore::new(backend, Codecs::from_key_pairs(&[SESSION_KEY])?)
        .with_options(
            Options::default()
                .with_secure(false)
                .with_expiry(Expiry::OnInactivity(max_age)),
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
