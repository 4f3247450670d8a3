use std::net::SocketAddr;

use axum::{response::IntoResponse, routing::get, Router};
use serde::{Deserialize, Serialize};
use time::Duration;
use tower_sealed_sessions::{Codecs, CookieStore, Expiry, Options, Session, SessionManagerLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const COUNTER_KEY: &str = "counter";

// Use a randomly generated key, kept secret, outside of demos.
const SESSION_KEY: [u8; 64] = [42; 64];

#[derive(Default, Deserialize, Serialize)]
struct Counter(usize);

async fn handler(session: Session) -> impl IntoResponse {
    let counter: Counter = session.get(COUNTER_KEY).await.unwrap().unwrap_or_default();
    session.insert(COUNTER_KEY, counter.0 + 1).await.unwrap();
    format!("Current count: {}", counter.0)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,tower_sealed_sessions=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let codecs = Codecs::from_key_pairs(&[SESSION_KEY]).unwrap();
    let session_store = CookieStore::new(codecs).with_options(
        Options::default()
            .with_secure(false)
            .with_expiry(Expiry::OnInactivity(Duration::seconds(10))),
    );
    let session_layer = SessionManagerLayer::new(session_store);

    let app = Router::new().route("/", get(handler)).layer(session_layer);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app.into_make_service())
        .await
        .unwrap();
}
