use std::net::SocketAddr;

use axum::{
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use tower_sealed_sessions::{
    Codecs, DalBackend, DalStore, MemoryConnection, Options, Session, SessionManagerLayer,
};

// Use a randomly generated key, kept secret, outside of demos.
const SESSION_KEY: [u8; 64] = [42; 64];

async fn index(session: Session) -> impl IntoResponse {
    let flashes: Vec<String> = session.flashes().await.unwrap();
    if flashes.is_empty() {
        "Nothing new. POST to /save to leave a message.".to_string()
    } else {
        flashes.join("\n")
    }
}

async fn save(session: Session) -> impl IntoResponse {
    session.add_flash("Saved!").await.unwrap();
    Redirect::to("/")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let backend = DalBackend::new(MemoryConnection::default(), "demo", "sessions");
    let codecs = Codecs::from_key_pairs(&[SESSION_KEY]).unwrap();
    let session_store =
        DalStore::new(backend, codecs).with_options(Options::default().with_secure(false));
    let session_layer = SessionManagerLayer::new(session_store);

    let app = Router::new()
        .route("/", get(index))
        .route("/save", post(save))
        .layer(session_layer);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app.into_make_service())
        .await
        .unwrap();
}
