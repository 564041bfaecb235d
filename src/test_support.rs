//! Helpers shared by the async HTTP tests

use axum::extract::Request;
use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router, ServiceExt};
use tower_http::normalize_path::NormalizePath;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Requests seen by a stub upstream: headers and JSON body
pub(crate) type Captured = Arc<Mutex<Vec<(HeaderMap, serde_json::Value)>>>;

/// Serve `app` on an ephemeral localhost port
pub(crate) async fn spawn_app(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Serve an app whose paths are normalized before routing
pub(crate) async fn spawn_normalized(app: NormalizePath<Router>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, ServiceExt::<Request>::into_make_service(app)).await.unwrap();
    });
    addr
}

/// Fake chat-completions endpoint answering every request with `status` and `reply`
pub(crate) async fn stub_llm(status: u16, reply: serde_json::Value) -> (String, Captured) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let app = Router::new().route(
        "/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
            let sink = sink.clone();
            let reply = reply.clone();
            async move {
                sink.lock().unwrap().push((headers, body));
                (StatusCode::from_u16(status).unwrap(), Json(reply))
            }
        }),
    );
    let addr = spawn_app(app).await;
    (format!("http://{}/chat/completions", addr), captured)
}

/// Completion body carrying `text` as the assistant reply
pub(crate) fn completion(text: &str) -> serde_json::Value {
    serde_json::json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
}
