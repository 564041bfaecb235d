//! HTTP API: document upload and management, knowledge-base ingest, and chat.
//!
//! All JSON responses share one envelope: `{"ok": true, ...}` on success and
//! `{"ok": false, "error": "..."}` on failure.

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePath;
use tower_http::services::{ServeDir, ServeFile};

use crate::ai_client::{ChatClient, ChatError};
use crate::conversations::{session_from_cookie, ChatMessage, ConversationStore};
use crate::documents::{Document, DocumentStore, StoreError};
use crate::extraction::Extractor;
use crate::modes::{AnalysisMode, ModeInfo};
use crate::settings::Settings;
use crate::utils::size_label;

/// Multipart overhead allowance: whole-request limit relative to `max_upload_bytes`
const BODY_LIMIT_FACTOR: usize = 4;

// ============================================================================
// AppState
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub extractor: Extractor,
    pub documents: Arc<Mutex<DocumentStore>>,
    pub conversations: Arc<Mutex<ConversationStore>>,
    pub chat: Arc<ChatClient>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self, ChatError> {
        let chat = ChatClient::new(&settings)?;
        Ok(Self {
            extractor: settings.extractor(),
            documents: Arc::new(Mutex::new(DocumentStore::new(settings.max_upload_bytes))),
            conversations: Arc::new(Mutex::new(ConversationStore::new())),
            chat: Arc::new(chat),
            settings: Arc::new(settings),
            start_time: Instant::now(),
        })
    }

    fn documents(&self) -> Result<MutexGuard<'_, DocumentStore>, AppError> {
        self.documents
            .lock()
            .map_err(|_| AppError::from("Document store lock poisoned".to_string()))
    }

    fn conversations(&self) -> Result<MutexGuard<'_, ConversationStore>, AppError> {
        self.conversations
            .lock()
            .map_err(|_| AppError::from("Conversation store lock poisoned".to_string()))
    }
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug)]
pub struct AppError(pub StatusCode, pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({"ok": false, "error": self.1}))).into_response()
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError(StatusCode::INTERNAL_SERVER_ERROR, s)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        bad_request(e.to_string())
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        bad_request(e.to_string())
    }
}

fn bad_request(msg: impl Into<String>) -> AppError {
    AppError(StatusCode::BAD_REQUEST, msg.into())
}

/// Success envelope: `{"ok": true}` merged with the fields of `body`
fn ok_json(body: serde_json::Value) -> Json<serde_json::Value> {
    let mut map = serde_json::Map::new();
    map.insert("ok".to_string(), serde_json::Value::Bool(true));
    if let serde_json::Value::Object(fields) = body {
        map.extend(fields);
    }
    Json(serde_json::Value::Object(map))
}

fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    if body.is_empty() {
        return Err(bad_request("Empty request body"));
    }
    serde_json::from_slice(body).map_err(|e| bad_request(format!("Invalid JSON: {}", e)))
}

/// Cap on a whole request body (multipart overhead and several files included)
fn body_limit(settings: &Settings) -> usize {
    settings.max_upload_bytes.saturating_mul(BODY_LIMIT_FACTOR)
}

fn too_large_message(limit: usize) -> String {
    format!("Upload too large (limit {} per request)", size_label(limit))
}

/// Map a multipart read failure to a status and user-facing message
fn upload_error(e: &MultipartError, limit: usize) -> AppError {
    let status = e.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError(status, too_large_message(limit))
    } else {
        AppError(status, format!("Malformed upload: {}", e.body_text()))
    }
}

fn session_id(headers: &HeaderMap) -> String {
    session_from_cookie(headers.get(header::COOKIE).and_then(|v| v.to_str().ok()))
}

/// Last path component, accepting either separator (browsers on Windows may send full paths)
fn basename(filename: &str) -> &str {
    filename.rsplit(['/', '\\']).next().unwrap_or(filename).trim()
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Deserialize)]
struct RemoveRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Serialize)]
struct UploadResult {
    name: String,
    ok: bool,
    message: String,
}

// ============================================================================
// Handlers
// ============================================================================

// GET /api/documents
async fn documents_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let store = state.documents()?;
    Ok(ok_json(serde_json::json!({
        "documents": store.summaries(),
        "ingested": store.is_ingested(),
        "count": store.len(),
    })))
}

// GET /api/modes
async fn modes_handler() -> Json<serde_json::Value> {
    let modes: serde_json::Map<String, serde_json::Value> = AnalysisMode::ALL
        .iter()
        .map(|m| {
            let info = serde_json::to_value(ModeInfo::from(*m)).unwrap_or_default();
            (m.as_str().to_string(), info)
        })
        .collect();
    ok_json(serde_json::json!({ "modes": modes }))
}

// GET /api/health
async fn health_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let sessions = state.conversations()?.session_count();
    let documents = state.documents()?.len();
    Ok(ok_json(serde_json::json!({
        "model": state.chat.model(),
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "sessions": sessions,
        "documents": documents,
    })))
}

// POST /api/upload
async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut multipart = multipart.map_err(|_| bad_request("Expected multipart/form-data"))?;
    let limit = body_limit(&state.settings);
    let mut results = Vec::new();

    // Once the stream breaks nothing after it is readable; earlier files are
    // already stored, so report them instead of failing the whole request
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let err = upload_error(&e, limit);
                if results.is_empty() {
                    return Err(err);
                }
                log::warn!("[Upload] Stopped reading upload: {}", err.1);
                break;
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let name = match field.file_name().map(basename) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => continue,
        };
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                let AppError(_, message) = upload_error(&e, limit);
                log::warn!("[Upload] {}: {}", name, message);
                results.push(UploadResult { name, ok: false, message });
                break;
            }
        };

        let result = match store_upload(&state, &name, data).await {
            Ok(message) => UploadResult { name, ok: true, message },
            Err(AppError(_, message)) => {
                log::warn!("[Upload] {}", message);
                UploadResult { name, ok: false, message }
            }
        };
        results.push(result);
    }

    if results.is_empty() {
        return Err(bad_request("No files received"));
    }

    let documents = state.documents()?.summaries();
    Ok(ok_json(serde_json::json!({ "results": results, "documents": documents })))
}

/// Validate, extract off the async runtime (bounded by the extraction timeout), then store
async fn store_upload(state: &AppState, name: &str, data: Bytes) -> Result<String, AppError> {
    let format = state.documents()?.check_new(name, data.len())?;
    let size = data.len();
    if format.is_pdf() {
        log::debug!("[Extract] {}: {:?} PDF backend", name, state.extractor.pdf_backend);
    }
    let extractor = state.extractor;
    let timeout = state.settings.extract_timeout();

    let owned_name = name.to_string();
    let task = tokio::task::spawn_blocking(move || extractor.extract(&data, &owned_name, format));

    let content = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            log::error!("[Extract] {}: extraction task failed: {}", name, e);
            extractor.fallback(name, &format!("extraction failed: {}", e))
        }
        Err(_) => {
            log::warn!("[Extract] {}: gave up after {}s", name, timeout.as_secs());
            extractor.fallback(name, &format!("extraction timed out after {}s", timeout.as_secs()))
        }
    };

    log::info!(
        "[Upload] {} ({}, {} chars extracted)",
        name,
        size_label(size),
        content.chars().count()
    );
    let message = state.documents()?.insert(Document::new(name, format, size, content))?;
    Ok(message)
}

// POST /api/remove
async fn remove_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let req: RemoveRequest = parse_json_body(&body)?;
    let name = req.name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(bad_request("Missing 'name' field"));
    }

    let mut store = state.documents()?;
    let message = store.remove(name)?;
    Ok(ok_json(serde_json::json!({
        "message": message,
        "documents": store.summaries(),
    })))
}

// POST /api/ingest
async fn ingest_handler(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let message = state.documents()?.ingest()?;
    log::info!("[Server] {}", message);
    Ok(ok_json(serde_json::json!({ "message": message, "ingested": true })))
}

// POST /api/chat
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let req: ChatRequest = parse_json_body(&body)?;

    let api_key = req
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| state.settings.api_key())
        .map(str::to_string)
        .ok_or_else(|| bad_request("Missing API key"))?;

    let query = req.query.as_deref().map(str::trim).unwrap_or_default().to_string();
    if query.is_empty() {
        return Err(bad_request("Missing query"));
    }

    let mode = AnalysisMode::from_key(req.mode.as_deref().unwrap_or_default());
    let session = session_id(&headers);

    // Snapshot state and release the locks before the upstream call
    let mut history = state.conversations()?.history(&session);
    history.push(ChatMessage::user(query.clone()));
    let knowledge_base = state.documents()?.knowledge_base().to_string();

    log::info!("[Chat] session={} mode={} history={}", session, mode.as_str(), history.len());
    let reply = state
        .chat
        .chat(&api_key, &history, mode, &knowledge_base)
        .await
        .map_err(|e| {
            log::warn!("[Chat] {}", e);
            AppError::from(e)
        })?;

    let history_length = state.conversations()?.record_exchange(&session, query, reply.clone());
    Ok(ok_json(serde_json::json!({
        "reply": reply,
        "mode": mode,
        "history_length": history_length,
    })))
}

// POST /api/clear
async fn clear_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    state.conversations()?.clear(&session_id(&headers));
    Ok(ok_json(serde_json::json!({ "message": "Conversation cleared" })))
}

async fn not_found_handler() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// The body-limit layer rejects oversized requests with plain text; keep the JSON envelope
async fn json_payload_too_large(State(limit): State<usize>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return AppError(StatusCode::PAYLOAD_TOO_LARGE, too_large_message(limit)).into_response();
    }
    response
}

/// Access log line per request; static assets are too noisy to log
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    if !path.starts_with("/static/") {
        log::info!("[HTTP] {} {} -> {}", method, path, response.status().as_u16());
    }
    response
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let root = state.settings.static_root.clone();
    let body_limit = body_limit(&state.settings);

    Router::new()
        .route_service("/", ServeFile::new(root.join("templates").join("index.html")))
        .nest_service("/static", ServeDir::new(root.join("static")))
        .route("/api/documents", get(documents_handler))
        .route("/api/modes", get(modes_handler))
        .route("/api/health", get(health_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/remove", post(remove_handler))
        .route("/api/ingest", post(ingest_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/clear", post(clear_handler))
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::from_fn_with_state(body_limit, json_payload_too_large))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// The router with trailing slashes trimmed before routing (`/api/documents/` works too)
pub fn app(state: AppState) -> NormalizePath<Router> {
    NormalizePath::trim_trailing_slash(router(state))
}
