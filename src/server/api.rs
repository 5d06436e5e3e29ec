use crate::agent::ChatAgent;
use crate::error::ChatError;
use crate::models::chat::{ ChatMessage, ChatMode };
use crate::rag::IngestSummary;
use crate::session::{ SessionRegistry, SharedSession };

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ DefaultBodyLimit, Multipart, Path, State },
    response::{ Html, IntoResponse, Response },
    http::StatusCode,
};
use serde::{ Deserialize, Serialize };
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub sessions: SessionRegistry,
    pub ws_url: String,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub content: String,
    #[serde(default)]
    pub mode: Option<ChatMode>,
}

#[derive(Serialize)]
struct SessionCreated {
    id: String,
}

/// Errors returned by the JSON API as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    SessionNotFound(String),
    NoDocument,
    UnsupportedMedia(String),
    BadRequest(String),
    Chat(ChatError),
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError::Chat(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SessionNotFound(id) => (StatusCode::NOT_FOUND, format!("unknown session {}", id)),
            ApiError::NoDocument => (StatusCode::NOT_FOUND, "no document attached".to_string()),
            ApiError::UnsupportedMedia(m) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, m),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Chat(e) => {
                let status = match &e {
                    ChatError::Document(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    | ChatError::Transport { .. }
                    | ChatError::Status { .. }
                    | ChatError::Decode(_)
                    | ChatError::Incomplete
                    | ChatError::Embedding(_) => StatusCode::BAD_GATEWAY,
                    | ChatError::Config(_)
                    | ChatError::Prompt(_)
                    | ChatError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/config", get(config_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/{id}", axum::routing::delete(delete_session_handler))
        .route("/api/sessions/{id}/messages", get(messages_handler))
        .route("/api/sessions/{id}/chat", post(chat_handler))
        .route(
            "/api/sessions/{id}/document",
            post(upload_handler).delete(clear_document_handler)
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    http_port: u16,
    state: AppState,
    max_upload_bytes: usize
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(state, max_upload_bytes);

    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    error!("HTTP server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            }
        }
    });

    info!("HTTP server started");
    Ok(())
}

async fn find_session(state: &AppState, id: &str) -> Result<SharedSession, ApiError> {
    state.sessions.get(id).await.ok_or_else(|| ApiError::SessionNotFound(id.to_string()))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn config_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "ws_url": state.ws_url }))
}

async fn create_session_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (id, _) = state.sessions.create().await;
    (StatusCode::CREATED, Json(SessionCreated { id }))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

async fn messages_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let session = find_session(&state, &id).await?;
    let messages = session.lock().await.log.messages().to_vec();
    Ok(Json(messages))
}

async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>
) -> Result<Json<ChatMessage>, ApiError> {
    let session = find_session(&state, &id).await?;
    let mut guard = session.lock().await;
    let reply = state.agent.respond(&mut guard, &req.content, req.mode).await.map_err(|e| {
        error!("Session {}: turn failed: {}", id, e);
        e
    })?;
    Ok(Json(reply))
}

fn is_pdf(file_name: Option<&str>, content_type: Option<&str>) -> bool {
    let by_name = file_name.map_or(false, |n| n.to_ascii_lowercase().ends_with(".pdf"));
    let by_type = content_type.map_or(false, |t| t.eq_ignore_ascii_case("application/pdf"));
    by_name || by_type
}

async fn upload_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart
) -> Result<Json<IngestSummary>, ApiError> {
    let session = find_session(&state, &id).await?;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
        if !is_pdf(Some(file_name.as_str()), field.content_type()) {
            warn!("Session {}: rejected non-PDF upload '{}'", id, file_name);
            return Err(ApiError::UnsupportedMedia(format!("{} is not a PDF document", file_name)));
        }

        let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        info!("Session {}: received '{}' ({} bytes)", id, file_name, bytes.len());

        let index = state.agent.ingest_upload(&bytes, &file_name).await?;
        let summary = state.agent.install_document(&mut *session.lock().await, index);
        return Ok(Json(summary));
    }

    Err(ApiError::BadRequest("missing multipart field 'file'".to_string()))
}

async fn clear_document_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<StatusCode, ApiError> {
    let session = find_session(&state, &id).await?;
    let removed = state.agent.clear_document(&mut *session.lock().await);
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NoDocument)
    }
}
