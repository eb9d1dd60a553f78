//! HTTP and WebSocket server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/status` | Document count, live snapshot, sessions |
//! | `POST` | `/api/upload_pdf` | Multipart upload into the watched directory |
//! | `GET`  | `/api/chat/ws` | Chat session (WebSocket, plain-text frames) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing multipart field 'file'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_type` (415), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! served from another origin can upload and chat.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::service::{ResumeRag, ServiceStatus};
use crate::session::{SessionManager, Submitted};

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    service: Arc<ResumeRag>,
}

/// Routes for `service`, without binding a socket.
pub fn router(service: Arc<ResumeRag>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route("/api/upload_pdf", post(handle_upload))
        .route("/api/chat/ws", get(handle_chat_ws))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(AppState { service })
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(service: Arc<ResumeRag>) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unsupported_type(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
        code: "unsupported_type".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/status ============

async fn handle_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.service.status())
}

// ============ POST /api/upload_pdf ============

#[derive(Serialize)]
struct UploadResponse {
    filename: String,
    file_location: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| bad_request("missing or invalid file name"))?;

        let upload_dir = &state.service.config().paths.upload_dir;
        let destination = upload_dir.join(&filename);
        if !state.service.ingestor().accepts(&destination) {
            return Err(unsupported_type(format!(
                "'{}' is not a supported resume format",
                filename
            )));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        stage_upload(upload_dir, &filename, &bytes)
            .await
            .map_err(|e| internal(format!("failed to store upload: {}", e)))?;

        tracing::info!(file = %filename, bytes = bytes.len(), "upload stored");
        return Ok(Json(UploadResponse {
            file_location: destination.display().to_string(),
            filename,
        }));
    }

    Err(bad_request("missing multipart field 'file'"))
}

/// Reduce a client-supplied name to a plain, visible file name.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base.starts_with('.') {
        return None;
    }
    Some(base.to_string())
}

/// Write under a hidden name, then rename into place so the watcher
/// never sees a partially written upload.
async fn stage_upload(dir: &Path, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let staging = dir.join(format!(".{}.part", filename));
    let destination = dir.join(filename);
    tokio::fs::write(&staging, bytes).await?;
    tokio::fs::rename(&staging, &destination).await?;
    Ok(destination)
}

// ============ GET /api/chat/ws ============

async fn handle_chat_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let sessions = Arc::clone(state.service.sessions());
    ws.on_upgrade(move |socket| run_session(socket, sessions))
}

async fn run_session(socket: WebSocket, sessions: Arc<SessionManager>) {
    let (id, mut outbound) = sessions.register();
    let (mut sender, mut receiver) = socket.split();
    sessions.open(id);

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if sessions.submit(id, text.to_string()) == Submitted::NotOpen {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "transport error");
                break;
            }
        }
    }

    sessions.close(id);
    writer.abort();
}
