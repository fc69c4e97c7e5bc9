//! HTTP front end for the chat.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `GET`, `POST` | `/get` | Answer the form field `msg`, reply as `text/plain` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /get` reads an urlencoded body, `GET /get` the query string.
//!
//! # Sessions
//!
//! Each browser gets a signed `chat_session_id` cookie on its first message
//! (see [`crate::session`]). A missing or tampered cookie starts a new
//! session.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing form field: msg" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `empty_retrieval` | 404 |
//! | `quota_exceeded` | 429 |
//! | `config_error`, `store_error`, `internal` | 500 |
//! | `provider_unavailable` | 502 |

use anyhow::Context;
use axum::{
    extract::{rejection::FormRejection, Form, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::AnswerError;
use crate::pipeline::AnswerPipeline;
use crate::session::{new_session_id, SessionSigner};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<AnswerPipeline>,
    signer: SessionSigner,
}

impl AppState {
    pub fn new(pipeline: Arc<AnswerPipeline>, signer: SessionSigner) -> Self {
        Self { pipeline, signer }
    }
}

/// Builds every collaborator from `config`, binds `[server].bind` and
/// serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let signer = SessionSigner::new(config.session_secret()?);
    let pipeline = AnswerPipeline::from_config(config).await?;

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    serve(listener, AppState::new(Arc::new(pipeline), signer)).await
}

/// Serves the chat on an already bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("chat server listening on http://{}", addr);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/get", get(handle_chat).post(handle_chat))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
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

/// Internal error type that converts into an Axum HTTP response.
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<AnswerError> for AppError {
    fn from(err: AnswerError) -> Self {
        let status = match &err {
            AnswerError::EmptyMessage => StatusCode::BAD_REQUEST,
            AnswerError::EmptyRetrieval => StatusCode::NOT_FOUND,
            AnswerError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AnswerError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AnswerError::Config(_) | AnswerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "answer failed");
        } else {
            tracing::warn!(code = err.code(), error = %err, "answer rejected");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
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

// ============ GET|POST /get ============

#[derive(Deserialize)]
struct ChatForm {
    msg: Option<String>,
}

/// Handler for `/get`.
///
/// Resolves the session from the cookie (or starts one), runs the answer
/// pipeline and returns the raw answer text. A new session's signed cookie
/// is attached to the response.
async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<ChatForm>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(form) = form.map_err(|e| bad_request(e.body_text()))?;
    let msg = form
        .msg
        .ok_or_else(|| bad_request("missing form field: msg"))?;

    let existing = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| state.signer.session_from_cookie_header(header));
    let (session_id, is_new) = match existing {
        Some(id) => (id, false),
        None => (new_session_id(), true),
    };

    let answer = state.pipeline.answer(&msg, &session_id).await?;
    tracing::info!(
        session = %session_id,
        passages = answer.passages.len(),
        "answered"
    );

    let mut response = answer.text.into_response();
    if is_new {
        let cookie = HeaderValue::from_str(&state.signer.set_cookie(&session_id))
            .map_err(|e| internal(format!("invalid session cookie: {}", e)))?;
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}
