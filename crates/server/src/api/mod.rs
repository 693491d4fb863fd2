use crate::config::AppState;
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use mcpgate_core::{Location, SessionError, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

mod messages;
mod sse;
mod streamable;

/// Header carrying the streaming-HTTP session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Start the API server; returns once `shutdown` fires and connections drain
pub async fn serve(addr: &str, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            // End open event streams so the server can drain
            let closed = state.store.close_all();
            tracing::info!(closed, "Shutting down, closed open sessions");
        })
        .await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let base_path = state.config.server.base_path.clone();

    Router::new()
        .route("/health", get(health_check))
        .route(
            &base_path,
            get(open_stream).post(post_message).delete(delete_session),
        )
        // Middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mcpgate",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.store.len(),
        "tools": state.mcp.dispatcher().registry().len(),
        "bridge": state.store.bus_backend(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Session named by the `Mcp-Session-Id` header, if any
fn header_session(headers: &HeaderMap) -> Result<Option<SessionId>, RequestError> {
    match headers.get(SESSION_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Some(SessionId::new(v)))
            .ok_or(RequestError::InvalidSessionHeader),
    }
}

fn with_session_header(mut response: Response, id: &SessionId) -> Response {
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// GET: open an SSE session, or attach a stream to a streaming-HTTP session
async fn open_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    match header_session(&headers)? {
        Some(id) => sse::attach_stream(state, id).await,
        None => sse::open_session(state).await,
    }
}

/// POST: out-of-band message for an SSE session, or a streaming-HTTP exchange
async fn post_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    match query.session_id {
        Some(id) => sse::post_message(state, SessionId::new(id), body).await,
        None => streamable::post(state, headers, body).await,
    }
}

/// DELETE: terminate a session wherever it lives. Idempotent: an unknown or
/// already closed session still answers 200.
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let id = match query.session_id {
        Some(id) => SessionId::new(id),
        None => header_session(&headers)?.ok_or(RequestError::MissingSessionId)?,
    };

    if state.store.close(&id).is_some() {
        return Ok(StatusCode::OK);
    }

    match state.store.locate(&id).await {
        Some(Location::Remote) => {
            state.store.close_everywhere(&id).await?;
        }
        _ => {
            tracing::debug!(session_id = %id, "Delete for unknown or closed session");
        }
    }
    Ok(StatusCode::OK)
}

/// Malformed transport-level input
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Missing session id: pass ?sessionId= or the Mcp-Session-Id header")]
    MissingSessionId,

    #[error("Invalid Mcp-Session-Id header")]
    InvalidSessionHeader,
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Custom error type for API handlers
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<SessionError>() {
            return match err {
                SessionError::UnknownSession(_) => StatusCode::NOT_FOUND,
                SessionError::AlreadyExists(_)
                | SessionError::OutboundAttached(_)
                | SessionError::DuplicateRequest { .. } => StatusCode::CONFLICT,
                SessionError::Bus(_) => StatusCode::SERVICE_UNAVAILABLE,
                SessionError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if self.0.downcast_ref::<RequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_msg = self.0.to_string();
        let details = self.0.chain().skip(1).map(|e| e.to_string()).collect::<Vec<_>>().join(": ");

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %error_msg, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %error_msg, "Request rejected");
        }

        let response = if details.is_empty() {
            ErrorResponse::new(error_msg)
        } else {
            ErrorResponse::with_details(error_msg, details)
        };

        (status, Json(response)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
