// Streaming-HTTP transport: requests and their answers share one POST

use super::sse::message_event;
use super::{header_session, messages, with_session_header, ApiResult};
use crate::config::AppState;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, StatusCode},
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use mcpgate_core::{Frame, Location, SessionError, SessionId, SessionStore, TransportMode};
use mcpgate_mcp::protocol::{Envelope, JsonRpcResponse};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cancels whatever this POST still has in flight when the exchange is
/// abandoned; already-answered requests are unaffected
struct PendingGuard {
    store: SessionStore,
    id: SessionId,
    pending: Vec<String>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let cancelled = self
            .pending
            .iter()
            .filter(|key| self.store.cancel_request(&self.id, key))
            .count();
        if cancelled > 0 {
            tracing::info!(session_id = %self.id, cancelled, "Client disconnected, cancelled pending requests");
        }
    }
}

/// Whether the client takes `text/event-stream` responses
fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|media| media.split(';').next())
        .any(|media| media.trim().eq_ignore_ascii_case("text/event-stream"))
}

/// Resolve the session a POST belongs to, creating one when none is named
async fn resolve_session(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> ApiResult<(SessionId, Location)> {
    match header_session(headers)? {
        Some(id) => match state.store.locate(&id).await {
            Some(location) => Ok((id, location)),
            None => Err(SessionError::UnknownSession(id).into()),
        },
        None => {
            let session = state.store.create(TransportMode::StreamingHttp);
            if let Err(e) = state.store.listen(&session.id).await {
                state.store.close(&session.id);
                return Err(e.into());
            }
            Ok((session.id, Location::Local))
        }
    }
}

pub(super) async fn post(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let envelope = match Envelope::parse(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(Value::Null, error)),
            )
                .into_response())
        }
    };

    let (session_id, location) = resolve_session(&state, &headers).await?;
    if location == Location::Local {
        state.store.touch(&session_id)?;
    }

    if !envelope.has_requests() {
        messages::accept(&state, &session_id, envelope, None, location);
        return Ok(with_session_header(
            StatusCode::ACCEPTED.into_response(),
            &session_id,
        ));
    }

    let batch = envelope.batch;
    // One answer per message at most, so senders never wait
    let (tx, mut rx) = mpsc::channel::<Frame>(envelope.messages.len());
    // The in-flight entries now hold the only senders; the channel closes
    // once every request is answered or cancelled
    let accepted = messages::accept(&state, &session_id, envelope, Some(tx), location);

    let guard = PendingGuard {
        store: state.store.clone(),
        id: session_id.clone(),
        pending: accepted.pending,
    };
    let immediate = accepted.immediate;

    let response = if accepts_event_stream(&headers) {
        let stream = async_stream::stream! {
            let _guard = guard;
            for frame in immediate {
                yield Ok::<_, Infallible>(message_event(frame));
            }
            while let Some(frame) = rx.recv().await {
                yield Ok(message_event(frame));
            }
        };
        Sse::new(stream).into_response()
    } else {
        let _guard = guard;
        let mut frames = immediate;
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        json_response(frames, batch)
    };

    Ok(with_session_header(response, &session_id))
}

/// Answers as one JSON body: an array for a batch, else the single object
fn json_response(frames: Vec<Frame>, batch: bool) -> Response {
    let body = if batch {
        format!("[{}]", frames.join(","))
    } else {
        match frames.into_iter().next() {
            Some(frame) => frame,
            // Cancelled before it could be answered
            None => return StatusCode::ACCEPTED.into_response(),
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_accepts_event_stream() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_event_stream(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!accepts_event_stream(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, Text/Event-Stream;q=0.9"),
        );
        assert!(accepts_event_stream(&headers));
    }

    #[test]
    fn test_json_response_shapes() {
        let single = json_response(vec![r#"{"id":1}"#.to_string()], false);
        assert_eq!(single.status(), StatusCode::OK);

        let empty = json_response(vec![], false);
        assert_eq!(empty.status(), StatusCode::ACCEPTED);

        let batch = json_response(vec![], true);
        assert_eq!(batch.status(), StatusCode::OK);
    }
}
