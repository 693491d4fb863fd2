// SSE transport: long-lived GET event stream plus out-of-band POSTs

use super::messages;
use super::{ApiResult, ApiError};
use crate::config::AppState;
use axum::{
    body::Bytes,
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use mcpgate_core::{Frame, Location, SessionError, SessionId, SessionStore, TransportMode};
use mcpgate_mcp::protocol::{Envelope, JsonRpcResponse};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

/// What happens to the session when its stream goes away
#[derive(Debug, Clone, Copy)]
enum StreamEnd {
    Close,
    Detach,
}

/// Tears the session down (or just unbinds the stream) when the response
/// body is dropped, including on client disconnect
struct StreamGuard {
    store: SessionStore,
    id: SessionId,
    end: StreamEnd,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        match self.end {
            StreamEnd::Close => {
                if self.store.close(&self.id).is_some() {
                    tracing::info!(session_id = %self.id, "Event stream ended, session closed");
                }
            }
            StreamEnd::Detach => {
                self.store.detach_outbound(&self.id);
                tracing::debug!(session_id = %self.id, "Event stream detached");
            }
        }
    }
}

enum Wake {
    Frame(Option<Frame>),
    Heartbeat,
}

pub(super) fn message_event(frame: Frame) -> Event {
    Event::default().event("message").data(frame)
}

/// Open a new SSE session and announce its POST endpoint
pub(super) async fn open_session(state: Arc<AppState>) -> ApiResult<Response> {
    let session = state.store.create(TransportMode::Sse);
    let (tx, rx) = mpsc::channel(state.config.session.outbound_buffer);

    if let Err(e) = state.store.attach_outbound(&session.id, tx).await {
        state.store.close(&session.id);
        return Err(e.into());
    }

    let endpoint = format!(
        "{}?sessionId={}",
        state.config.server.base_path, session.id
    );
    Ok(event_stream(state, session.id, rx, Some(endpoint), StreamEnd::Close).into_response())
}

/// Attach a standalone event stream to an existing session
pub(super) async fn attach_stream(state: Arc<AppState>, id: SessionId) -> ApiResult<Response> {
    let (tx, rx) = mpsc::channel(state.config.session.outbound_buffer);
    state.store.attach_outbound(&id, tx).await?;
    tracing::info!(session_id = %id, "Event stream attached");
    Ok(event_stream(state, id, rx, None, StreamEnd::Detach).into_response())
}

fn event_stream(
    state: Arc<AppState>,
    id: SessionId,
    mut rx: mpsc::Receiver<Frame>,
    endpoint: Option<String>,
    end: StreamEnd,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let heartbeat = state.config.session.heartbeat_interval();
    let guard = StreamGuard {
        store: state.store.clone(),
        id: id.clone(),
        end,
    };

    let stream = async_stream::stream! {
        let _guard = guard;

        if let Some(endpoint) = endpoint {
            yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        }

        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        loop {
            let wake = tokio::select! {
                frame = rx.recv() => Wake::Frame(frame),
                _ = ticker.tick() => Wake::Heartbeat,
            };

            match wake {
                Wake::Frame(Some(frame)) => {
                    yield Ok(message_event(frame));
                }
                // Session closed: every sender is gone
                Wake::Frame(None) => break,
                Wake::Heartbeat => {
                    if state.store.touch(&id).is_err() {
                        break;
                    }
                    yield Ok(Event::default().comment("ping"));
                }
            }
        }
    };

    Sse::new(stream)
}

/// Out-of-band POST for an SSE session; answers travel down the event stream
pub(super) async fn post_message(
    state: Arc<AppState>,
    id: SessionId,
    body: Bytes,
) -> ApiResult<Response> {
    let location = state
        .store
        .locate(&id)
        .await
        .ok_or_else(|| ApiError::from(SessionError::UnknownSession(id.clone())))?;

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

    if location == Location::Local {
        state.store.touch(&id)?;
    }

    let accepted = messages::accept(&state, &id, envelope, None, location);
    for frame in accepted.immediate {
        state.store.send(&id, frame).await;
    }

    Ok((StatusCode::ACCEPTED, "Accepted").into_response())
}
