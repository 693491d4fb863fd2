// Intake of decoded POST bodies: spawn a dispatch per request, apply
// notifications, answer malformed messages on the spot

use crate::config::AppState;
use mcpgate_core::{Frame, FrameSender, Location, SessionError, SessionId};
use mcpgate_mcp::protocol::{
    request_key, CancelledParams, Envelope, Incoming, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse,
};
use serde_json::Value;
use std::sync::Arc;

/// What became of a POST body
#[derive(Debug, Default)]
pub(super) struct Accepted {
    /// Answers that are ready now
    pub immediate: Vec<Frame>,
    /// Request ids now in flight on this instance
    pub pending: Vec<String>,
}

/// Accept every message of `envelope` for a session.
///
/// Request answers go to `reply` when given, else down the session's stream.
/// For a session held by another instance the dispatch still runs here, but
/// without in-flight bookkeeping.
pub(super) fn accept(
    state: &Arc<AppState>,
    session_id: &SessionId,
    envelope: Envelope,
    reply: Option<FrameSender>,
    location: Location,
) -> Accepted {
    let mut accepted = Accepted::default();

    for message in envelope.messages {
        match message {
            Incoming::Request(request) => {
                let id = request.id.clone().unwrap_or(Value::Null);
                let key = request_key(&id);

                if location == Location::Remote {
                    tokio::spawn(answer_remote(
                        state.clone(),
                        session_id.clone(),
                        request,
                        reply.clone(),
                    ));
                    continue;
                }

                if let Err(e) = state.store.begin_request(session_id, &key, reply.clone()) {
                    let error = match e {
                        SessionError::DuplicateRequest { .. } => {
                            JsonRpcError::invalid_request(e.to_string())
                        }
                        other => JsonRpcError::internal_error(other.to_string()),
                    };
                    accepted
                        .immediate
                        .push(JsonRpcResponse::error(id, error).to_frame());
                    continue;
                }

                tracing::debug!(session_id = %session_id, request_id = %key, method = %request.method, "Request accepted");
                let task = tokio::spawn(answer(
                    state.clone(),
                    session_id.clone(),
                    key.clone(),
                    request,
                ));
                if !state.store.track_request(session_id, &key, task.abort_handle()) {
                    task.abort();
                }
                accepted.pending.push(key);
            }
            Incoming::Notification(notification) => {
                notify(state, session_id, notification);
            }
            Incoming::Response(_) => {
                tracing::debug!(session_id = %session_id, "Ignoring client response");
            }
            Incoming::Invalid(response) => {
                accepted.immediate.push(response.to_frame());
            }
        }
    }

    accepted
}

async fn answer(state: Arc<AppState>, session_id: SessionId, key: String, request: JsonRpcRequest) {
    let response = state.mcp.handle_request(request).await;
    let delivery = state
        .store
        .deliver(&session_id, &key, response.to_frame())
        .await;
    tracing::debug!(session_id = %session_id, request_id = %key, ?delivery, "Response delivered");
}

async fn answer_remote(
    state: Arc<AppState>,
    session_id: SessionId,
    request: JsonRpcRequest,
    reply: Option<FrameSender>,
) {
    let frame = state.mcp.handle_request(request).await.to_frame();
    match reply {
        Some(reply) => {
            if reply.send(frame).await.is_err() {
                tracing::debug!(session_id = %session_id, "Client went away before the answer");
            }
        }
        None => {
            let delivery = state.store.send(&session_id, frame).await;
            tracing::debug!(session_id = %session_id, ?delivery, "Response bridged");
        }
    }
}

fn notify(state: &Arc<AppState>, session_id: &SessionId, notification: JsonRpcRequest) {
    match notification.method.as_str() {
        "notifications/initialized" => {
            tracing::info!(session_id = %session_id, "Client initialized");
        }
        "notifications/cancelled" => {
            let params = notification
                .params
                .map(serde_json::from_value::<CancelledParams>);
            match params {
                Some(Ok(params)) => {
                    let key = request_key(&params.request_id);
                    let cancelled = state.store.cancel_request(session_id, &key);
                    tracing::info!(
                        session_id = %session_id,
                        request_id = %key,
                        cancelled,
                        reason = params.reason.as_deref().unwrap_or(""),
                        "Cancellation requested"
                    );
                }
                _ => {
                    tracing::warn!(session_id = %session_id, "Malformed cancellation notification");
                }
            }
        }
        method => {
            tracing::debug!(session_id = %session_id, method, "Ignoring notification");
        }
    }
}
