use crate::bus::BusError;
use crate::session::SessionId;

/// Transport-level failures raised by the session store
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown or expired session: {0}")]
    UnknownSession(SessionId),

    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),

    #[error("Session {0} already has a live outbound stream")]
    OutboundAttached(SessionId),

    #[error("Request {request_id} is already in flight for session {session_id}")]
    DuplicateRequest {
        session_id: SessionId,
        request_id: String,
    },

    #[error("Session bridge error: {0}")]
    Bus(#[from] BusError),

    #[error("Invalid bridge message: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
