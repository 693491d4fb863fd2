use crate::bus::{session_channel, BridgeMessage, SessionBus};
use crate::error::{SessionError, SessionResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

/// Serialized protocol message headed for a client
pub type Frame = String;

/// Process-local delivery path for frames
pub type FrameSender = mpsc::Sender<Frame>;

/// How long a locally closed id is remembered while its bridge
/// subscription winds down
const CLOSED_RETENTION: Duration = Duration::from_secs(30);

/// Opaque session token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new random session ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the client talks to us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Long-lived GET event stream plus out-of-band POSTs
    Sse,
    /// Request and response frames share one POST
    StreamingHttp,
}

/// Session lifecycle.
///
/// `Connecting -> Open -> {Idle, Dispatching} -> Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Open,
    Idle,
    Dispatching,
    Closed,
}

/// Snapshot of a session's bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub transport_mode: TransportMode,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub state: SessionState,
    /// Whether this process holds the session's outbound stream
    pub outbound_attached: bool,
    pub in_flight: usize,
}

/// Where a session's outbound stream lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Local,
    Remote,
}

/// Outcome of handing a frame to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the request's own reply route
    Reply,
    /// Written to this process's outbound stream
    Local,
    /// Published on the bus for another instance
    Bridged { receivers: usize },
    /// Dropped: request already answered or cancelled, or session gone
    Discarded,
}

struct InFlight {
    reply: Option<FrameSender>,
    abort: Option<AbortHandle>,
}

struct SessionEntry {
    session: Session,
    outbound: Option<FrameSender>,
    bridge: Option<JoinHandle<()>>,
    in_flight: HashMap<String, InFlight>,
}

impl SessionEntry {
    fn touch(&mut self) {
        self.session.last_activity_at = Utc::now();
        if self.session.state == SessionState::Connecting {
            self.session.state = SessionState::Open;
        }
    }

    fn refresh_state(&mut self) {
        self.session.in_flight = self.in_flight.len();
        self.session.state = if self.in_flight.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Dispatching
        };
    }

    fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.in_flight.is_empty() && self.session.last_activity_at < cutoff
    }

    fn snapshot(&self) -> Session {
        let mut session = self.session.clone();
        session.outbound_attached = self.outbound.is_some();
        session.in_flight = self.in_flight.len();
        session
    }
}

enum Route {
    Reply(FrameSender),
    Outbound(FrameSender),
    Bridge,
}

/// Tracks open sessions and their in-flight requests.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, SessionEntry>>,
    /// Ids closed here recently. An aborted bridge task keeps its
    /// subscription until the runtime drops it, so probes must not count it.
    closed: Arc<DashMap<SessionId, Instant>>,
    bus: Arc<dyn SessionBus>,
}

impl SessionStore {
    pub fn new(bus: Arc<dyn SessionBus>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            closed: Arc::new(DashMap::new()),
            bus,
        }
    }

    /// Register a new session
    pub fn open(&self, id: SessionId, transport_mode: TransportMode) -> SessionResult<Session> {
        use dashmap::mapref::entry::Entry;

        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyExists(id)),
            Entry::Vacant(vacant) => {
                let now = Utc::now();
                let entry = SessionEntry {
                    session: Session {
                        id: id.clone(),
                        transport_mode,
                        created_at: now,
                        last_activity_at: now,
                        state: SessionState::Connecting,
                        outbound_attached: false,
                        in_flight: 0,
                    },
                    outbound: None,
                    bridge: None,
                    in_flight: HashMap::new(),
                };
                let snapshot = entry.snapshot();
                vacant.insert(entry);
                self.closed.remove(&id);

                tracing::info!(session_id = %id, mode = ?transport_mode, "Session opened");
                Ok(snapshot)
            }
        }
    }

    /// Register a session under a freshly generated ID
    pub fn create(&self, transport_mode: TransportMode) -> Session {
        loop {
            if let Ok(session) = self.open(SessionId::generate(), transport_mode) {
                return session;
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.snapshot())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn bus_backend(&self) -> &'static str {
        self.bus.backend()
    }

    /// Record client activity
    pub fn touch(&self, id: &SessionId) -> SessionResult<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
        entry.touch();
        Ok(())
    }

    /// Bind the process-local delivery path and start listening on the bridge.
    ///
    /// Frames published for this session by other instances are forwarded
    /// into `outbound` until the session closes.
    pub async fn attach_outbound(&self, id: &SessionId, outbound: FrameSender) -> SessionResult<()> {
        {
            let mut entry = self
                .sessions
                .get_mut(id)
                .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;
            if entry.outbound.as_ref().is_some_and(|tx| !tx.is_closed()) {
                return Err(SessionError::OutboundAttached(id.clone()));
            }
            entry.outbound = Some(outbound);
            entry.touch();
        }

        if let Err(e) = self.listen(id).await {
            if let Some(mut entry) = self.sessions.get_mut(id) {
                entry.outbound = None;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Subscribe this instance to the session's bridge channel.
    ///
    /// While listening, this instance answers probes for the session, obeys
    /// close requests from other instances and forwards bridged frames to
    /// whatever outbound stream is attached. Idempotent.
    pub async fn listen(&self, id: &SessionId) -> SessionResult<()> {
        match self.sessions.get(id) {
            None => return Err(SessionError::UnknownSession(id.clone())),
            Some(entry) if entry.bridge.is_some() => return Ok(()),
            Some(_) => {}
        }

        let mut messages = self.subscribe(id).await?;

        let store = self.clone();
        let session_id = id.clone();
        let bridge = tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                match message {
                    BridgeMessage::Frame { payload } => {
                        let outbound = store
                            .sessions
                            .get(&session_id)
                            .and_then(|entry| entry.outbound.clone());
                        match outbound {
                            Some(outbound) => {
                                if outbound.send(payload).await.is_err() {
                                    tracing::warn!(session_id = %session_id, "Outbound stream gone, closing session");
                                    store.close(&session_id);
                                    break;
                                }
                            }
                            None => {
                                tracing::debug!(session_id = %session_id, "No outbound stream, dropping bridged frame");
                            }
                        }
                    }
                    BridgeMessage::Probe => {}
                    BridgeMessage::Close => {
                        tracing::info!(session_id = %session_id, "Session closed by another instance");
                        store.close(&session_id);
                        break;
                    }
                }
            }
        });

        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                if entry.bridge.is_some() {
                    // Lost a race with a concurrent listen
                    bridge.abort();
                } else {
                    entry.bridge = Some(bridge);
                }
                Ok(())
            }
            None => {
                // Closed while we were subscribing
                bridge.abort();
                Err(SessionError::UnknownSession(id.clone()))
            }
        }
    }

    /// Drop the outbound path without closing the session
    pub fn detach_outbound(&self, id: &SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.outbound = None;
        }
    }

    /// Remove a session, cancelling everything it has in flight.
    ///
    /// Returns the final snapshot, or `None` if the session was already gone.
    pub fn close(&self, id: &SessionId) -> Option<Session> {
        let (_, entry) = self.sessions.remove(id)?;
        Some(self.teardown(id, entry))
    }

    fn teardown(&self, id: &SessionId, mut entry: SessionEntry) -> Session {
        let cancelled = entry.in_flight.len();
        for (_, in_flight) in entry.in_flight.drain() {
            if let Some(abort) = in_flight.abort {
                abort.abort();
            }
        }
        if let Some(bridge) = entry.bridge.take() {
            bridge.abort();
        }
        entry.outbound = None;
        entry.session.state = SessionState::Closed;
        entry.session.in_flight = 0;
        entry.session.outbound_attached = false;

        self.closed
            .retain(|_, closed_at| closed_at.elapsed() < CLOSED_RETENTION);
        self.closed.insert(id.clone(), Instant::now());

        tracing::info!(session_id = %id, cancelled, "Session closed");
        entry.session
    }

    /// Close every session held by this instance, returning how many closed
    pub fn close_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.iter().filter(|id| self.close(id).is_some()).count()
    }

    /// Close a session wherever it lives.
    ///
    /// Returns `true` if this instance held it, `false` if a close request was
    /// broadcast (or nobody held it).
    pub async fn close_everywhere(&self, id: &SessionId) -> SessionResult<bool> {
        if self.close(id).is_some() {
            return Ok(true);
        }
        self.publish(id, &BridgeMessage::Close).await?;
        Ok(false)
    }

    /// Find the instance holding a session's outbound stream
    pub async fn locate(&self, id: &SessionId) -> Option<Location> {
        if self.sessions.contains_key(id) {
            return Some(Location::Local);
        }
        if self.closed.contains_key(id) {
            return None;
        }
        match self.publish(id, &BridgeMessage::Probe).await {
            Ok(receivers) if receivers > 0 => Some(Location::Remote),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Bridge probe failed");
                None
            }
        }
    }

    /// Register an in-flight request. `reply` routes its answer to a
    /// dedicated channel instead of the session's outbound stream.
    pub fn begin_request(
        &self,
        id: &SessionId,
        request_id: &str,
        reply: Option<FrameSender>,
    ) -> SessionResult<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))?;

        if entry.in_flight.contains_key(request_id) {
            return Err(SessionError::DuplicateRequest {
                session_id: id.clone(),
                request_id: request_id.to_string(),
            });
        }

        entry.in_flight.insert(
            request_id.to_string(),
            InFlight { reply, abort: None },
        );
        entry.touch();
        entry.refresh_state();
        Ok(())
    }

    /// Attach the task handle that is computing a request's answer.
    ///
    /// Returns `false` when the request is no longer pending; the caller
    /// should abort the task.
    pub fn track_request(&self, id: &SessionId, request_id: &str, abort: AbortHandle) -> bool {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return false;
        };
        match entry.in_flight.get_mut(request_id) {
            Some(in_flight) => {
                in_flight.abort = Some(abort);
                true
            }
            None => false,
        }
    }

    /// Cancel one pending request. Its answer, if it still arrives, is discarded.
    pub fn cancel_request(&self, id: &SessionId, request_id: &str) -> bool {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return false;
        };
        let Some(in_flight) = entry.in_flight.remove(request_id) else {
            return false;
        };
        if let Some(abort) = in_flight.abort {
            abort.abort();
        }
        entry.refresh_state();
        tracing::debug!(session_id = %id, request_id, "Request cancelled");
        true
    }

    /// Request ids currently pending for a session
    pub fn pending_requests(&self, id: &SessionId) -> Vec<String> {
        self.sessions
            .get(id)
            .map(|entry| entry.in_flight.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver the answer to a pending request, at most once.
    pub async fn deliver(&self, id: &SessionId, request_id: &str, frame: Frame) -> Delivery {
        let route = {
            let Some(mut entry) = self.sessions.get_mut(id) else {
                tracing::debug!(session_id = %id, request_id, "Session gone, discarding result");
                return Delivery::Discarded;
            };
            let Some(in_flight) = entry.in_flight.remove(request_id) else {
                tracing::debug!(session_id = %id, request_id, "Request no longer pending, discarding result");
                return Delivery::Discarded;
            };
            entry.refresh_state();
            entry.session.last_activity_at = Utc::now();

            match (in_flight.reply, &entry.outbound) {
                (Some(reply), _) => Route::Reply(reply),
                (None, Some(outbound)) => Route::Outbound(outbound.clone()),
                (None, None) => Route::Bridge,
            }
        };

        match route {
            Route::Reply(reply) => match reply.send(frame).await {
                Ok(()) => Delivery::Reply,
                Err(_) => Delivery::Discarded,
            },
            Route::Outbound(outbound) => self.write_outbound(id, outbound, frame).await,
            Route::Bridge => self.bridge(id, frame).await,
        }
    }

    /// Push a frame down a session's stream with no request bookkeeping.
    ///
    /// Used when this instance answered a request for a session whose stream
    /// another instance holds.
    pub async fn send(&self, id: &SessionId, frame: Frame) -> Delivery {
        let outbound = self
            .sessions
            .get(id)
            .and_then(|entry| entry.outbound.clone());

        match outbound {
            Some(outbound) => self.write_outbound(id, outbound, frame).await,
            None => self.bridge(id, frame).await,
        }
    }

    async fn write_outbound(&self, id: &SessionId, outbound: FrameSender, frame: Frame) -> Delivery {
        match outbound.send(frame).await {
            Ok(()) => Delivery::Local,
            Err(_) => {
                tracing::warn!(session_id = %id, "Write to outbound stream failed, closing session");
                self.close(id);
                Delivery::Discarded
            }
        }
    }

    async fn bridge(&self, id: &SessionId, frame: Frame) -> Delivery {
        match self
            .publish(id, &BridgeMessage::Frame { payload: frame })
            .await
        {
            Ok(0) => {
                tracing::debug!(session_id = %id, "No instance holds session, discarding frame");
                Delivery::Discarded
            }
            Ok(receivers) => Delivery::Bridged { receivers },
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Bridge publish failed");
                Delivery::Discarded
            }
        }
    }

    /// Publish a bridge message on a session's channel
    pub async fn publish(&self, id: &SessionId, message: &BridgeMessage) -> SessionResult<usize> {
        let payload = serde_json::to_string(message)?;
        Ok(self.bus.publish(&session_channel(id), payload).await?)
    }

    /// Subscribe to a session's channel. Undecodable messages are skipped.
    pub async fn subscribe(&self, id: &SessionId) -> SessionResult<BoxStream<'static, BridgeMessage>> {
        let raw = self.bus.subscribe(&session_channel(id)).await?;
        let session_id = id.clone();
        let messages = raw.filter_map(move |payload| {
            let session_id = session_id.clone();
            async move {
                match serde_json::from_str::<BridgeMessage>(&payload) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::warn!(session_id = %session_id, error = %e, "Dropping malformed bridge message");
                        None
                    }
                }
            }
        });
        Ok(messages.boxed())
    }

    /// Close sessions with nothing in flight and no activity for `max_idle`
    pub fn close_idle(&self, max_idle: Duration) -> Vec<SessionId> {
        let Ok(max_idle) = chrono::Duration::from_std(max_idle) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - max_idle;

        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_idle_since(cutoff))
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|id| self.close_if_idle(id, cutoff))
            .collect()
    }

    /// Close a session only if it is still idle; activity since the sweep
    /// started keeps it open
    fn close_if_idle(&self, id: &SessionId, cutoff: DateTime<Utc>) -> bool {
        match self
            .sessions
            .remove_if(id, |_, entry| entry.is_idle_since(cutoff))
        {
            Some((_, entry)) => {
                tracing::info!(session_id = %id, "Closing idle session");
                self.teardown(id, entry);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(LocalBus::new()))
    }

    #[test]
    fn test_open_and_close() {
        let store = store();
        let session = store.create(TransportMode::Sse);
        assert_eq!(session.state, SessionState::Connecting);
        assert_eq!(store.len(), 1);

        let closed = store.close(&session.id).unwrap();
        assert_eq!(closed.state, SessionState::Closed);
        assert!(store.is_empty());

        // Second close is a no-op
        assert!(store.close(&session.id).is_none());
    }

    #[test]
    fn test_open_rejects_duplicate_id() {
        let store = store();
        let id = SessionId::new("fixed");
        store.open(id.clone(), TransportMode::Sse).unwrap();

        let err = store.open(id, TransportMode::StreamingHttp).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));
    }

    #[test]
    fn test_touch_unknown_session() {
        let store = store();
        let err = store.touch(&SessionId::new("missing")).unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession(_)));
    }

    #[test]
    fn test_state_transitions() {
        let store = store();
        let id = store.create(TransportMode::StreamingHttp).id;

        store.touch(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().state, SessionState::Open);

        store.begin_request(&id, "1", None).unwrap();
        let session = store.get(&id).unwrap();
        assert_eq!(session.state, SessionState::Dispatching);
        assert_eq!(session.in_flight, 1);

        assert!(store.cancel_request(&id, "1"));
        assert_eq!(store.get(&id).unwrap().state, SessionState::Idle);
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let store = store();
        let id = store.create(TransportMode::Sse).id;

        store.begin_request(&id, "7", None).unwrap();
        let err = store.begin_request(&id, "7", None).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateRequest { .. }));
    }

    #[tokio::test]
    async fn test_deliver_exactly_once() {
        let store = store();
        let id = store.create(TransportMode::Sse).id;
        let (tx, mut rx) = mpsc::channel(8);
        store.attach_outbound(&id, tx).await.unwrap();

        store.begin_request(&id, "1", None).unwrap();
        assert_eq!(store.deliver(&id, "1", "first".to_string()).await, Delivery::Local);
        assert_eq!(store.deliver(&id, "1", "second".to_string()).await, Delivery::Discarded);

        assert_eq!(rx.recv().await.unwrap(), "first");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_requests_answered_out_of_order() {
        let store = store();
        let id = store.create(TransportMode::Sse).id;
        let (tx, mut rx) = mpsc::channel(8);
        store.attach_outbound(&id, tx).await.unwrap();

        store.begin_request(&id, "a", None).unwrap();
        store.begin_request(&id, "b", None).unwrap();

        let slow = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store.deliver(&id, "a", "answer-a".to_string()).await
            })
        };
        let fast = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move { store.deliver(&id, "b", "answer-b".to_string()).await })
        };

        assert_eq!(fast.await.unwrap(), Delivery::Local);
        assert_eq!(slow.await.unwrap(), Delivery::Local);

        assert_eq!(rx.recv().await.unwrap(), "answer-b");
        assert_eq!(rx.recv().await.unwrap(), "answer-a");
        assert_eq!(store.get(&id).unwrap().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_and_discards_late_result() {
        let store = store();
        let id = store.create(TransportMode::Sse).id;
        let (tx, mut rx) = mpsc::channel(8);
        store.attach_outbound(&id, tx).await.unwrap();

        store.begin_request(&id, "1", None).unwrap();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        assert!(store.track_request(&id, "1", task.abort_handle()));

        store.close(&id).unwrap();

        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(store.deliver(&id, "1", "late".to_string()).await, Delivery::Discarded);
        // Outbound sender dropped with the session
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reply_route_takes_precedence() {
        let store = store();
        let id = store.create(TransportMode::StreamingHttp).id;
        let (reply_tx, mut reply_rx) = mpsc::channel(8);

        store.begin_request(&id, "1", Some(reply_tx)).unwrap();
        assert_eq!(store.deliver(&id, "1", "reply".to_string()).await, Delivery::Reply);
        assert_eq!(reply_rx.recv().await.unwrap(), "reply");
        // The in-flight entry held the only sender
        assert!(reply_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_second_outbound_rejected() {
        let store = store();
        let id = store.create(TransportMode::Sse).id;
        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);

        store.attach_outbound(&id, tx1).await.unwrap();
        let err = store.attach_outbound(&id, tx2).await.unwrap_err();
        assert!(matches!(err, SessionError::OutboundAttached(_)));
    }

    #[tokio::test]
    async fn test_dead_outbound_closes_session() {
        let store = store();
        let id = store.create(TransportMode::Sse).id;
        let (tx, rx) = mpsc::channel(8);
        store.attach_outbound(&id, tx).await.unwrap();
        drop(rx);

        store.begin_request(&id, "1", None).unwrap();
        assert_eq!(store.deliver(&id, "1", "x".to_string()).await, Delivery::Discarded);
        assert!(!store.contains(&id));
    }

    #[tokio::test]
    async fn test_cross_instance_bridge() {
        let bus: Arc<dyn SessionBus> = Arc::new(LocalBus::new());
        let holder = SessionStore::new(bus.clone());
        let other = SessionStore::new(bus);

        let id = holder.create(TransportMode::Sse).id;
        let (tx, mut rx) = mpsc::channel(8);
        holder.attach_outbound(&id, tx).await.unwrap();

        assert_eq!(holder.locate(&id).await, Some(Location::Local));
        assert_eq!(other.locate(&id).await, Some(Location::Remote));
        assert_eq!(other.locate(&SessionId::new("nobody")).await, None);

        let delivery = other.send(&id, "from-other".to_string()).await;
        assert_eq!(delivery, Delivery::Bridged { receivers: 1 });
        assert_eq!(rx.recv().await.unwrap(), "from-other");
    }

    #[tokio::test]
    async fn test_close_everywhere_reaches_holder() {
        let bus: Arc<dyn SessionBus> = Arc::new(LocalBus::new());
        let holder = SessionStore::new(bus.clone());
        let other = SessionStore::new(bus);

        let id = holder.create(TransportMode::Sse).id;
        let (tx, mut rx) = mpsc::channel(8);
        holder.attach_outbound(&id, tx).await.unwrap();

        assert!(!other.close_everywhere(&id).await.unwrap());

        // Stream ends once the holder tears the session down
        assert!(rx.recv().await.is_none());
        assert!(!holder.contains(&id));
    }

    #[tokio::test]
    async fn test_listening_session_answers_probes_without_outbound() {
        let bus: Arc<dyn SessionBus> = Arc::new(LocalBus::new());
        let holder = SessionStore::new(bus.clone());
        let other = SessionStore::new(bus);

        let id = holder.create(TransportMode::StreamingHttp).id;
        assert_eq!(other.locate(&id).await, None);

        holder.listen(&id).await.unwrap();
        holder.listen(&id).await.unwrap();
        assert_eq!(other.locate(&id).await, Some(Location::Remote));

        // Bridged frames with nowhere to go are dropped, session survives
        assert_eq!(
            other.send(&id, "orphan".to_string()).await,
            Delivery::Bridged { receivers: 1 }
        );
        tokio::task::yield_now().await;
        assert!(holder.contains(&id));
    }

    #[tokio::test]
    async fn test_detach_keeps_session() {
        let store = store();
        let id = store.create(TransportMode::Sse).id;
        let (tx, _rx) = mpsc::channel(8);
        store.attach_outbound(&id, tx).await.unwrap();

        store.detach_outbound(&id);
        let session = store.get(&id).unwrap();
        assert!(!session.outbound_attached);

        // A new stream may attach afterwards
        let (tx, _rx) = mpsc::channel(8);
        store.attach_outbound(&id, tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_all_ends_streams() {
        let store = store();
        let sse = store.create(TransportMode::Sse).id;
        store.create(TransportMode::StreamingHttp);
        let (tx, mut rx) = mpsc::channel(8);
        store.attach_outbound(&sse, tx).await.unwrap();

        assert_eq!(store.close_all(), 2);
        assert!(store.is_empty());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_close_idle() {
        let store = store();
        let idle = store.create(TransportMode::StreamingHttp).id;
        let busy = store.create(TransportMode::StreamingHttp).id;
        store.begin_request(&busy, "1", None).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let closed = store.close_idle(Duration::from_millis(10));

        assert_eq!(closed, vec![idle.clone()]);
        assert!(!store.contains(&idle));
        assert!(store.contains(&busy));
    }

    #[test]
    fn test_idle_close_rechecks_activity() {
        let store = store();
        let touched = store.create(TransportMode::StreamingHttp).id;
        let started = store.create(TransportMode::StreamingHttp).id;

        std::thread::sleep(Duration::from_millis(20));
        let cutoff = Utc::now();

        // Activity lands after the sweep picked its candidates
        std::thread::sleep(Duration::from_millis(5));
        store.touch(&touched).unwrap();
        store.begin_request(&started, "1", None).unwrap();

        assert!(!store.close_if_idle(&touched, cutoff));
        assert!(!store.close_if_idle(&started, cutoff));
        assert!(store.contains(&touched));
        assert!(store.contains(&started));
    }

    #[tokio::test]
    async fn test_closed_session_is_not_located_while_bridge_winds_down() {
        let store = store();
        let id = store.create(TransportMode::StreamingHttp).id;
        store.listen(&id).await.unwrap();
        assert_eq!(store.locate(&id).await, Some(Location::Local));

        store.close(&id);
        assert_eq!(store.locate(&id).await, None);

        // Reopening the same id clears the record
        store.open(id.clone(), TransportMode::StreamingHttp).unwrap();
        assert_eq!(store.locate(&id).await, Some(Location::Local));
    }
}
