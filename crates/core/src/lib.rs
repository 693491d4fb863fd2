// Session state, cross-instance bridging and credentials for mcpgate

pub mod bus;
pub mod credentials;
pub mod error;
pub mod session;

pub use bus::{BridgeMessage, BusError, LocalBus, SessionBus};
pub use credentials::{Credentials, ExternalCredential, GoogleCredentials, Provider, Secret};
pub use error::{SessionError, SessionResult};
pub use session::{
    Delivery, Frame, FrameSender, Location, Session, SessionId, SessionState, SessionStore,
    TransportMode,
};
