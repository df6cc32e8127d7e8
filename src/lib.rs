// Pharos - a layered route handler framework
//
// The facade crate re-exports the core building blocks (handler registration,
// layered configuration, response dispatch) together with the session
// middleware and its storage backends.

pub use pharos_core::*;

pub use pharos_session::{
    generate_session_id, CookieBackend, CookieBackendConfig, MemoryStorage, PayloadCodec,
    ServerSideBackend, ServerSideConfig, SessionBackend, SessionConfig, SessionData, SessionError,
    SessionMiddleware, SessionResult, SessionStorage, CHUNK_SIZE, ONE_DAY_IN_SECONDS,
};

/// The session subsystem, re-exported whole for qualified access.
pub use pharos_session as session;
