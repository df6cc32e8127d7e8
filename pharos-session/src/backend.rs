// Session backend contract
//
// A backend bridges one storage mechanism and the session middleware. It
// loads session data from an inbound connection and persists it into the
// outgoing response-start message, where it may inject Set-Cookie headers.

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use pharos_core::{Connection, Message};
use serde_json::Value;
use std::collections::HashMap;

/// Session data for one connection.
pub type SessionData = HashMap<String, Value>;

/// Abstract session backend defining the interface between a storage
/// mechanism and the session middleware. Created once per middleware
/// instance and shared across all requests.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// The configuration this backend was created with.
    fn config(&self) -> &SessionConfig;

    /// Serialize session data into bytes for storage.
    fn serialize_data(&self, data: &SessionData) -> SessionResult<Vec<u8>> {
        serde_json::to_vec(data).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    /// Deserialize stored bytes back into session data.
    fn deserialize_data(&self, raw: &[u8]) -> SessionResult<SessionData> {
        serde_json::from_slice(raw).map_err(|e| SessionError::Deserialization(e.to_string()))
    }

    /// Load session data from a connection. Must not modify the connection's
    /// scope; the middleware stores the returned mapping there.
    async fn load_from_connection(&self, connection: &Connection) -> SessionResult<SessionData>;

    /// Persist the session into the outgoing response-start message, with the
    /// opportunity to mutate it (e.g. inject Set-Cookie headers) before it is
    /// forwarded to the transport.
    async fn store_in_message(
        &self,
        session: Option<SessionData>,
        message: &mut Message,
        connection: &Connection,
    ) -> SessionResult<()>;
}
