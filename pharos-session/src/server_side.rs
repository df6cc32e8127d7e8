// Server-side session backend: a single cookie carries an opaque id,
// the data lives in an external keyed store

use crate::backend::{SessionBackend, SessionData};
use crate::config::SessionConfig;
use crate::error::SessionResult;
use async_trait::async_trait;
use pharos_core::{Connection, Message};
use std::sync::Arc;
use std::time::Duration;

/// The external key-value store contract. Implementations must guarantee
/// atomic per-key get/set/delete under concurrent access; expiry is
/// backend-native TTL, best-effort to roughly `expires_in` precision.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, key: &str) -> SessionResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, expires_in: Duration) -> SessionResult<()>;

    /// Deleting a missing key is a no-op, not an error.
    async fn delete(&self, key: &str) -> SessionResult<()>;
}

#[async_trait]
impl<S: SessionStorage + ?Sized> SessionStorage for Arc<S> {
    async fn get(&self, key: &str) -> SessionResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_in: Duration) -> SessionResult<()> {
        (**self).set(key, value, expires_in).await
    }

    async fn delete(&self, key: &str) -> SessionResult<()> {
        (**self).delete(key).await
    }
}

/// Generate a new opaque session identifier.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Configuration for the server-side backend.
#[derive(Clone, Debug)]
pub struct ServerSideConfig {
    pub base: SessionConfig,
    /// Re-issue the stored entry's expiry to `max_age` on each successful
    /// read.
    pub renew_on_access: bool,
}

impl ServerSideConfig {
    pub fn new(base: SessionConfig) -> Self {
        Self {
            base,
            renew_on_access: false,
        }
    }

    pub fn with_renew_on_access(mut self, renew_on_access: bool) -> Self {
        self.renew_on_access = renew_on_access;
        self
    }
}

/// Session backend holding only an opaque id client-side.
pub struct ServerSideBackend<S: SessionStorage> {
    pub config: ServerSideConfig,
    storage: S,
}

impl<S: SessionStorage> ServerSideBackend<S> {
    pub fn new(config: ServerSideConfig, storage: S) -> SessionResult<Self> {
        config.base.validate()?;
        Ok(Self { config, storage })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn max_age(&self) -> Duration {
        Duration::from_secs(self.config.base.max_age)
    }

    /// Read the stored payload for a session id, renewing the entry's expiry
    /// when `renew_on_access` is set.
    pub async fn get(&self, session_id: &str) -> SessionResult<Option<Vec<u8>>> {
        let data = self.storage.get(session_id).await?;
        if self.config.renew_on_access {
            if let Some(bytes) = &data {
                self.storage
                    .set(session_id, bytes.clone(), self.max_age())
                    .await?;
            }
        }
        Ok(data)
    }

    /// Store the payload for a session id with a fresh `max_age` expiry.
    pub async fn set(&self, session_id: &str, data: Vec<u8>) -> SessionResult<()> {
        self.storage.set(session_id, data, self.max_age()).await
    }

    pub async fn delete(&self, session_id: &str) -> SessionResult<()> {
        self.storage.delete(session_id).await
    }

    fn session_id_from_connection(&self, connection: &Connection) -> Option<String> {
        connection.cookies().get(&self.config.base.key).cloned()
    }
}

#[async_trait]
impl<S: SessionStorage> SessionBackend for ServerSideBackend<S> {
    fn config(&self) -> &SessionConfig {
        &self.config.base
    }

    async fn load_from_connection(&self, connection: &Connection) -> SessionResult<SessionData> {
        if let Some(session_id) = self.session_id_from_connection(connection) {
            if let Some(raw) = self.get(&session_id).await? {
                return self.deserialize_data(&raw);
            }
        }
        Ok(SessionData::new())
    }

    async fn store_in_message(
        &self,
        session: Option<SessionData>,
        message: &mut Message,
        connection: &Connection,
    ) -> SessionResult<()> {
        let Message::ResponseStart(start) = message else {
            return Ok(());
        };

        let session_id = self
            .session_id_from_connection(connection)
            .unwrap_or_else(generate_session_id);

        let session = session.unwrap_or_default();
        if session.is_empty() {
            self.delete(&session_id).await?;
            start.headers.push(
                self.config
                    .base
                    .clearing_cookie(self.config.base.key.as_str())
                    .to_encoded_header(),
            );
            return Ok(());
        }

        let raw = self.serialize_data(&session)?;
        self.set(&session_id, raw).await?;
        start.headers.push(
            self.config
                .base
                .cookie(self.config.base.key.as_str(), session_id)
                .to_encoded_header(),
        );
        Ok(())
    }
}
