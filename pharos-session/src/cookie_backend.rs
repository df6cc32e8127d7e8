// Client-side session backend: the full session travels in cookies
//
// The session mapping is serialized to JSON, passed through an optional
// payload codec (compression, encryption) and base64-encoded. Payloads larger
// than one cookie's budget are split into numbered segment cookies and
// reassembled byte-identical on load. No server-side state is held.

use crate::backend::{SessionBackend, SessionData};
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use pharos_core::{Connection, Message};
use std::sync::Arc;

/// Maximum number of value bytes carried by one session cookie.
pub const CHUNK_SIZE: usize = 4096;

/// A reversible transform applied to the serialized payload before base64
/// encoding, e.g. compression or encryption.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, data: &[u8]) -> SessionResult<Vec<u8>>;
    fn decode(&self, data: &[u8]) -> SessionResult<Vec<u8>>;
}

/// Configuration for the client-side cookie backend.
#[derive(Clone)]
pub struct CookieBackendConfig {
    pub base: SessionConfig,
    pub codec: Option<Arc<dyn PayloadCodec>>,
}

impl CookieBackendConfig {
    pub fn new(base: SessionConfig) -> Self {
        Self { base, codec: None }
    }

    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = Some(codec);
        self
    }
}

/// Stateless session backend storing the session in (possibly chunked)
/// cookies.
pub struct CookieBackend {
    pub config: CookieBackendConfig,
}

impl CookieBackend {
    pub fn new(config: CookieBackendConfig) -> SessionResult<Self> {
        config.base.validate()?;
        Ok(Self { config })
    }

    fn encode_payload(&self, data: &SessionData) -> SessionResult<String> {
        let mut raw =
            serde_json::to_vec(data).map_err(|e| SessionError::Serialization(e.to_string()))?;
        if let Some(codec) = &self.config.codec {
            raw = codec.encode(&raw)?;
        }
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    fn decode_payload(&self, value: &str) -> SessionResult<SessionData> {
        let mut raw = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| SessionError::Deserialization(e.to_string()))?;
        if let Some(codec) = &self.config.codec {
            raw = codec.decode(&raw)?;
        }
        serde_json::from_slice(&raw).map_err(|e| SessionError::Deserialization(e.to_string()))
    }

    /// Reassemble the serialized payload from the request cookies: the bare
    /// key when unchunked, otherwise the numbered segments in order.
    fn payload_from_cookies(&self, cookies: &std::collections::HashMap<String, String>) -> String {
        let key = &self.config.base.key;
        if let Some(value) = cookies.get(key) {
            return value.clone();
        }
        let mut value = String::new();
        let mut segment = 1usize;
        while let Some(part) = cookies.get(&format!("{key}-{segment}")) {
            value.push_str(part);
            segment += 1;
        }
        value
    }

    /// Request cookie names owned by this backend.
    fn matching_cookie_names(
        &self,
        cookies: &std::collections::HashMap<String, String>,
    ) -> Vec<String> {
        let key = &self.config.base.key;
        cookies
            .keys()
            .filter(|name| {
                *name == key
                    || name
                        .strip_prefix(&format!("{key}-"))
                        .is_some_and(|suffix| suffix.parse::<usize>().is_ok())
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionBackend for CookieBackend {
    fn config(&self) -> &SessionConfig {
        &self.config.base
    }

    async fn load_from_connection(&self, connection: &Connection) -> SessionResult<SessionData> {
        let cookies = connection.cookies();
        let payload = self.payload_from_cookies(&cookies);
        if payload.is_empty() {
            return Ok(SessionData::new());
        }
        match self.decode_payload(&payload) {
            Ok(data) => Ok(data),
            Err(error) => {
                // a malformed client cookie is not a server failure
                tracing::debug!(error = %error, "discarding undecodable session cookie");
                Ok(SessionData::new())
            }
        }
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

        let request_names = self.matching_cookie_names(&connection.cookies());
        let key = self.config.base.key.clone();

        let session = session.unwrap_or_default();
        if session.is_empty() {
            for name in request_names {
                start
                    .headers
                    .push(self.config.base.clearing_cookie(name).to_encoded_header());
            }
            return Ok(());
        }

        let payload = self.encode_payload(&session)?;
        let mut issued: Vec<String> = Vec::new();
        if payload.len() <= CHUNK_SIZE {
            start
                .headers
                .push(self.config.base.cookie(key.as_str(), payload).to_encoded_header());
            issued.push(key.clone());
        } else {
            let bytes = payload.as_bytes();
            for (index, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
                let name = format!("{key}-{}", index + 1);
                // base64 is ASCII so chunking on byte boundaries is safe
                let value = std::str::from_utf8(chunk)
                    .map_err(|e| SessionError::Serialization(e.to_string()))?;
                start
                    .headers
                    .push(self.config.base.cookie(name.as_str(), value).to_encoded_header());
                issued.push(name);
            }
        }

        // expire cookies from a previous, differently-chunked session
        for name in request_names {
            if !issued.contains(&name) {
                start
                    .headers
                    .push(self.config.base.clearing_cookie(name).to_encoded_header());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharos_core::asgi::{ResponseStart, Scope};
    use pharos_core::testing::connection_for;
    use serde_json::json;

    fn backend() -> CookieBackend {
        CookieBackend::new(CookieBackendConfig::new(SessionConfig::new("session"))).unwrap()
    }

    fn start_message() -> Message {
        Message::ResponseStart(ResponseStart {
            status: 200,
            headers: Vec::new(),
        })
    }

    fn set_cookie_values(message: &Message) -> Vec<String> {
        match message {
            Message::ResponseStart(start) => start
                .headers
                .iter()
                .filter(|(name, _)| name == b"set-cookie")
                .map(|(_, value)| String::from_utf8_lossy(value).to_string())
                .collect(),
            _ => panic!("expected a response start message"),
        }
    }

    /// Extract `name=value` pairs from emitted Set-Cookie headers, ignoring
    /// cleared cookies.
    fn issued_cookie_pairs(message: &Message) -> Vec<(String, String)> {
        set_cookie_values(message)
            .iter()
            .filter(|header| !header.contains("Max-Age=0"))
            .map(|header| {
                let pair = header.split(';').next().unwrap();
                let (name, value) = pair.split_once('=').unwrap();
                (name.to_string(), value.to_string())
            })
            .collect()
    }

    fn connection_with_cookies(pairs: &[(String, String)]) -> Connection {
        let mut scope = Scope::http("GET", "/");
        let header = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        scope.headers.insert("cookie".to_string(), header);
        connection_for(scope).0
    }

    fn large_session() -> SessionData {
        let mut data = SessionData::new();
        data.insert("blob".to_string(), json!("x".repeat(3 * CHUNK_SIZE)));
        data
    }

    #[tokio::test]
    async fn test_round_trip_single_cookie() {
        let backend = backend();
        let mut data = SessionData::new();
        data.insert("user".to_string(), json!({"id": 1, "name": "alice"}));

        let mut message = start_message();
        let (connection, _log) = pharos_core::testing::http_connection("GET", "/");
        backend
            .store_in_message(Some(data.clone()), &mut message, &connection)
            .await
            .unwrap();

        let pairs = issued_cookie_pairs(&message);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "session");

        let reload = connection_with_cookies(&pairs);
        let restored = backend.load_from_connection(&reload).await.unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_chunked_and_reassembled() {
        let backend = backend();
        let data = large_session();

        let mut message = start_message();
        let (connection, _log) = pharos_core::testing::http_connection("GET", "/");
        backend
            .store_in_message(Some(data.clone()), &mut message, &connection)
            .await
            .unwrap();

        let pairs = issued_cookie_pairs(&message);
        assert!(pairs.len() > 1, "expected segment cookies, got {pairs:?}");
        for (index, (name, value)) in pairs.iter().enumerate() {
            assert_eq!(name, &format!("session-{}", index + 1));
            assert!(value.len() <= CHUNK_SIZE);
        }

        let reload = connection_with_cookies(&pairs);
        let restored = backend.load_from_connection(&reload).await.unwrap();
        assert_eq!(restored, data);
    }

    #[tokio::test]
    async fn test_stale_segments_are_cleared_when_payload_shrinks() {
        let backend = backend();

        // previous response chunked the session into three segments
        let previous = [
            ("session-1".to_string(), "a".to_string()),
            ("session-2".to_string(), "b".to_string()),
            ("session-3".to_string(), "c".to_string()),
        ];
        let connection = connection_with_cookies(&previous);

        let mut small = SessionData::new();
        small.insert("k".to_string(), json!(1));
        let mut message = start_message();
        backend
            .store_in_message(Some(small), &mut message, &connection)
            .await
            .unwrap();

        let headers = set_cookie_values(&message);
        assert!(headers.iter().any(|h| h.starts_with("session=")));
        for segment in ["session-1", "session-2", "session-3"] {
            assert!(
                headers
                    .iter()
                    .any(|h| h.starts_with(&format!("{segment}=null")) && h.contains("Max-Age=0")),
                "expected {segment} to be cleared"
            );
        }
    }

    #[tokio::test]
    async fn test_empty_session_clears_existing_cookies() {
        let backend = backend();
        let existing = [("session".to_string(), "stale".to_string())];
        let connection = connection_with_cookies(&existing);

        let mut message = start_message();
        backend
            .store_in_message(Some(SessionData::new()), &mut message, &connection)
            .await
            .unwrap();

        let headers = set_cookie_values(&message);
        assert_eq!(headers.len(), 1);
        assert!(headers[0].starts_with("session=null"));
        assert!(headers[0].contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_undecodable_cookie_yields_empty_session() {
        let backend = backend();
        let garbage = [("session".to_string(), "!!not-base64!!".to_string())];
        let connection = connection_with_cookies(&garbage);
        let restored = backend.load_from_connection(&connection).await.unwrap();
        assert!(restored.is_empty());
    }

    #[tokio::test]
    async fn test_non_start_messages_pass_untouched() {
        let backend = backend();
        let mut message = Message::ResponseBody(pharos_core::asgi::ResponseBody {
            body: b"data".to_vec(),
            more_body: false,
        });
        let original = message.clone();
        let (connection, _log) = pharos_core::testing::http_connection("GET", "/");
        backend
            .store_in_message(Some(large_session()), &mut message, &connection)
            .await
            .unwrap();
        assert_eq!(message, original);
    }
}
