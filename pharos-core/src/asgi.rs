// The transport-facing contract: scope, receive and send
//
// An external server runtime drives the framework through the three-callable
// shape (scope, receive, send). `Connection` bundles one inbound request's
// triple; middleware composes by wrapping the sink half.

use crate::error::Error;
use crate::handler::RouteHandler;
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Scope kind of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeType {
    Http,
    WebSocket,
}

/// Per-connection session state: a mapping of string keys to JSON values,
/// shared between the middleware that loads it and the handler that mutates it.
pub type SessionCell = Arc<Mutex<HashMap<String, Value>>>;

/// The per-connection scope. Created by the server runtime, enriched by the
/// application (route params, endpoint, session) as the request travels
/// inward.
pub struct Scope {
    pub scope_type: ScopeType,
    pub method: String,
    pub path: String,
    pub query_string: String,
    /// Request headers, keyed lower-case.
    pub headers: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    /// Arbitrary values contributed by the matched route handler; consulted
    /// by middleware (e.g. session exclusion keys).
    pub opt: HashMap<String, Value>,
    /// Per-request values produced by resolved dependency providers.
    pub state: HashMap<String, Value>,
    pub session: Option<SessionCell>,
    /// The matched route handler, populated by the application before the
    /// middleware stack runs.
    pub endpoint: Option<Arc<RouteHandler>>,
}

impl Scope {
    pub fn new(scope_type: ScopeType, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scope_type,
            method: method.into(),
            path: path.into(),
            query_string: String::new(),
            headers: HashMap::new(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
            opt: HashMap::new(),
            state: HashMap::new(),
            session: None,
            endpoint: None,
        }
    }

    /// Shorthand for an HTTP scope.
    pub fn http(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(ScopeType::Http, method, path)
    }

    /// Parse the `cookie` request header into a key/value map.
    pub fn cookies(&self) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        if let Some(raw) = self.headers.get("cookie") {
            for part in raw.split(';') {
                if let Some((key, value)) = part.trim().split_once('=') {
                    cookies.insert(key.to_string(), value.to_string());
                }
            }
        }
        cookies
    }
}

/// The start of an HTTP response: status and headers, as wire byte pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseStart {
    pub status: u16,
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
}

/// One body frame of an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseBody {
    pub body: Vec<u8>,
    pub more_body: bool,
}

/// Outgoing messages sent through the `send` half of the contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    ResponseStart(ResponseStart),
    ResponseBody(ResponseBody),
}

/// Incoming messages read from the `receive` half of the contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestMessage {
    Body { data: Vec<u8>, more_body: bool },
    Disconnect,
}

/// The `receive` callable.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn receive(&self) -> Result<RequestMessage, Error>;
}

/// The `send` callable. Middleware wraps this to observe or mutate outgoing
/// messages before they reach the transport.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), Error>;
}

/// An abstraction over one inbound request's scope/receive/send triple.
///
/// Cloning is cheap; clones share the same scope and transport callables.
#[derive(Clone)]
pub struct Connection {
    scope: Arc<Mutex<Scope>>,
    source: Arc<dyn MessageSource>,
    sink: Arc<dyn MessageSink>,
}

impl Connection {
    pub fn new(scope: Scope, source: Arc<dyn MessageSource>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            scope: Arc::new(Mutex::new(scope)),
            source,
            sink,
        }
    }

    /// Lock and access the scope.
    pub fn scope(&self) -> MutexGuard<'_, Scope> {
        self.scope.lock()
    }

    /// Rebuild this connection with a different sink, sharing the scope and
    /// source. This is how middleware intercepts outgoing messages.
    pub fn with_sink(&self, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            scope: self.scope.clone(),
            source: self.source.clone(),
            sink,
        }
    }

    pub fn sink(&self) -> Arc<dyn MessageSink> {
        self.sink.clone()
    }

    pub fn method(&self) -> String {
        self.scope().method.clone()
    }

    pub fn path(&self) -> String {
        self.scope().path.clone()
    }

    /// Case-insensitive request header lookup.
    pub fn header(&self, name: &str) -> Option<String> {
        self.scope().headers.get(&name.to_lowercase()).cloned()
    }

    /// Request cookies parsed from the `cookie` header.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.scope().cookies()
    }

    pub fn path_param(&self, name: &str) -> Option<String> {
        self.scope().path_params.get(name).cloned()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.scope().query_params.get(name).cloned()
    }

    /// A value resolved from the layered dependency providers.
    pub fn state(&self, name: &str) -> Option<Value> {
        self.scope().state.get(name).cloned()
    }

    /// An opt value contributed by the matched route handler.
    pub fn opt(&self, key: &str) -> Option<Value> {
        self.scope().opt.get(key).cloned()
    }

    /// The session cell, if session middleware is active for this connection.
    pub fn session_cell(&self) -> Option<SessionCell> {
        self.scope().session.clone()
    }

    /// Install a fresh session mapping into the scope.
    pub fn set_session(&self, data: HashMap<String, Value>) {
        self.scope().session = Some(Arc::new(Mutex::new(data)));
    }

    /// Snapshot the current session mapping, if any.
    pub fn session_snapshot(&self) -> Option<HashMap<String, Value>> {
        self.session_cell().map(|cell| cell.lock().clone())
    }

    /// Set one session value, creating the mapping if the middleware installed
    /// an empty one.
    pub fn set_session_value(&self, key: impl Into<String>, value: Value) {
        if let Some(cell) = self.session_cell() {
            cell.lock().insert(key.into(), value);
        }
    }

    pub fn session_value(&self, key: &str) -> Option<Value> {
        self.session_cell().and_then(|cell| cell.lock().get(key).cloned())
    }

    pub async fn send(&self, message: Message) -> Result<(), Error> {
        self.sink.send(message).await
    }

    pub async fn receive(&self) -> Result<RequestMessage, Error> {
        self.source.receive().await
    }

    /// Drain the request body.
    pub async fn body(&self) -> Result<Vec<u8>, Error> {
        let mut body = Vec::new();
        loop {
            match self.receive().await? {
                RequestMessage::Body { data, more_body } => {
                    body.extend_from_slice(&data);
                    if !more_body {
                        break;
                    }
                }
                RequestMessage::Disconnect => break,
            }
        }
        Ok(body)
    }
}

/// Anything callable as an application: the app itself, a middleware wrapping
/// it, or a raw handler returned from a route.
#[async_trait]
pub trait AsgiService: Send + Sync {
    async fn call(&self, connection: Connection) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_cookie_parsing() {
        let mut scope = Scope::http("GET", "/");
        scope
            .headers
            .insert("cookie".to_string(), "session=abc; theme=dark".to_string());
        let cookies = scope.cookies();
        assert_eq!(cookies.get("session"), Some(&"abc".to_string()));
        assert_eq!(cookies.get("theme"), Some(&"dark".to_string()));
    }

    #[test]
    fn test_session_cell_shared_between_clones() {
        let (connection, _log) = crate::testing::http_connection("GET", "/");
        connection.set_session(HashMap::new());
        let clone = connection.clone();
        clone.set_session_value("user", serde_json::json!(1));
        assert_eq!(connection.session_value("user"), Some(serde_json::json!(1)));
    }
}
