// Session middleware
//
// Per connection: load the session through the backend, store it in the
// scope, delegate to the wrapped application with a send wrapper that
// persists the session into the response-start message before it is
// forwarded. All other messages pass through untouched.

use crate::backend::SessionBackend;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use pharos_core::asgi::Scope;
use pharos_core::{AsgiService, Connection, Error, Message, MessageSink, MiddlewareFactory};
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// ASGI-level middleware storing session data for the wrapped application.
pub struct SessionMiddleware {
    app: Arc<dyn AsgiService>,
    backend: Arc<dyn SessionBackend>,
    exclude: Option<Regex>,
}

impl SessionMiddleware {
    pub fn new(app: Arc<dyn AsgiService>, backend: Arc<dyn SessionBackend>) -> SessionResult<Self> {
        backend.config().validate()?;
        let exclude = compile_exclude(&backend.config().exclude)?;
        Ok(Self {
            app,
            backend,
            exclude,
        })
    }

    /// A middleware factory for the application builder:
    /// `App::builder().middleware(SessionMiddleware::factory(backend)?)`.
    pub fn factory(backend: Arc<dyn SessionBackend>) -> SessionResult<MiddlewareFactory> {
        backend.config().validate()?;
        let exclude = compile_exclude(&backend.config().exclude)?;
        Ok(Arc::new(move |app| {
            Arc::new(SessionMiddleware {
                app,
                backend: backend.clone(),
                exclude: exclude.clone(),
            })
        }))
    }

    fn should_bypass(&self, scope: &Scope) -> bool {
        if !self.backend.config().scopes.contains(&scope.scope_type) {
            return true;
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&scope.path) {
                return true;
            }
        }
        match scope.opt.get(&self.backend.config().exclude_opt_key) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(_) => true,
        }
    }
}

fn compile_exclude(patterns: &[String]) -> SessionResult<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let joined = patterns
        .iter()
        .map(|pattern| format!("({pattern})"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&joined)
        .map(Some)
        .map_err(|e| SessionError::Config(format!("invalid exclude pattern: {e}")))
}

#[async_trait]
impl AsgiService for SessionMiddleware {
    async fn call(&self, connection: Connection) -> Result<(), Error> {
        let bypass = {
            let scope = connection.scope();
            self.should_bypass(&scope)
        };
        if bypass {
            tracing::trace!("session middleware bypassed");
            return self.app.call(connection).await;
        }

        let data = self
            .backend
            .load_from_connection(&connection)
            .await
            .map_err(Error::from)?;
        tracing::trace!(keys = data.len(), "session loaded");
        connection.set_session(data);

        let sink = Arc::new(SessionSink {
            inner: connection.sink(),
            backend: self.backend.clone(),
            connection: connection.clone(),
        });
        self.app.call(connection.with_sink(sink)).await
    }
}

/// Send wrapper persisting the session at the response-start message, the
/// unique point where session writes happen before headers are flushed.
struct SessionSink {
    inner: Arc<dyn MessageSink>,
    backend: Arc<dyn SessionBackend>,
    connection: Connection,
}

#[async_trait]
impl MessageSink for SessionSink {
    async fn send(&self, mut message: Message) -> Result<(), Error> {
        if matches!(message, Message::ResponseStart(_)) {
            let session = self.connection.session_snapshot();
            self.backend
                .store_in_message(session, &mut message, &self.connection)
                .await
                .map_err(Error::from)?;
        }
        self.inner.send(message).await
    }
}
