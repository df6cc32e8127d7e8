// Test support: in-memory transport callables
//
// These stand in for the server runtime's receive/send halves so the full
// request flow can be driven in tests without a socket.

use crate::asgi::{Connection, Message, MessageSink, MessageSource, RequestMessage, Scope};
use crate::error::Error;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Shared log of the messages a connection has sent.
pub type MessageLog = Arc<Mutex<Vec<Message>>>;

/// A `receive` callable yielding fixed body frames, then disconnect.
pub struct StaticSource {
    frames: Mutex<VecDeque<RequestMessage>>,
}

impl StaticSource {
    pub fn empty() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_body(body: Vec<u8>) -> Self {
        let mut frames = VecDeque::new();
        frames.push_back(RequestMessage::Body {
            data: body,
            more_body: false,
        });
        Self {
            frames: Mutex::new(frames),
        }
    }
}

#[async_trait]
impl MessageSource for StaticSource {
    async fn receive(&self) -> Result<RequestMessage, Error> {
        Ok(self
            .frames
            .lock()
            .pop_front()
            .unwrap_or(RequestMessage::Disconnect))
    }
}

/// A `send` callable appending every message to a shared log.
pub struct CapturingSink {
    log: MessageLog,
}

impl CapturingSink {
    pub fn new(log: MessageLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl MessageSink for CapturingSink {
    async fn send(&self, message: Message) -> Result<(), Error> {
        self.log.lock().push(message);
        Ok(())
    }
}

/// Build an HTTP connection over a capturing sink and an empty source.
/// Returns the connection and the log its sent messages land in.
pub fn http_connection(method: &str, path: &str) -> (Connection, MessageLog) {
    connection_for(Scope::http(method, path))
}

/// Build a connection for an arbitrary scope over a capturing sink.
pub fn connection_for(scope: Scope) -> (Connection, MessageLog) {
    let log: MessageLog = Arc::new(Mutex::new(Vec::new()));
    let connection = Connection::new(
        scope,
        Arc::new(StaticSource::empty()),
        Arc::new(CapturingSink::new(log.clone())),
    );
    (connection, log)
}

/// The response-start message recorded in a log, if any.
pub fn response_start(log: &MessageLog) -> Option<crate::asgi::ResponseStart> {
    log.lock().iter().find_map(|message| match message {
        Message::ResponseStart(start) => Some(start.clone()),
        _ => None,
    })
}

/// The concatenated response body recorded in a log.
pub fn response_body(log: &MessageLog) -> Vec<u8> {
    log.lock()
        .iter()
        .filter_map(|message| match message {
            Message::ResponseBody(frame) => Some(frame.body.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}
