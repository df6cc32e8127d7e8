// Transport-ready response representation

use crate::asgi::{Message, ResponseBody, ResponseStart};
use crate::error::Error;
use crate::headers::{encode_latin1, Cookie};
use crate::http::MediaType;
use crate::status::allows_body;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A task executed after the response messages have been sent.
#[derive(Clone)]
pub struct BackgroundTask {
    name: String,
    task: Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>,
}

impl BackgroundTask {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            task: Arc::new(move || Box::pin(f())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self) {
        (self.task)().await;
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask").field("name", &self.name).finish()
    }
}

/// HTTP response assembled by the dispatch strategies.
#[derive(Clone, Debug)]
pub struct Response {
    pub status_code: u16,
    pub media_type: MediaType,
    pub headers: HashMap<String, String>,
    pub cookies: Vec<Cookie>,
    /// Precomputed wire header byte pairs (lower-cased latin-1). When
    /// non-empty these replace `headers` on the wire; set by the generic data
    /// strategy which bakes resolved headers and cookies once per handler.
    pub raw_headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub body: Vec<u8>,
    pub background: Option<BackgroundTask>,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            media_type: MediaType::Json,
            headers: HashMap::new(),
            cookies: Vec::new(),
            raw_headers: Vec::new(),
            body: Vec::new(),
            background: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.media_type = MediaType::Text;
        self.body = text.into().into_bytes();
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.media_type = MediaType::Json;
        Ok(self)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_background(mut self, task: BackgroundTask) -> Self {
        self.background = Some(task);
        self
    }

    pub fn set_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    /// Build the wire header list: precomputed raw pairs when present,
    /// otherwise the normalized header map, plus a content-type header when
    /// absent and one `set-cookie` pair per non-documentation cookie.
    pub fn encode_headers(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut encoded: Vec<(Vec<u8>, Vec<u8>)> = if self.raw_headers.is_empty() {
            let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = self
                .headers
                .iter()
                .map(|(name, value)| (encode_latin1(&name.to_lowercase()), encode_latin1(value)))
                .collect();
            pairs.sort();
            pairs
        } else {
            self.raw_headers.clone()
        };

        if !encoded.iter().any(|(name, _)| name == b"content-type") {
            encoded.push((
                b"content-type".to_vec(),
                encode_latin1(self.media_type.as_str()),
            ));
        }

        for cookie in &self.cookies {
            if !cookie.documentation_only {
                encoded.push(cookie.to_encoded_header());
            }
        }

        encoded
    }

    /// Convert into the transport message pair. Bodies are suppressed for
    /// statuses that do not allow one and for HEAD responses.
    pub fn into_messages(self, suppress_body: bool) -> (Message, Message) {
        let headers = self.encode_headers();
        let body = if suppress_body || !allows_body(self.status_code) {
            Vec::new()
        } else {
            self.body
        };
        (
            Message::ResponseStart(ResponseStart {
                status: self.status_code,
                headers,
            }),
            Message::ResponseBody(ResponseBody {
                body,
                more_body: false,
            }),
        )
    }
}

/// Content handed to a response factory by the generic data strategy.
#[derive(Clone, Debug)]
pub enum ResponseContent {
    None,
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

/// Arguments to a response factory.
pub struct ResponseArgs {
    pub content: ResponseContent,
    pub status_code: u16,
    pub media_type: MediaType,
    pub background: Option<BackgroundTask>,
}

/// The "response class": builds a `Response` from handler data. Overridable
/// per layer, with the closest override winning.
pub type ResponseFactory = Arc<dyn Fn(ResponseArgs) -> Result<Response, Error> + Send + Sync>;

/// The default response construction used when no layer overrides it.
pub fn default_response_factory() -> ResponseFactory {
    Arc::new(|args: ResponseArgs| {
        let mut response = Response::new(args.status_code).with_media_type(args.media_type);
        response.background = args.background;
        response.body = match args.content {
            ResponseContent::None => Vec::new(),
            ResponseContent::Text(text) => text.into_bytes(),
            ResponseContent::Bytes(bytes) => bytes,
            ResponseContent::Json(value) => {
                serde_json::to_vec(&value).map_err(|e| Error::Serialization(e.to_string()))?
            }
        };
        Ok(response)
    })
}
