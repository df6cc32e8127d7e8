// Route handler registration, validation and layered resolution
//
// A route handler is declared through a builder (semantic constructors for
// the common verbs, `route` for explicit method sets), validated once at
// registration, and frozen into an ownership chain when the application is
// built. All chain resolutions are memoized after the freeze.

use crate::asgi::{AsgiService, Connection};
use crate::containers::ResponseContainer;
use crate::dispatch::{DispatchResult, ResponseStrategy};
use crate::dto::DtoSpec;
use crate::error::Error;
use crate::headers::{CacheControlHeader, Cookie, Etag, ResponseHeader};
use crate::hooks::{
    AfterRequestHook, AfterResponseHook, BeforeRequestHook, ExceptionHandler, Provider,
};
use crate::http::{HttpMethod, MediaType};
use crate::layers::{Layer, OwnershipChain};
use crate::method::{default_status_code, normalize_http_methods, MethodSpec};
use crate::plugins::SerializationPlugin;
use crate::response::{BackgroundTask, Response, ResponseFactory};
use crate::status::{allows_body, is_redirect_status, REDIRECT_STATUS_CODES};
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, OnceLock};

const MSG_SEMANTIC_ROUTE_HANDLER_WITH_HTTP: &str =
    "semantic route handlers cannot define http_method";

/// The declared return type of a route handler, bound once at registration.
/// This drives the selection of the response dispatch strategy.
#[derive(Clone, Debug)]
pub enum ReturnKind {
    /// The handler returns no body.
    None,
    Text,
    Bytes,
    /// Arbitrary JSON-serializable data.
    Data,
    /// A single DTO value; plain mappings and model instances are coerced.
    Dto(DtoSpec),
    /// An iterable of DTO values, coerced element-wise.
    DtoList(DtoSpec),
    File,
    Redirect,
    /// A prebuilt transport response.
    Response,
    /// A raw application callable.
    Asgi,
}

impl ReturnKind {
    fn is_textual(&self) -> bool {
        matches!(
            self,
            ReturnKind::Text | ReturnKind::Bytes | ReturnKind::File | ReturnKind::Redirect
        )
    }
}

/// The value a route handler actually produced at runtime.
pub enum HandlerOutput {
    None,
    Text(String),
    Bytes(Vec<u8>),
    Data(Value),
    /// A still-pending value; the data strategy awaits it first.
    Deferred(BoxFuture<'static, Result<HandlerOutput, Error>>),
    Container(ResponseContainer),
    Response(Response),
    Asgi(Arc<dyn AsgiService>),
}

impl HandlerOutput {
    pub fn deferred<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = Result<HandlerOutput, Error>> + Send + 'static,
    {
        HandlerOutput::Deferred(Box::pin(fut))
    }
}

impl std::fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandlerOutput::None => "None",
            HandlerOutput::Text(_) => "Text",
            HandlerOutput::Bytes(_) => "Bytes",
            HandlerOutput::Data(_) => "Data",
            HandlerOutput::Deferred(_) => "Deferred",
            HandlerOutput::Container(_) => "Container",
            HandlerOutput::Response(_) => "Response",
            HandlerOutput::Asgi(_) => "Asgi",
        };
        write!(f, "HandlerOutput::{name}")
    }
}

pub type AsyncHandlerFn =
    Arc<dyn Fn(Connection) -> BoxFuture<'static, Result<HandlerOutput, Error>> + Send + Sync>;
pub type SyncHandlerFn = Arc<dyn Fn(Connection) -> Result<HandlerOutput, Error> + Send + Sync>;

#[derive(Clone)]
pub enum HandlerCallable {
    Async(AsyncHandlerFn),
    Sync(SyncHandlerFn),
}

/// Response cache policy for a handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    #[default]
    Disabled,
    /// Cache with the application default expiration.
    Enabled,
    /// Cache for the given number of seconds.
    Ttl(u64),
}

/// One registered endpoint.
pub struct RouteHandler {
    paths: Vec<String>,
    http_methods: BTreeSet<HttpMethod>,
    status_code: u16,
    media_type: MediaType,
    return_kind: ReturnKind,
    name: Option<String>,
    cache: CachePolicy,
    sync_to_thread: bool,
    background: Option<BackgroundTask>,
    callable: HandlerCallable,
    layer: Layer,
    // resolved-once fields, populated when the ownership chain is frozen
    chain: OnceLock<OwnershipChain>,
    resolved_headers: OnceLock<Vec<ResponseHeader>>,
    resolved_cookies: OnceLock<Vec<Cookie>>,
    resolved_before_request: OnceLock<Option<BeforeRequestHook>>,
    resolved_after_response: OnceLock<Option<AfterResponseHook>>,
    resolved_exception_handlers: OnceLock<HashMap<u16, ExceptionHandler>>,
    resolved_dependencies: OnceLock<HashMap<String, Provider>>,
    resolved_opt: OnceLock<HashMap<String, Value>>,
    resolved_strategy: OnceLock<ResponseStrategy>,
}

impl RouteHandler {
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn http_methods(&self) -> &BTreeSet<HttpMethod> {
        &self.http_methods
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    pub fn return_kind(&self) -> &ReturnKind {
        &self.return_kind
    }

    pub fn cache(&self) -> CachePolicy {
        self.cache
    }

    pub fn background(&self) -> Option<&BackgroundTask> {
        self.background.as_ref()
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.paths.join(", "))
    }

    /// Freeze the ownership chain for this handler and populate every
    /// resolved-once field. Called exactly once, during the application build
    /// phase.
    pub fn finalize(&self, outer_layers: Vec<Layer>) -> Result<(), Error> {
        let mut layers = outer_layers;
        layers.push(self.layer.clone());
        self.chain
            .set(OwnershipChain::new(layers))
            .map_err(|_| {
                Error::Configuration(format!(
                    "route handler '{}' is already bound to an application",
                    self.display_name()
                ))
            })?;

        self.resolve_response_headers();
        self.resolve_response_cookies();
        self.resolve_before_request();
        self.resolve_after_response();
        self.resolve_exception_handlers();
        self.resolve_dependencies();
        self.resolve_opt();
        self.resolve_response_handler();
        Ok(())
    }

    fn chain(&self) -> &OwnershipChain {
        // a handler used standalone (tests, direct mounting) owns a chain of
        // just its own layer
        self.chain
            .get_or_init(|| OwnershipChain::new(vec![self.layer.clone()]))
    }

    /// The resolved response factory: closest override in the chain wins.
    pub fn resolve_response_factory(&self) -> ResponseFactory {
        self.chain().resolve_response_factory()
    }

    pub fn resolve_response_headers(&self) -> &[ResponseHeader] {
        self.resolved_headers
            .get_or_init(|| self.chain().resolve_response_headers())
    }

    pub fn resolve_response_cookies(&self) -> &[Cookie] {
        self.resolved_cookies
            .get_or_init(|| self.chain().resolve_response_cookies())
    }

    pub fn resolve_before_request(&self) -> Option<BeforeRequestHook> {
        self.resolved_before_request
            .get_or_init(|| self.chain().resolve_before_request())
            .clone()
    }

    pub fn resolve_after_request(&self) -> Option<AfterRequestHook> {
        self.chain().resolve_after_request()
    }

    pub fn resolve_after_response(&self) -> Option<AfterResponseHook> {
        self.resolved_after_response
            .get_or_init(|| self.chain().resolve_after_response())
            .clone()
    }

    pub fn resolve_exception_handlers(&self) -> &HashMap<u16, ExceptionHandler> {
        self.resolved_exception_handlers
            .get_or_init(|| self.chain().resolve_exception_handlers())
    }

    pub fn resolve_dependencies(&self) -> &HashMap<String, Provider> {
        self.resolved_dependencies
            .get_or_init(|| self.chain().resolve_dependencies())
    }

    pub fn resolve_opt(&self) -> &HashMap<String, Value> {
        self.resolved_opt.get_or_init(|| self.chain().resolve_opt())
    }

    /// Resolve the response handler strategy for this handler. The selection
    /// inspects the declared return kind exactly once and is memoized.
    pub fn resolve_response_handler(&self) -> &ResponseStrategy {
        self.resolved_strategy
            .get_or_init(|| ResponseStrategy::for_handler(self))
    }

    async fn invoke(&self, connection: Connection) -> Result<HandlerOutput, Error> {
        match &self.callable {
            HandlerCallable::Async(f) => f(connection).await,
            HandlerCallable::Sync(f) => {
                if self.sync_to_thread {
                    let f = f.clone();
                    tokio::task::spawn_blocking(move || f(connection))
                        .await
                        .map_err(|e| Error::Internal(format!("handler thread failed: {e}")))?
                } else {
                    f(connection)
                }
            }
        }
    }

    /// Convert a handler's output into a transport-ready result by resolving
    /// and applying the memoized strategy.
    pub async fn to_response(
        &self,
        output: HandlerOutput,
        plugins: &[Arc<dyn SerializationPlugin>],
    ) -> Result<DispatchResult, Error> {
        self.resolve_response_handler().to_response(output, plugins).await
    }

    /// Run the full request flow for this handler: dependencies, the
    /// before-request hook, the handler callable, response dispatch, the
    /// outgoing messages, background task and the after-response hook.
    pub async fn handle(
        &self,
        connection: Connection,
        plugins: &[Arc<dyn SerializationPlugin>],
    ) -> Result<(), Error> {
        let dependencies = self.resolve_dependencies();
        for (name, provider) in dependencies {
            let value = provider(connection.clone()).await?;
            connection.scope().state.insert(name.clone(), value);
        }

        let output = match self.resolve_before_request() {
            Some(hook) => match hook(connection.clone()).await? {
                Some(output) => {
                    tracing::debug!(handler = %self.display_name(), "before_request hook short-circuited the handler");
                    output
                }
                None => self.invoke(connection.clone()).await?,
            },
            None => self.invoke(connection.clone()).await?,
        };

        match self.to_response(output, plugins).await? {
            DispatchResult::Response(response) => {
                let background = response.background.clone();
                let suppress_body = connection.method() == "HEAD";
                let (start, body) = response.into_messages(suppress_body);
                connection.send(start).await?;
                connection.send(body).await?;
                if let Some(task) = background {
                    tracing::trace!(task = task.name(), "running background task");
                    task.run().await;
                }
            }
            DispatchResult::Asgi(service) => {
                service.call(connection.clone()).await?;
            }
        }

        if let Some(hook) = self.resolve_after_response() {
            hook(connection).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteHandler")
            .field("paths", &self.paths)
            .field("http_methods", &self.http_methods)
            .field("status_code", &self.status_code)
            .field("media_type", &self.media_type)
            .field("return_kind", &self.return_kind)
            .finish()
    }
}

/// Builder for route handlers.
pub struct RouteHandlerBuilder {
    paths: Vec<String>,
    method_spec: Option<MethodSpec>,
    semantic: bool,
    status_code: Option<u16>,
    media_type: Option<MediaType>,
    return_kind: Option<ReturnKind>,
    name: Option<String>,
    cache: CachePolicy,
    sync_to_thread: bool,
    accepts_body: bool,
    accepts_socket: bool,
    background: Option<BackgroundTask>,
    layer: Layer,
    deferred_error: Option<Error>,
}

impl RouteHandlerBuilder {
    fn new(paths: Vec<String>, method_spec: Option<MethodSpec>, semantic: bool) -> Self {
        Self {
            paths,
            method_spec,
            semantic,
            status_code: None,
            media_type: None,
            return_kind: None,
            name: None,
            cache: CachePolicy::Disabled,
            sync_to_thread: false,
            accepts_body: false,
            accepts_socket: false,
            background: None,
            layer: Layer::new(),
            deferred_error: None,
        }
    }

    /// Declare the accepted HTTP methods. Mutually exclusive with the
    /// semantic constructors.
    pub fn http_method(mut self, spec: impl Into<MethodSpec>) -> Self {
        if self.semantic {
            self.deferred_error = Some(Error::Configuration(
                MSG_SEMANTIC_ROUTE_HANDLER_WITH_HTTP.to_string(),
            ));
        } else {
            self.method_spec = Some(spec.into());
        }
        self
    }

    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    /// Declare the handler's return type. Required: untyped handlers fail
    /// registration.
    pub fn returns(mut self, return_kind: ReturnKind) -> Self {
        self.return_kind = Some(return_kind);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Run a sync callable on a worker thread instead of the event loop.
    pub fn sync_to_thread(mut self, sync_to_thread: bool) -> Self {
        self.sync_to_thread = sync_to_thread;
        self
    }

    /// Declare that the handler reads the request body.
    pub fn accepts_body(mut self) -> Self {
        self.accepts_body = true;
        self
    }

    /// Declare that the handler takes the raw socket. Unsupported on HTTP
    /// handlers; fails registration.
    pub fn accepts_socket(mut self) -> Self {
        self.accepts_socket = true;
        self
    }

    pub fn background(mut self, task: BackgroundTask) -> Self {
        self.background = Some(task);
        self
    }

    pub fn response_header(mut self, header: ResponseHeader) -> Self {
        self.layer.response_headers.push(header);
        self
    }

    pub fn response_cookie(mut self, cookie: Cookie) -> Self {
        self.layer.response_cookies.push(cookie);
        self
    }

    pub fn cache_control(mut self, header: CacheControlHeader) -> Self {
        self.layer.cache_control = Some(header);
        self
    }

    pub fn etag(mut self, etag: Etag) -> Self {
        self.layer.etag = Some(etag);
        self
    }

    pub fn before_request(mut self, hook: BeforeRequestHook) -> Self {
        self.layer.before_request = Some(hook);
        self
    }

    pub fn after_request(mut self, hook: AfterRequestHook) -> Self {
        self.layer.after_request = Some(hook);
        self
    }

    pub fn after_response(mut self, hook: AfterResponseHook) -> Self {
        self.layer.after_response = Some(hook);
        self
    }

    pub fn response_factory(mut self, factory: ResponseFactory) -> Self {
        self.layer.response_factory = Some(factory);
        self
    }

    pub fn exception_handler(mut self, status: u16, handler: ExceptionHandler) -> Self {
        self.layer.exception_handlers.insert(status, handler);
        self
    }

    pub fn dependency(mut self, name: impl Into<String>, provider: Provider) -> Self {
        self.layer.dependencies.insert(name.into(), provider);
        self
    }

    pub fn opt(mut self, key: impl Into<String>, value: Value) -> Self {
        self.layer.opt.insert(key.into(), value);
        self
    }

    /// Register an async handler function.
    pub fn build<F, Fut>(self, f: F) -> Result<RouteHandler, Error>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput, Error>> + Send + 'static,
    {
        self.build_with(HandlerCallable::Async(Arc::new(move |connection| {
            Box::pin(f(connection))
        })))
    }

    /// Register a synchronous handler function. Combine with
    /// `sync_to_thread(true)` to keep it off the event loop.
    pub fn build_sync<F>(self, f: F) -> Result<RouteHandler, Error>
    where
        F: Fn(Connection) -> Result<HandlerOutput, Error> + Send + Sync + 'static,
    {
        self.build_with(HandlerCallable::Sync(Arc::new(f)))
    }

    fn build_with(self, callable: HandlerCallable) -> Result<RouteHandler, Error> {
        if let Some(error) = self.deferred_error {
            return Err(error);
        }

        let spec = self.method_spec.ok_or_else(|| {
            Error::Configuration("an http_method declaration is required".to_string())
        })?;
        let http_methods = normalize_http_methods(spec)?;
        if http_methods.is_empty() {
            return Err(Error::Configuration(
                "an http_method declaration is required".to_string(),
            ));
        }

        let status_code = self
            .status_code
            .unwrap_or_else(|| default_status_code(&http_methods));

        let return_kind = self.return_kind.ok_or_else(|| {
            Error::Configuration(
                "a return kind must be declared for the route handler; \
                 declare ReturnKind::None for handlers that return no value"
                    .to_string(),
            )
        })?;

        if !allows_body(status_code) && !matches!(return_kind, ReturnKind::None) {
            return Err(Error::Configuration(
                "a status code 204, 304 or in the range below 200 does not support a response body"
                    .to_string(),
            ));
        }

        if matches!(return_kind, ReturnKind::Redirect) && !is_redirect_status(status_code) {
            return Err(Error::Validation(format!(
                "redirect responses should have one of the following status codes: {}",
                REDIRECT_STATUS_CODES
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        // file downloads are never JSON or HTML, whatever the layer defaults say
        let mut media_type = self.media_type;
        if matches!(return_kind, ReturnKind::File)
            && matches!(media_type, Some(MediaType::Json) | Some(MediaType::Html))
        {
            media_type = Some(MediaType::Text);
        }
        let media_type = media_type.unwrap_or_else(|| {
            if return_kind.is_textual() {
                MediaType::Text
            } else {
                MediaType::Json
            }
        });

        if self.accepts_socket {
            return Err(Error::Configuration(
                "the 'socket' parameter is not supported with HTTP handlers".to_string(),
            ));
        }

        if self.accepts_body && http_methods.contains(&HttpMethod::GET) {
            return Err(Error::Configuration(
                "the request body parameter is not supported for GET request handlers".to_string(),
            ));
        }

        let head_only = http_methods.len() == 1 && http_methods.contains(&HttpMethod::HEAD);
        if head_only && !matches!(return_kind, ReturnKind::None | ReturnKind::File) {
            return Err(Error::Configuration(
                "a response to a head request should not have a body".to_string(),
            ));
        }

        let paths = if self.paths.is_empty() {
            vec!["/".to_string()]
        } else {
            self.paths
        };

        Ok(RouteHandler {
            paths,
            http_methods,
            status_code,
            media_type,
            return_kind,
            name: self.name,
            cache: self.cache,
            sync_to_thread: self.sync_to_thread,
            background: self.background,
            callable,
            layer: self.layer,
            chain: OnceLock::new(),
            resolved_headers: OnceLock::new(),
            resolved_cookies: OnceLock::new(),
            resolved_before_request: OnceLock::new(),
            resolved_after_response: OnceLock::new(),
            resolved_exception_handlers: OnceLock::new(),
            resolved_dependencies: OnceLock::new(),
            resolved_opt: OnceLock::new(),
            resolved_strategy: OnceLock::new(),
        })
    }
}

/// Generic route declaration with an explicit method set.
pub fn route(path: impl Into<String>, methods: impl Into<MethodSpec>) -> RouteHandlerBuilder {
    RouteHandlerBuilder::new(vec![path.into()], Some(methods.into()), false)
}

/// Declare a route over several path fragments.
pub fn route_on(paths: Vec<String>, methods: impl Into<MethodSpec>) -> RouteHandlerBuilder {
    RouteHandlerBuilder::new(paths, Some(methods.into()), false)
}

fn semantic(path: String, method: HttpMethod) -> RouteHandlerBuilder {
    RouteHandlerBuilder::new(vec![path], Some(MethodSpec::Method(method)), true)
}

/// GET route declaration.
pub fn get(path: impl Into<String>) -> RouteHandlerBuilder {
    semantic(path.into(), HttpMethod::GET)
}

/// POST route declaration.
pub fn post(path: impl Into<String>) -> RouteHandlerBuilder {
    semantic(path.into(), HttpMethod::POST)
}

/// PUT route declaration.
pub fn put(path: impl Into<String>) -> RouteHandlerBuilder {
    semantic(path.into(), HttpMethod::PUT)
}

/// PATCH route declaration.
pub fn patch(path: impl Into<String>) -> RouteHandlerBuilder {
    semantic(path.into(), HttpMethod::PATCH)
}

/// DELETE route declaration.
pub fn delete(path: impl Into<String>) -> RouteHandlerBuilder {
    semantic(path.into(), HttpMethod::DELETE)
}

/// HEAD route declaration. A response to a head request cannot include a
/// body; only `ReturnKind::None` and `ReturnKind::File` are accepted.
pub fn head(path: impl Into<String>) -> RouteHandlerBuilder {
    semantic(path.into(), HttpMethod::HEAD)
}
