// Core library for the Pharos framework
// Handler registration, layered configuration resolution, response dispatch
// strategies and the transport-facing connection contract.

pub mod app;
pub mod asgi;
pub mod containers;
pub mod dispatch;
pub mod dto;
pub mod error;
pub mod handler;
pub mod headers;
pub mod hooks;
pub mod http;
pub mod layers;
pub mod method;
pub mod plugins;
pub mod response;
pub mod routing;
pub mod status;
pub mod testing;

// Re-export commonly used types
pub use app::{App, AppBuilder, Controller, MiddlewareFactory, Router};
pub use asgi::{
    AsgiService, Connection, Message, MessageSink, MessageSource, RequestMessage, ResponseBody,
    ResponseStart, Scope, ScopeType, SessionCell,
};
pub use containers::{File, Redirect, ResponseContainer};
pub use dispatch::{DispatchResult, ResponseStrategy};
pub use dto::{Dto, DtoSpec};
pub use error::Error;
pub use handler::{
    delete, get, head, patch, post, put, route, route_on, CachePolicy, HandlerCallable,
    HandlerOutput, ReturnKind, RouteHandler, RouteHandlerBuilder,
};
pub use headers::{
    filter_cookies, normalize_headers, CacheControlHeader, Cookie, Etag, ResponseHeader, SameSite,
};
pub use hooks::{
    after_request_hook, after_response_hook, before_request_hook, exception_handler, provider,
    AfterRequestHook, AfterResponseHook, BeforeRequestHook, ExceptionHandler, Provider,
};
pub use http::{HttpMethod, MediaType};
pub use layers::{Layer, OwnershipChain};
pub use method::{default_status_code, normalize_http_methods, MethodSpec};
pub use plugins::{normalize_response_data, plugin_for_value, SerializationPlugin};
pub use response::{
    default_response_factory, BackgroundTask, Response, ResponseArgs, ResponseContent,
    ResponseFactory,
};
pub use status::*;
