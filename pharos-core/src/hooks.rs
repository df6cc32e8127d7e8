// Lifecycle hook and provider callable types
//
// Hooks are resolved through the ownership chain: the innermost non-null
// definition wins. All hook types are cheap to clone and safe to share
// between concurrent requests.

use crate::asgi::Connection;
use crate::error::Error;
use crate::handler::HandlerOutput;
use crate::response::Response;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Called immediately before the route handler. A `Some` return value is used
/// as the handler output, bypassing the route handler entirely.
pub type BeforeRequestHook =
    Arc<dyn Fn(Connection) -> BoxFuture<'static, Result<Option<HandlerOutput>, Error>> + Send + Sync>;

/// Called with the outgoing response before it is sent; may replace it.
pub type AfterRequestHook =
    Arc<dyn Fn(Response) -> BoxFuture<'static, Result<Response, Error>> + Send + Sync>;

/// Called after the response has been sent.
pub type AfterResponseHook =
    Arc<dyn Fn(Connection) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// Converts an error into a response, selected by status code from the merged
/// exception handler maps of the ownership chain.
pub type ExceptionHandler = Arc<dyn Fn(&Connection, &Error) -> Response + Send + Sync>;

/// A dependency provider, evaluated once per request for each declared name.
pub type Provider =
    Arc<dyn Fn(Connection) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

pub fn before_request_hook<F, Fut>(f: F) -> BeforeRequestHook
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HandlerOutput>, Error>> + Send + 'static,
{
    Arc::new(move |connection| Box::pin(f(connection)))
}

pub fn after_request_hook<F, Fut>(f: F) -> AfterRequestHook
where
    F: Fn(Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    Arc::new(move |response| Box::pin(f(response)))
}

pub fn after_response_hook<F, Fut>(f: F) -> AfterResponseHook
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |connection| Box::pin(f(connection)))
}

pub fn exception_handler<F>(f: F) -> ExceptionHandler
where
    F: Fn(&Connection, &Error) -> Response + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn provider<F, Fut>(f: F) -> Provider
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Error>> + Send + 'static,
{
    Arc::new(move |connection| Box::pin(f(connection)))
}
