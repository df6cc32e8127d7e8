// Application assembly: controllers, routers and the build phase
//
// The build phase freezes every handler's ownership chain (app -> router ->
// controller -> handler), runs registration validation, and memoizes all
// layer resolutions. Route resolution happens before the middleware stack so
// middleware can consult the matched handler's opt values.

use crate::asgi::{AsgiService, Connection};
use crate::error::Error;
use crate::handler::RouteHandler;
use crate::http::HttpMethod;
use crate::layers::Layer;
use crate::plugins::SerializationPlugin;
use crate::response::Response;
use crate::routing::{join_paths, match_path, parse_query_string};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Wraps an application service in a middleware. The first factory registered
/// on the builder becomes the outermost middleware.
pub type MiddlewareFactory =
    Arc<dyn Fn(Arc<dyn AsgiService>) -> Arc<dyn AsgiService> + Send + Sync>;

/// A group of handlers sharing a path fragment and a configuration layer.
pub struct Controller {
    pub path: String,
    pub layer: Layer,
    pub handlers: Vec<RouteHandler>,
}

impl Controller {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            layer: Layer::new(),
            handlers: Vec::new(),
        }
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn handler(mut self, handler: RouteHandler) -> Self {
        self.handlers.push(handler);
        self
    }
}

/// A mount point collecting controllers and handlers under a path fragment
/// with its own configuration layer.
pub struct Router {
    pub path: String,
    pub layer: Layer,
    pub controllers: Vec<Controller>,
    pub handlers: Vec<RouteHandler>,
}

impl Router {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            layer: Layer::new(),
            controllers: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn controller(mut self, controller: Controller) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn handler(mut self, handler: RouteHandler) -> Self {
        self.handlers.push(handler);
        self
    }
}

struct RegisteredRoute {
    pattern: String,
    handler: Arc<RouteHandler>,
}

/// Builder for an application.
pub struct AppBuilder {
    layer: Layer,
    routers: Vec<Router>,
    controllers: Vec<Controller>,
    handlers: Vec<RouteHandler>,
    plugins: Vec<Arc<dyn SerializationPlugin>>,
    middleware: Vec<MiddlewareFactory>,
}

impl AppBuilder {
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn router(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    pub fn controller(mut self, controller: Controller) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn handler(mut self, handler: RouteHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn SerializationPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn middleware(mut self, factory: MiddlewareFactory) -> Self {
        self.middleware.push(factory);
        self
    }

    /// Freeze every handler's ownership chain and produce the application.
    /// Configuration errors surface here, before the server starts.
    pub fn build(self) -> Result<App, Error> {
        let mut routes: Vec<RegisteredRoute> = Vec::new();

        let mut register =
            |outer_layers: Vec<Layer>, prefix: String, handler: RouteHandler| -> Result<(), Error> {
                handler.finalize(outer_layers)?;
                let handler = Arc::new(handler);
                for path in handler.paths() {
                    routes.push(RegisteredRoute {
                        pattern: join_paths(&prefix, path),
                        handler: handler.clone(),
                    });
                }
                Ok(())
            };

        for handler in self.handlers {
            register(vec![self.layer.clone()], String::new(), handler)?;
        }
        for controller in self.controllers {
            for handler in controller.handlers {
                register(
                    vec![self.layer.clone(), controller.layer.clone()],
                    controller.path.clone(),
                    handler,
                )?;
            }
        }
        for router in self.routers {
            for handler in router.handlers {
                register(
                    vec![self.layer.clone(), router.layer.clone()],
                    router.path.clone(),
                    handler,
                )?;
            }
            for controller in router.controllers {
                for handler in controller.handlers {
                    register(
                        vec![
                            self.layer.clone(),
                            router.layer.clone(),
                            controller.layer.clone(),
                        ],
                        join_paths(&router.path, &controller.path),
                        handler,
                    )?;
                }
            }
        }

        tracing::debug!(route_count = routes.len(), "application routes registered");

        let dispatcher: Arc<dyn AsgiService> = Arc::new(Dispatcher {
            plugins: self.plugins.clone(),
        });
        let entry = self
            .middleware
            .iter()
            .rev()
            .fold(dispatcher, |inner, factory| factory(inner));

        Ok(App {
            layer: self.layer,
            routes: Arc::new(routes),
            entry,
        })
    }
}

/// The built application. Routes are resolved before the middleware stack
/// runs; the matched handler is stored in the scope.
pub struct App {
    layer: Layer,
    routes: Arc<Vec<RegisteredRoute>>,
    entry: Arc<dyn AsgiService>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder {
            layer: Layer::new(),
            routers: Vec::new(),
            controllers: Vec::new(),
            handlers: Vec::new(),
            plugins: Vec::new(),
            middleware: Vec::new(),
        }
    }

    fn resolve_route(&self, connection: &Connection) -> Result<(), Error> {
        let mut scope = connection.scope();
        let method = HttpMethod::from_str(&scope.method)
            .ok_or_else(|| Error::Validation(format!("invalid HTTP method: {}", scope.method)))?;

        if !scope.query_string.is_empty() {
            scope.query_params = parse_query_string(&scope.query_string);
        }

        let mut path_matched = false;
        for route in self.routes.iter() {
            let Some(params) = match_path(&route.pattern, &scope.path) else {
                continue;
            };
            path_matched = true;
            if !route.handler.http_methods().contains(&method) {
                continue;
            }

            tracing::trace!(
                pattern = %route.pattern,
                handler = %route.handler.display_name(),
                "route matched"
            );
            scope.path_params = params;
            scope.opt = route.handler.resolve_opt().clone();
            scope.endpoint = Some(route.handler.clone());
            return Ok(());
        }

        if path_matched {
            Err(Error::MethodNotAllowed(format!(
                "{} {}",
                scope.method, scope.path
            )))
        } else {
            Err(Error::RouteNotFound(format!(
                "{} {}",
                scope.method, scope.path
            )))
        }
    }

    async fn send_error(&self, connection: &Connection, error: &Error) -> Result<(), Error> {
        let status = error.status_code();
        let handlers = self.layer.exception_handlers.clone();
        let response = match handlers.get(&status) {
            Some(handler) => handler(connection, error),
            None => default_error_response(error),
        };
        let suppress_body = connection.method() == "HEAD";
        let (start, body) = response.into_messages(suppress_body);
        connection.send(start).await?;
        connection.send(body).await
    }
}

#[async_trait]
impl AsgiService for App {
    async fn call(&self, connection: Connection) -> Result<(), Error> {
        match self.resolve_route(&connection) {
            Ok(()) => self.entry.call(connection).await,
            Err(error) => {
                tracing::debug!(error = %error, "request failed before dispatch");
                self.send_error(&connection, &error).await
            }
        }
    }
}

/// The innermost service: runs the matched handler's request flow and applies
/// the resolved exception handlers on failure.
struct Dispatcher {
    plugins: Vec<Arc<dyn SerializationPlugin>>,
}

#[async_trait]
impl AsgiService for Dispatcher {
    async fn call(&self, connection: Connection) -> Result<(), Error> {
        let handler = connection
            .scope()
            .endpoint
            .clone()
            .ok_or_else(|| Error::Internal("no endpoint resolved for connection".to_string()))?;

        match handler.handle(connection.clone(), &self.plugins).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::debug!(
                    handler = %handler.display_name(),
                    error = %error,
                    "handler failed"
                );
                let status = error.status_code();
                let response = match handler.resolve_exception_handlers().get(&status) {
                    Some(exception_handler) => exception_handler(&connection, &error),
                    None => default_error_response(&error),
                };
                let suppress_body = connection.method() == "HEAD";
                let (start, body) = response.into_messages(suppress_body);
                connection.send(start).await?;
                connection.send(body).await
            }
        }
    }
}

fn default_error_response(error: &Error) -> Response {
    let status = error.status_code();
    Response::new(status)
        .with_json(&json!({"status_code": status, "detail": error.to_string()}))
        .unwrap_or_else(|_| Response::new(status))
}
