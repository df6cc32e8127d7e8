// Response handler dispatch strategies
//
// The declared return kind of a handler selects exactly one of four
// construction strategies at registration time. Each strategy is a pure
// function of the resolved layer configuration and the return kind; only the
// live data, the plugin list and the connection vary per request.

use crate::asgi::{AsgiService, Connection, Message};
use crate::dto::DtoSpec;
use crate::error::Error;
use crate::handler::{HandlerOutput, ReturnKind, RouteHandler};
use crate::headers::{encode_latin1, filter_cookies, normalize_headers, Cookie};
use crate::hooks::AfterRequestHook;
use crate::http::MediaType;
use crate::plugins::{normalize_response_data, SerializationPlugin};
use crate::response::{BackgroundTask, Response, ResponseArgs, ResponseContent, ResponseFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What dispatch produced: a transport response to serialize, or a raw
/// application to delegate the connection to.
pub enum DispatchResult {
    Response(Response),
    Asgi(Arc<dyn AsgiService>),
}

/// One of the four response-construction strategies, selected once per
/// handler and memoized.
#[derive(Clone)]
pub enum ResponseStrategy {
    /// The handler returns a response container (file, redirect).
    Container {
        after_request: Option<AfterRequestHook>,
        cookies: Vec<Cookie>,
        normalized_headers: HashMap<String, String>,
        media_type: MediaType,
        status_code: u16,
    },
    /// The handler returns a prebuilt transport response.
    Prebuilt {
        after_request: Option<AfterRequestHook>,
        cookies: Vec<Cookie>,
    },
    /// The handler returns a raw application callable.
    Asgi {
        after_request: Option<AfterRequestHook>,
        cookies: Vec<Cookie>,
    },
    /// The fallback: wrap arbitrary data into a new response.
    Data {
        after_request: Option<AfterRequestHook>,
        background: Option<BackgroundTask>,
        raw_headers: Vec<(Vec<u8>, Vec<u8>)>,
        media_type: MediaType,
        status_code: u16,
        factory: ResponseFactory,
        dto: Option<(DtoSpec, bool)>,
    },
}

impl ResponseStrategy {
    /// Inspect a handler's declared return kind and bind the matching
    /// strategy from its resolved layer configuration.
    pub fn for_handler(handler: &RouteHandler) -> Self {
        let after_request = handler.resolve_after_request();
        let headers = handler.resolve_response_headers().to_vec();
        let cookies = handler.resolve_response_cookies().to_vec();
        let media_type = handler.media_type().clone();
        let status_code = handler.status_code();

        match handler.return_kind() {
            ReturnKind::File | ReturnKind::Redirect => ResponseStrategy::Container {
                after_request,
                cookies,
                normalized_headers: normalize_headers(&headers),
                media_type,
                status_code,
            },
            ReturnKind::Response => ResponseStrategy::Prebuilt {
                after_request,
                cookies,
            },
            ReturnKind::Asgi => ResponseStrategy::Asgi {
                after_request,
                cookies,
            },
            kind => {
                let mut raw_headers: Vec<(Vec<u8>, Vec<u8>)> = normalize_headers(&headers)
                    .into_iter()
                    .map(|(name, value)| {
                        (encode_latin1(&name.to_lowercase()), encode_latin1(&value))
                    })
                    .collect();
                raw_headers.sort();
                raw_headers.extend(
                    cookies
                        .iter()
                        .filter(|cookie| !cookie.documentation_only)
                        .map(Cookie::to_encoded_header),
                );

                let dto = match kind {
                    ReturnKind::Dto(spec) => Some((spec.clone(), false)),
                    ReturnKind::DtoList(spec) => Some((spec.clone(), true)),
                    _ => None,
                };

                ResponseStrategy::Data {
                    after_request,
                    background: handler.background().cloned(),
                    raw_headers,
                    media_type,
                    status_code,
                    factory: handler.resolve_response_factory(),
                    dto,
                }
            }
        }
    }

    /// Apply the strategy to a handler's output.
    pub async fn to_response(
        &self,
        output: HandlerOutput,
        plugins: &[Arc<dyn SerializationPlugin>],
    ) -> Result<DispatchResult, Error> {
        match self {
            ResponseStrategy::Container {
                after_request,
                cookies,
                normalized_headers,
                media_type,
                status_code,
            } => {
                let container = match output {
                    HandlerOutput::Container(container) => container,
                    other => return Err(mismatch(&other, "a response container")),
                };
                let mut headers = normalized_headers.clone();
                headers.extend(
                    container
                        .headers()
                        .iter()
                        .map(|(name, value)| (name.clone(), value.clone())),
                );
                let media_type = container.media_type().unwrap_or_else(|| media_type.clone());
                let mut response = container
                    .to_response(headers, *status_code, media_type)
                    .await?;
                response.cookies = filter_cookies(container.cookies(), cookies);
                Ok(DispatchResult::Response(
                    apply_after_request(after_request, response).await?,
                ))
            }
            ResponseStrategy::Prebuilt {
                after_request,
                cookies,
            } => {
                let mut response = match output {
                    HandlerOutput::Response(response) => response,
                    other => return Err(mismatch(&other, "a prebuilt response")),
                };
                response.cookies = filter_cookies(&response.cookies, cookies);
                Ok(DispatchResult::Response(
                    apply_after_request(after_request, response).await?,
                ))
            }
            ResponseStrategy::Asgi { cookies, .. } => {
                let service = match output {
                    HandlerOutput::Asgi(service) => service,
                    other => return Err(mismatch(&other, "an application callable")),
                };
                let service: Arc<dyn AsgiService> = if cookies.is_empty() {
                    service
                } else {
                    Arc::new(CookieInjector {
                        inner: service,
                        cookies: cookies.clone(),
                    })
                };
                Ok(DispatchResult::Asgi(service))
            }
            ResponseStrategy::Data {
                after_request,
                background,
                raw_headers,
                media_type,
                status_code,
                factory,
                dto,
            } => {
                // await the handler's return value first if it is deferred
                let output = match output {
                    HandlerOutput::Deferred(fut) => fut.await?,
                    other => other,
                };

                let content = match output {
                    HandlerOutput::None => ResponseContent::None,
                    HandlerOutput::Text(text) => ResponseContent::Text(text),
                    HandlerOutput::Bytes(bytes) => ResponseContent::Bytes(bytes),
                    HandlerOutput::Data(value) => {
                        let value = match dto {
                            Some((spec, true)) => spec.coerce_elements(&value)?,
                            Some((spec, false)) => spec.coerce(&value)?,
                            None if !plugins.is_empty() => {
                                normalize_response_data(value, plugins).await?
                            }
                            None => value,
                        };
                        ResponseContent::Json(value)
                    }
                    other => return Err(mismatch(&other, "plain data")),
                };

                let mut response = factory(ResponseArgs {
                    content,
                    status_code: *status_code,
                    media_type: media_type.clone(),
                    background: background.clone(),
                })?;
                response.raw_headers = raw_headers.clone();
                Ok(DispatchResult::Response(
                    apply_after_request(after_request, response).await?,
                ))
            }
        }
    }
}

fn mismatch(output: &HandlerOutput, expected: &str) -> Error {
    Error::Internal(format!(
        "handler returned {output:?} but its declared return kind expects {expected}"
    ))
}

async fn apply_after_request(
    hook: &Option<AfterRequestHook>,
    response: Response,
) -> Result<Response, Error> {
    match hook {
        Some(hook) => hook(response).await,
        None => Ok(response),
    }
}

/// Wraps a raw application so that resolved layer cookies are set on its
/// outgoing response.
struct CookieInjector {
    inner: Arc<dyn AsgiService>,
    cookies: Vec<Cookie>,
}

#[async_trait]
impl AsgiService for CookieInjector {
    async fn call(&self, connection: Connection) -> Result<(), Error> {
        let sink = Arc::new(InjectingSink {
            inner: connection.sink(),
            cookies: self.cookies.clone(),
        });
        self.inner.call(connection.with_sink(sink)).await
    }
}

struct InjectingSink {
    inner: Arc<dyn crate::asgi::MessageSink>,
    cookies: Vec<Cookie>,
}

#[async_trait]
impl crate::asgi::MessageSink for InjectingSink {
    async fn send(&self, mut message: Message) -> Result<(), Error> {
        if let Message::ResponseStart(start) = &mut message {
            for cookie in &self.cookies {
                if !cookie.documentation_only {
                    start.headers.push(cookie.to_encoded_header());
                }
            }
        }
        self.inner.send(message).await
    }
}
