// Layered configuration: ownership chain and resolution folds
//
// Every application level (app, router, controller, handler) carries one
// immutable `Layer` record. Chains are frozen when the application is built;
// resolution functions are pure folds over the ordered outer-to-inner array.

use crate::headers::{CacheControlHeader, Cookie, Etag, ResponseHeader};
use crate::hooks::{
    AfterRequestHook, AfterResponseHook, BeforeRequestHook, ExceptionHandler, Provider,
};
use crate::response::{default_response_factory, ResponseFactory};
use serde_json::Value;
use std::collections::HashMap;

/// One configuration layer.
#[derive(Clone, Default)]
pub struct Layer {
    pub response_headers: Vec<ResponseHeader>,
    pub response_cookies: Vec<Cookie>,
    pub cache_control: Option<CacheControlHeader>,
    pub etag: Option<Etag>,
    pub before_request: Option<BeforeRequestHook>,
    pub after_request: Option<AfterRequestHook>,
    pub after_response: Option<AfterResponseHook>,
    pub response_factory: Option<ResponseFactory>,
    pub exception_handlers: HashMap<u16, ExceptionHandler>,
    pub dependencies: HashMap<String, Provider>,
    pub opt: HashMap<String, Value>,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn response_header(mut self, header: ResponseHeader) -> Self {
        self.response_headers.push(header);
        self
    }

    pub fn response_cookie(mut self, cookie: Cookie) -> Self {
        self.response_cookies.push(cookie);
        self
    }

    pub fn cache_control(mut self, header: CacheControlHeader) -> Self {
        self.cache_control = Some(header);
        self
    }

    pub fn etag(mut self, etag: Etag) -> Self {
        self.etag = Some(etag);
        self
    }

    pub fn before_request(mut self, hook: BeforeRequestHook) -> Self {
        self.before_request = Some(hook);
        self
    }

    pub fn after_request(mut self, hook: AfterRequestHook) -> Self {
        self.after_request = Some(hook);
        self
    }

    pub fn after_response(mut self, hook: AfterResponseHook) -> Self {
        self.after_response = Some(hook);
        self
    }

    pub fn response_factory(mut self, factory: ResponseFactory) -> Self {
        self.response_factory = Some(factory);
        self
    }

    pub fn exception_handler(mut self, status: u16, handler: ExceptionHandler) -> Self {
        self.exception_handlers.insert(status, handler);
        self
    }

    pub fn dependency(mut self, name: impl Into<String>, provider: Provider) -> Self {
        self.dependencies.insert(name.into(), provider);
        self
    }

    pub fn opt(mut self, key: impl Into<String>, value: Value) -> Self {
        self.opt.insert(key.into(), value);
        self
    }
}

/// The ordered outer-to-inner sequence of configuration layers a route
/// handler belongs to. Immutable once built.
#[derive(Clone, Default)]
pub struct OwnershipChain {
    layers: Vec<Layer>,
}

impl OwnershipChain {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The closest response factory override, scanning inner to outer; the
    /// default factory when no layer overrides it.
    pub fn resolve_response_factory(&self) -> ResponseFactory {
        for layer in self.layers.iter().rev() {
            if let Some(factory) = &layer.response_factory {
                return factory.clone();
            }
        }
        default_response_factory()
    }

    /// Merge response headers outer to inner; the inner layer overrides on
    /// name collision. Dedicated cache-control/etag fields synthesize headers
    /// at each layer, subject to the same override rule.
    pub fn resolve_response_headers(&self) -> Vec<ResponseHeader> {
        let mut resolved: Vec<ResponseHeader> = Vec::new();
        let mut upsert = |header: ResponseHeader| {
            if let Some(existing) = resolved.iter_mut().find(|h| h.name == header.name) {
                *existing = header;
            } else {
                resolved.push(header);
            }
        };

        for layer in &self.layers {
            for header in &layer.response_headers {
                upsert(header.clone());
            }
            if let Some(cache_control) = &layer.cache_control {
                upsert(ResponseHeader {
                    name: CacheControlHeader::HEADER_NAME.to_string(),
                    value: Some(cache_control.to_header_value()),
                    documentation_only: cache_control.documentation_only,
                });
            }
            if let Some(etag) = &layer.etag {
                upsert(ResponseHeader {
                    name: Etag::HEADER_NAME.to_string(),
                    value: Some(etag.to_header_value()),
                    documentation_only: etag.documentation_only,
                });
            }
        }
        resolved
    }

    /// Accumulate cookies scanning outer to inner, collapsing duplicates by
    /// key with the later-scanned layer winning. The asymmetry with header
    /// resolution is a preserved behavioral contract.
    pub fn resolve_response_cookies(&self) -> Vec<Cookie> {
        let mut resolved: Vec<Cookie> = Vec::new();
        for layer in &self.layers {
            for cookie in &layer.response_cookies {
                if let Some(existing) = resolved.iter_mut().find(|c| c.key == cookie.key) {
                    *existing = cookie.clone();
                } else {
                    resolved.push(cookie.clone());
                }
            }
        }
        resolved
    }

    fn last_non_null<T: Clone>(&self, pick: impl Fn(&Layer) -> Option<&T>) -> Option<T> {
        let mut found = None;
        for layer in &self.layers {
            if let Some(value) = pick(layer) {
                found = Some(value.clone());
            }
        }
        found
    }

    /// The innermost non-null before-request hook.
    pub fn resolve_before_request(&self) -> Option<BeforeRequestHook> {
        self.last_non_null(|layer| layer.before_request.as_ref())
    }

    /// The innermost non-null after-request hook.
    pub fn resolve_after_request(&self) -> Option<AfterRequestHook> {
        self.last_non_null(|layer| layer.after_request.as_ref())
    }

    /// The innermost non-null after-response hook.
    pub fn resolve_after_response(&self) -> Option<AfterResponseHook> {
        self.last_non_null(|layer| layer.after_response.as_ref())
    }

    /// Merge exception handlers outer to inner, inner overriding per status.
    pub fn resolve_exception_handlers(&self) -> HashMap<u16, ExceptionHandler> {
        let mut resolved = HashMap::new();
        for layer in &self.layers {
            for (status, handler) in &layer.exception_handlers {
                resolved.insert(*status, handler.clone());
            }
        }
        resolved
    }

    /// Merge dependency providers outer to inner, inner overriding per name.
    pub fn resolve_dependencies(&self) -> HashMap<String, Provider> {
        let mut resolved = HashMap::new();
        for layer in &self.layers {
            for (name, provider) in &layer.dependencies {
                resolved.insert(name.clone(), provider.clone());
            }
        }
        resolved
    }

    /// Merge opt values outer to inner, inner overriding per key.
    pub fn resolve_opt(&self) -> HashMap<String, Value> {
        let mut resolved = HashMap::new();
        for layer in &self.layers {
            for (key, value) in &layer.opt {
                resolved.insert(key.clone(), value.clone());
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::before_request_hook;

    #[test]
    fn test_headers_inner_overrides_outer() {
        let chain = OwnershipChain::new(vec![
            Layer::new()
                .response_header(ResponseHeader::new("x-app", "app"))
                .response_header(ResponseHeader::new("x-shared", "outer")),
            Layer::new().response_header(ResponseHeader::new("x-shared", "inner")),
        ]);
        let resolved = chain.resolve_response_headers();
        let shared = resolved.iter().find(|h| h.name == "x-shared").unwrap();
        assert_eq!(shared.value.as_deref(), Some("inner"));
        assert!(resolved.iter().any(|h| h.name == "x-app"));
    }

    #[test]
    fn test_cache_control_and_etag_synthesized() {
        let chain = OwnershipChain::new(vec![Layer::new()
            .cache_control(CacheControlHeader {
                max_age: Some(30),
                ..CacheControlHeader::default()
            })
            .etag(Etag::new("v1"))]);
        let resolved = chain.resolve_response_headers();
        assert!(resolved
            .iter()
            .any(|h| h.name == "cache-control" && h.value.as_deref() == Some("max-age=30")));
        assert!(resolved
            .iter()
            .any(|h| h.name == "etag" && h.value.as_deref() == Some("\"v1\"")));
    }

    #[test]
    fn test_inner_cache_control_overrides_outer() {
        let chain = OwnershipChain::new(vec![
            Layer::new().cache_control(CacheControlHeader {
                max_age: Some(30),
                ..CacheControlHeader::default()
            }),
            Layer::new().cache_control(CacheControlHeader::prevent_storing()),
        ]);
        let resolved = chain.resolve_response_headers();
        let cache = resolved.iter().find(|h| h.name == "cache-control").unwrap();
        assert_eq!(cache.value.as_deref(), Some("no-store"));
    }

    #[test]
    fn test_cookies_later_layer_wins_by_key() {
        let chain = OwnershipChain::new(vec![
            Layer::new()
                .response_cookie(Cookie::new("shared", "outer"))
                .response_cookie(Cookie::new("outer-only", "1")),
            Layer::new().response_cookie(Cookie::new("shared", "inner")),
        ]);
        let resolved = chain.resolve_response_cookies();
        assert_eq!(resolved.len(), 2);
        let shared = resolved.iter().find(|c| c.key == "shared").unwrap();
        assert_eq!(shared.value, "inner");
    }

    #[test]
    fn test_hook_resolution_prefers_innermost() {
        let outer = before_request_hook(|_connection| async { Ok(None) });
        let inner = before_request_hook(|_connection| async { Ok(None) });
        let inner_clone = inner.clone();

        let chain = OwnershipChain::new(vec![
            Layer::new().before_request(outer),
            Layer::new().before_request(inner),
        ]);
        let resolved = chain.resolve_before_request().unwrap();
        assert!(Arc::ptr_eq(&resolved, &inner_clone));
    }

    #[test]
    fn test_hook_resolution_falls_back_to_ancestor() {
        let outer = before_request_hook(|_connection| async { Ok(None) });
        let outer_clone = outer.clone();

        let chain = OwnershipChain::new(vec![Layer::new().before_request(outer), Layer::new()]);
        let resolved = chain.resolve_before_request().unwrap();
        assert!(Arc::ptr_eq(&resolved, &outer_clone));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let chain = OwnershipChain::new(vec![
            Layer::new()
                .response_header(ResponseHeader::new("x-a", "1"))
                .response_cookie(Cookie::new("a", "1")),
            Layer::new().response_header(ResponseHeader::new("x-b", "2")),
        ]);
        assert_eq!(chain.resolve_response_headers(), chain.resolve_response_headers());
        assert_eq!(chain.resolve_response_cookies(), chain.resolve_response_cookies());
    }

    use std::sync::Arc;
}
