// Response header and cookie datastructures shared across configuration layers

use crate::error::Error;
use std::collections::HashMap;

/// Encode a header name or value the way it is written to the wire: one byte
/// per character, substituting `?` for anything outside latin-1.
pub fn encode_latin1(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| if (c as u32) <= 0xff { c as u8 } else { b'?' })
        .collect()
}

/// The `SameSite` attribute of a cookie.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Lax => "lax",
            SameSite::Strict => "strict",
            SameSite::None => "none",
        }
    }
}

/// A response header declared on a configuration layer.
///
/// Headers marked `documentation_only` are retained for schema generation but
/// never materialized on an outgoing response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    pub name: String,
    pub value: Option<String>,
    pub documentation_only: bool,
}

impl ResponseHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            documentation_only: false,
        }
    }

    /// A header that only appears in the generated schema.
    pub fn documentation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            documentation_only: true,
        }
    }

    /// A non-documentation header must carry a value.
    pub fn validate(&self) -> Result<(), Error> {
        if self.value.is_none() && !self.documentation_only {
            return Err(Error::Configuration(format!(
                "response header '{}' must have a value unless it is documentation_only",
                self.name
            )));
        }
        Ok(())
    }
}

/// A response cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub key: String,
    pub value: String,
    pub max_age: Option<i64>,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub httponly: bool,
    pub samesite: SameSite,
    pub documentation_only: bool,
}

impl Cookie {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            max_age: None,
            path: "/".to_string(),
            domain: None,
            secure: false,
            httponly: false,
            samesite: SameSite::Lax,
            documentation_only: false,
        }
    }

    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_httponly(mut self, httponly: bool) -> Self {
        self.httponly = httponly;
        self
    }

    pub fn with_samesite(mut self, samesite: SameSite) -> Self {
        self.samesite = samesite;
        self
    }

    pub fn documentation_only(mut self) -> Self {
        self.documentation_only = true;
        self
    }

    /// Render the `Set-Cookie` header value for this cookie.
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.key, self.value)];
        parts.push(format!("Path={}", self.path));
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={max_age}"));
        }
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.httponly {
            parts.push("HttpOnly".to_string());
        }
        parts.push(format!("SameSite={}", self.samesite.as_str()));
        parts.join("; ")
    }

    /// Encode this cookie as a lower-cased latin-1 header byte pair.
    pub fn to_encoded_header(&self) -> (Vec<u8>, Vec<u8>) {
        (b"set-cookie".to_vec(), encode_latin1(&self.to_header_value()))
    }
}

/// Cache-control settings declared as a dedicated layer field and synthesized
/// into a `cache-control` response header during resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheControlHeader {
    pub max_age: Option<u64>,
    pub no_cache: bool,
    pub no_store: bool,
    pub public: bool,
    pub private: bool,
    pub must_revalidate: bool,
    pub documentation_only: bool,
}

impl CacheControlHeader {
    pub const HEADER_NAME: &'static str = "cache-control";

    /// A header that prevents any caching of the response.
    pub fn prevent_storing() -> Self {
        Self {
            no_store: true,
            ..Self::default()
        }
    }

    pub fn to_header_value(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(max_age) = self.max_age {
            parts.push(format!("max-age={max_age}"));
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.public {
            parts.push("public".to_string());
        }
        if self.private {
            parts.push("private".to_string());
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        parts.join(", ")
    }
}

/// An `etag` header declared as a dedicated layer field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Etag {
    pub value: String,
    pub weak: bool,
    pub documentation_only: bool,
}

impl Etag {
    pub const HEADER_NAME: &'static str = "etag";

    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            weak: false,
            documentation_only: false,
        }
    }

    pub fn weak(mut self) -> Self {
        self.weak = true;
        self
    }

    pub fn to_header_value(&self) -> String {
        if self.weak {
            format!("W/\"{}\"", self.value)
        } else {
            format!("\"{}\"", self.value)
        }
    }
}

/// Filter a resolved header set down to the values written to a response,
/// excluding documentation-only entries.
pub fn normalize_headers(headers: &[ResponseHeader]) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|header| !header.documentation_only)
        .filter_map(|header| header.value.clone().map(|value| (header.name.clone(), value)))
        .collect()
}

/// Merge two cookie sets into a unique list keyed by cookie key, with `local`
/// taking precedence over `layered`, excluding documentation-only entries.
pub fn filter_cookies(local: &[Cookie], layered: &[Cookie]) -> Vec<Cookie> {
    let mut merged: Vec<Cookie> = Vec::new();
    for cookie in local.iter().chain(layered.iter()) {
        if merged.iter().any(|existing| existing.key == cookie.key) {
            continue;
        }
        merged.push(cookie.clone());
    }
    merged.retain(|cookie| !cookie.documentation_only);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_value() {
        let cookie = Cookie::new("session", "abc")
            .with_max_age(120)
            .with_secure(true)
            .with_httponly(true);
        let value = cookie.to_header_value();
        assert!(value.starts_with("session=abc"));
        assert!(value.contains("Max-Age=120"));
        assert!(value.contains("Secure"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("SameSite=lax"));
    }

    #[test]
    fn test_encoded_header_is_lowercase() {
        let (name, _) = Cookie::new("k", "v").to_encoded_header();
        assert_eq!(name, b"set-cookie".to_vec());
    }

    #[test]
    fn test_normalize_headers_excludes_documentation_only() {
        let headers = vec![
            ResponseHeader::new("x-version", "1"),
            ResponseHeader::documentation("x-docs-only"),
        ];
        let normalized = normalize_headers(&headers);
        assert_eq!(normalized.get("x-version"), Some(&"1".to_string()));
        assert!(!normalized.contains_key("x-docs-only"));
    }

    #[test]
    fn test_filter_cookies_local_wins() {
        let local = vec![Cookie::new("a", "local")];
        let layered = vec![Cookie::new("a", "layered"), Cookie::new("b", "2")];
        let merged = filter_cookies(&local, &layered);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.iter().find(|c| c.key == "a").unwrap().value, "local");
    }

    #[test]
    fn test_filter_cookies_excludes_documentation_only() {
        let layered = vec![Cookie::new("doc", "x").documentation_only()];
        let merged = filter_cookies(&[], &layered);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_cache_control_header_value() {
        let header = CacheControlHeader {
            max_age: Some(60),
            must_revalidate: true,
            ..CacheControlHeader::default()
        };
        assert_eq!(header.to_header_value(), "max-age=60, must-revalidate");
        assert_eq!(CacheControlHeader::prevent_storing().to_header_value(), "no-store");
    }

    #[test]
    fn test_etag_header_value() {
        assert_eq!(Etag::new("abc").to_header_value(), "\"abc\"");
        assert_eq!(Etag::new("abc").weak().to_header_value(), "W/\"abc\"");
    }

    #[test]
    fn test_encode_latin1_substitutes_wide_chars() {
        assert_eq!(encode_latin1("ab"), b"ab".to_vec());
        assert_eq!(encode_latin1("a\u{1F600}b"), b"a?b".to_vec());
    }
}
