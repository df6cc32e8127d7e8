// Session configuration

use crate::error::{SessionError, SessionResult};
use pharos_core::{Cookie, SameSite, ScopeType};
use std::collections::HashSet;

pub const ONE_DAY_IN_SECONDS: u64 = 60 * 60 * 24;

/// Configuration shared by all session backends.
///
/// Constructed once at application configuration time and treated as
/// immutable thereafter; tests may adjust `max_age` directly.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Key of the session cookie, e.g. `session=<data>`. When a client-side
    /// payload exceeds one cookie's size budget the segments are named
    /// `{key}-{n}`.
    pub key: String,
    /// Maximal age in seconds before the session is invalidated.
    pub max_age: u64,
    /// Scope types the middleware applies to.
    pub scopes: HashSet<ScopeType>,
    /// Path fragment that must exist in the request url for the cookie to be
    /// valid.
    pub path: String,
    /// Domain for which the cookie is valid.
    pub domain: Option<String>,
    /// Https is required for the cookie.
    pub secure: bool,
    /// Forbids javascript access to the cookie.
    pub httponly: bool,
    /// Controls whether the cookie is sent with cross-site requests.
    pub samesite: SameSite,
    /// Patterns of paths to skip in the session middleware.
    pub exclude: Vec<String>,
    /// An opt key used on route handlers to disable the session middleware
    /// for a particular route.
    pub exclude_opt_key: String,
}

impl SessionConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            max_age: ONE_DAY_IN_SECONDS * 14,
            scopes: HashSet::from([ScopeType::Http, ScopeType::WebSocket]),
            path: "/".to_string(),
            domain: None,
            secure: false,
            httponly: true,
            samesite: SameSite::Lax,
            exclude: Vec::new(),
            exclude_opt_key: "skip_session".to_string(),
        }
    }

    pub fn with_max_age(mut self, max_age: u64) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_scopes(mut self, scopes: HashSet<ScopeType>) -> Self {
        self.scopes = scopes;
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

    pub fn with_exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    pub fn with_exclude_opt_key(mut self, key: impl Into<String>) -> Self {
        self.exclude_opt_key = key.into();
        self
    }

    /// Check the configuration invariants. Called by backends and the
    /// middleware before the application starts serving.
    pub fn validate(&self) -> SessionResult<()> {
        if self.key.is_empty() || self.key.len() > 256 {
            return Err(SessionError::Config(
                "session cookie key must be between 1 and 256 characters".to_string(),
            ));
        }
        if self.max_age == 0 {
            return Err(SessionError::Config(
                "session max_age must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a session cookie with the configured attributes.
    pub fn cookie(&self, name: impl Into<String>, value: impl Into<String>) -> Cookie {
        let mut cookie = Cookie::new(name, value)
            .with_path(self.path.clone())
            .with_max_age(self.max_age as i64)
            .with_secure(self.secure)
            .with_httponly(self.httponly)
            .with_samesite(self.samesite);
        if let Some(domain) = &self.domain {
            cookie = cookie.with_domain(domain.clone());
        }
        cookie
    }

    /// Build a cookie that immediately expires `name` on the client.
    pub fn clearing_cookie(&self, name: impl Into<String>) -> Cookie {
        let mut cookie = Cookie::new(name, "null")
            .with_path(self.path.clone())
            .with_max_age(0)
            .with_secure(self.secure)
            .with_httponly(self.httponly)
            .with_samesite(self.samesite);
        if let Some(domain) = &self.domain {
            cookie = cookie.with_domain(domain.clone());
        }
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::new("session");
        assert_eq!(config.max_age, ONE_DAY_IN_SECONDS * 14);
        assert_eq!(config.path, "/");
        assert!(config.httponly);
        assert!(!config.secure);
        assert_eq!(config.samesite, SameSite::Lax);
        assert_eq!(config.exclude_opt_key, "skip_session");
        assert!(config.scopes.contains(&ScopeType::Http));
        assert!(config.scopes.contains(&ScopeType::WebSocket));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_length_validated() {
        assert!(SessionConfig::new("").validate().is_err());
        assert!(SessionConfig::new("k".repeat(257)).validate().is_err());
        assert!(SessionConfig::new("k".repeat(256)).validate().is_ok());
    }

    #[test]
    fn test_max_age_validated() {
        assert!(SessionConfig::new("session").with_max_age(0).validate().is_err());
        assert!(SessionConfig::new("session").with_max_age(1).validate().is_ok());
    }

    #[test]
    fn test_cookie_carries_attributes() {
        let config = SessionConfig::new("session")
            .with_secure(true)
            .with_domain("example.com")
            .with_max_age(60);
        let cookie = config.cookie("session", "abc");
        assert_eq!(cookie.max_age, Some(60));
        assert!(cookie.secure);
        assert!(cookie.httponly);
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_clearing_cookie_expires_immediately() {
        let cookie = SessionConfig::new("session").clearing_cookie("session-2");
        assert_eq!(cookie.value, "null");
        assert_eq!(cookie.max_age, Some(0));
    }
}
