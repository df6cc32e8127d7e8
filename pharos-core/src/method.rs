// HTTP method normalization and default status policy

use crate::error::Error;
use crate::http::HttpMethod;
use crate::status::{HTTP_200_OK, HTTP_201_CREATED, HTTP_204_NO_CONTENT};
use std::collections::BTreeSet;

/// Accepted shapes for a handler's method declaration: one token, one enum
/// member, or a sequence of either.
#[derive(Clone, Debug)]
pub enum MethodSpec {
    Method(HttpMethod),
    Token(String),
    Many(Vec<MethodSpec>),
}

impl From<HttpMethod> for MethodSpec {
    fn from(method: HttpMethod) -> Self {
        MethodSpec::Method(method)
    }
}

impl From<&str> for MethodSpec {
    fn from(token: &str) -> Self {
        MethodSpec::Token(token.to_string())
    }
}

impl From<String> for MethodSpec {
    fn from(token: String) -> Self {
        MethodSpec::Token(token)
    }
}

impl From<Vec<HttpMethod>> for MethodSpec {
    fn from(methods: Vec<HttpMethod>) -> Self {
        MethodSpec::Many(methods.into_iter().map(MethodSpec::Method).collect())
    }
}

impl From<Vec<&str>> for MethodSpec {
    fn from(tokens: Vec<&str>) -> Self {
        MethodSpec::Many(tokens.into_iter().map(MethodSpec::from).collect())
    }
}

impl From<&[&str]> for MethodSpec {
    fn from(tokens: &[&str]) -> Self {
        MethodSpec::Many(tokens.iter().copied().map(MethodSpec::from).collect())
    }
}

/// Normalize a method declaration into a set of canonical methods.
///
/// Case and duplicates collapse; an unknown token is a validation error.
pub fn normalize_http_methods(spec: impl Into<MethodSpec>) -> Result<BTreeSet<HttpMethod>, Error> {
    let mut output = BTreeSet::new();
    collect_methods(spec.into(), &mut output)?;
    Ok(output)
}

fn collect_methods(spec: MethodSpec, output: &mut BTreeSet<HttpMethod>) -> Result<(), Error> {
    match spec {
        MethodSpec::Method(method) => {
            output.insert(method);
        }
        MethodSpec::Token(token) => {
            let method = HttpMethod::from_str(&token).ok_or_else(|| {
                Error::Validation(format!("invalid HTTP method: {}", token.to_uppercase()))
            })?;
            output.insert(method);
        }
        MethodSpec::Many(specs) => {
            for inner in specs {
                collect_methods(inner, output)?;
            }
        }
    }
    Ok(())
}

/// Default status code for a handler that does not declare one.
pub fn default_status_code(methods: &BTreeSet<HttpMethod>) -> u16 {
    if methods.contains(&HttpMethod::POST) {
        HTTP_201_CREATED
    } else if methods.contains(&HttpMethod::DELETE) {
        HTTP_204_NO_CONTENT
    } else {
        HTTP_200_OK
    }
}
