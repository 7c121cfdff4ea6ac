//! Route table and dispatcher.
//!
//! Routes are tried in registration order. The first route whose pattern
//! matches the path decides the outcome: if its method list does not contain
//! the request method the answer is 405, and later routes are never
//! consulted even if they would accept the method.
//!
//! Patterns are path templates relative to the root (no leading `/`):
//!
//! ```text
//! profiles/                 literal
//! profiles/<profile_id>     one segment of [-\w]+
//! static/<path:path>        the rest of the path
//! ```

use futures::FutureExt;
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ApiError;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

pub type HandlerResult = Result<Response, ApiError>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
type BoxedHandler<S> = Box<dyn Fn(Arc<S>, Request, Params) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("unclosed '<' in route pattern {0:?}")]
    Unclosed(String),
    #[error("invalid parameter name {name:?} in route pattern {pattern:?}")]
    InvalidName { pattern: String, name: String },
    #[error("unknown converter {converter:?} in route pattern {pattern:?}")]
    UnknownConverter { pattern: String, converter: String },
    #[error("route pattern {pattern:?} does not compile: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Why a request could not be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    NoMatch,
    MethodNotAllowed { allowed: Vec<Method> },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoMatch => StatusCode::NotFound,
            DispatchError::MethodNotAllowed { .. } => StatusCode::MethodNotAllowed,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            DispatchError::NoMatch => Response::not_found(),
            DispatchError::MethodNotAllowed { allowed } => {
                let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                ResponseBuilder::new(StatusCode::MethodNotAllowed)
                    .header("Allow", allow.join(", "))
                    .build()
            }
        }
    }
}

/// Named values captured from the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.as_str())
    }

    /// Parses a captured value. A missing parameter is a routing bug and
    /// surfaces as an internal error; an unparsable one as 404.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, ApiError> {
        let raw = self
            .get(name)
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("route has no parameter {:?}", name)))?;
        raw.parse().map_err(|_| ApiError::NotFound)
    }

    /// Owned copy of a captured value, see [`Params::parse`].
    pub fn string(&self, name: &str) -> Result<String, ApiError> {
        self.parse(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
}

impl PathPattern {
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let mut re = String::from("^");
        let mut rest = template;

        while let Some(start) = rest.find('<') {
            re.push_str(&regex::escape(&rest[..start]));

            let after = &rest[start + 1..];
            let end = after
                .find('>')
                .ok_or_else(|| PatternError::Unclosed(template.to_string()))?;
            let inner = &after[..end];

            let (converter, name) = inner.split_once(':').unwrap_or(("segment", inner));
            if !is_valid_name(name) {
                return Err(PatternError::InvalidName {
                    pattern: template.to_string(),
                    name: name.to_string(),
                });
            }

            let class = match converter {
                "segment" => r"[-\w]+",
                "path" => ".+",
                other => {
                    return Err(PatternError::UnknownConverter {
                        pattern: template.to_string(),
                        converter: other.to_string(),
                    });
                }
            };

            re.push_str(&format!("(?P<{}>{})", name, class));
            rest = &after[end + 1..];
        }

        re.push_str(&regex::escape(rest));
        re.push('$');

        let regex = Regex::new(&re).map_err(|source| PatternError::Regex {
            pattern: template.to_string(),
            source,
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Structural match of `path` (without leading slash).
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let params = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();
        Some(Params(params))
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct Route<S> {
    pattern: PathPattern,
    methods: Vec<Method>,
    handler: BoxedHandler<S>,
}

impl<S> Route<S> {
    pub fn pattern(&self) -> &str {
        self.pattern.template()
    }

    pub fn allows(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }
}

/// Ordered route table over handlers sharing a state of type `S`.
pub struct Router<S> {
    routes: Vec<Route<S>>,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<S: Send + Sync + 'static> Router<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route; earlier routes take precedence.
    pub fn route<F, Fut>(
        &mut self,
        pattern: &str,
        methods: &[Method],
        handler: F,
    ) -> Result<&mut Self, PatternError>
    where
        F: Fn(Arc<S>, Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let pattern = PathPattern::compile(pattern)?;
        tracing::debug!(pattern = pattern.template(), methods = ?methods, "Adding route");

        self.routes.push(Route {
            pattern,
            methods: methods.to_vec(),
            handler: Box::new(move |state: Arc<S>, req: Request, params: Params| -> HandlerFuture {
                Box::pin(handler(state, req, params))
            }),
        });
        Ok(self)
    }

    pub fn routes(&self) -> &[Route<S>] {
        &self.routes
    }

    /// Finds the route for `req` and the parameters captured from its path.
    pub fn resolve(&self, req: &Request) -> Result<(&Route<S>, Params), DispatchError> {
        let path = req.route_path();

        for route in &self.routes {
            if let Some(params) = route.pattern.captures(path) {
                if !route.allows(req.method) {
                    return Err(DispatchError::MethodNotAllowed {
                        allowed: route.methods.clone(),
                    });
                }
                return Ok((route, params));
            }
        }

        Err(DispatchError::NoMatch)
    }

    /// Routes and runs a request. Never fails: routing errors, handler errors
    /// and handler panics all become responses.
    pub async fn dispatch(&self, state: Arc<S>, req: Request) -> Response {
        let method = req.method;
        let path = req.path.clone();

        let (route, params) = match self.resolve(&req) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    method = method.as_str(),
                    path = %path,
                    status = e.status().as_u16(),
                    "Dispatch failed"
                );
                return e.into_response();
            }
        };

        let outcome = AssertUnwindSafe(async move { (route.handler)(state, req, params).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!(
                    method = method.as_str(),
                    path = %path,
                    status = e.status().as_u16(),
                    error = %e,
                    "Handler returned an error"
                );
                e.into_response()
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                tracing::error!(
                    method = method.as_str(),
                    path = %path,
                    route = route.pattern(),
                    panic = %reason,
                    "Handler panicked"
                );
                Response::internal_error()
            }
        }
    }
}
