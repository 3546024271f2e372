use crate::dispatcher;
use crate::message::{Params, Request, Response};
use http::Method;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::trie::{split_path, RouteNode};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Parameter bindings collected while matching.
///
/// Names are shared with the trie (`Arc<str>`), values are copied out of the
/// request path.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// A request handler.
///
/// Returning `Err` or panicking is a handler failure and produces a 500.
pub type Handler = Arc<dyn Fn(&Request) -> anyhow::Result<Response> + Send + Sync + 'static>;

/// Result of successfully matching a method and path.
#[derive(Clone)]
pub struct RouteMatch {
    pub method: Method,
    pub handler: Handler,
    /// Bindings of the matched branch, in path order.
    pub params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name.
    #[inline]
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Bindings as the map stored on [`Request::params`].
    #[must_use]
    pub fn params_map(&self) -> Params {
        self.params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("method", &self.method)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// One registered `(method, pattern)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub pattern: String,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8}{}", self.method, self.pattern)
    }
}

/// Per-method trie router.
///
/// Routes are registered up front and the tries are read-only while serving.
/// [`Router::handle`] never fails: unmatched requests become 404 or 405 and
/// handler failures become 500.
#[derive(Clone, Default)]
pub struct Router {
    roots: HashMap<Method, RouteNode>,
    debug: bool,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose handler failure traces in 500 bodies.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Register `handler` for every method in `methods` at `path`.
    ///
    /// Segments written as `<name>` bind a path parameter. Registering the
    /// same method and path again replaces the earlier handler.
    pub fn register<I, S, F>(&mut self, methods: I, path: &str, handler: F)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&Request) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.register_handler(methods, path, Arc::new(handler));
    }

    /// Same as [`Router::register`] for an already shared handler.
    pub fn register_handler<I, S>(&mut self, methods: I, path: &str, handler: Handler)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments = split_path(path);
        for token in methods {
            let token = token.as_ref();
            let Some(method) = parse_method(token) else {
                warn!(method = %token, path = %path, "Skipping route with invalid HTTP method");
                continue;
            };
            debug!(method = %method, path = %path, "Registering route");
            self.roots
                .entry(method)
                .or_default()
                .insert(&segments, Arc::clone(&handler));
        }
    }

    /// Resolve `method` and `path` without invoking the handler.
    #[must_use]
    pub fn route(&self, method: &str, path: &str) -> Option<RouteMatch> {
        let method = parse_method(method)?;
        let root = self.roots.get(&method)?;
        let segments = split_path(path);
        let mut params = ParamVec::new();
        let handler = root.search(&segments, &mut params)?;
        Some(RouteMatch {
            method,
            handler: Arc::clone(handler),
            params,
        })
    }

    /// Sorted list of methods whose trie matches `path`.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<String> {
        let segments = split_path(path);
        let mut allowed: Vec<String> = self
            .roots
            .iter()
            .filter(|(_, root)| root.matches(&segments))
            .map(|(method, _)| method.as_str().to_string())
            .collect();
        allowed.sort();
        allowed
    }

    /// Every registered route, sorted by pattern then method.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes: Vec<RouteInfo> = self
            .roots
            .iter()
            .flat_map(|(method, root)| {
                root.patterns().into_iter().map(move |pattern| RouteInfo {
                    method: method.as_str().to_string(),
                    pattern,
                })
            })
            .collect();
        routes.sort_by(|a, b| a.pattern.cmp(&b.pattern).then_with(|| a.method.cmp(&b.method)));
        routes
    }

    /// Route `request` and produce its response.
    ///
    /// On a match the request's `params` are replaced with the bindings of
    /// the matched route before the handler runs.
    pub fn handle(&self, request: &mut Request) -> Response {
        if let Some(found) = self.route(&request.method, &request.path) {
            debug!(
                method = %found.method,
                path = %request.path,
                params = ?found.params,
                "Route matched"
            );
            request.params = found.params_map();
            return dispatcher::invoke(&found.handler, request, self.debug);
        }

        let allowed = self.allowed_methods(&request.path);
        if allowed.is_empty() {
            debug!(method = %request.method, path = %request.path, "No route matched");
            return Response::text("404 Not Found").with_status(404);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            allowed = ?allowed,
            "Method not allowed"
        );
        Response::text("405 Method Not Allowed")
            .with_status(405)
            .with_header("Allow", allowed.join(", "))
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .field("debug", &self.debug)
            .finish()
    }
}

/// Parse a method token case-insensitively.
fn parse_method(token: &str) -> Option<Method> {
    let upper = token.trim().to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes()).ok()
}
