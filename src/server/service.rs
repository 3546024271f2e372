use crate::logging::log_access;
use crate::message::{Request, Response};
use crate::middleware::CorsPolicy;
use crate::router::Router;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use super::connection::respond;
use super::response::{encode_response, status_line};

/// Shared core behind both transport adapters.
///
/// Owns the (read-only) router and the optional CORS policy. Cloning is
/// cheap; clones share the same router.
#[derive(Clone, Debug)]
pub struct AppService {
    router: Arc<Router>,
    cors: Option<CorsPolicy>,
}

impl AppService {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            cors: None,
        }
    }

    #[must_use]
    pub fn with_cors(mut self, cors: Option<CorsPolicy>) -> Self {
        self.cors = cors;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn debug(&self) -> bool {
        self.router.debug()
    }

    /// Produce the response for `request`.
    ///
    /// CORS preflights for paths the router knows are answered here unless
    /// an explicit `OPTIONS` route exists; everything else goes to the router.
    pub fn handle(&self, request: &mut Request) -> Response {
        if let Some(cors) = &self.cors {
            if CorsPolicy::is_preflight(request) && self.router.route("OPTIONS", &request.path).is_none() {
                let allowed = self.router.allowed_methods(&request.path);
                if !allowed.is_empty() {
                    return cors.preflight(request, &allowed);
                }
            }
        }

        let mut response = self.router.handle(request);
        if let Some(cors) = &self.cors {
            cors.apply(request, &mut response);
        }
        response
    }

    /// Raw-connection adapter: read one request, route it, write the reply.
    pub fn serve_connection(&self, mut conn: tiny_http::Request) {
        let started = Instant::now();
        let mut request = Request::from_connection(&mut conn);
        let mut response = self.handle(&mut request);
        let encoded = encode_response(&mut response, request.is_head());
        log_access(&request, encoded.status, started.elapsed());

        if let Err(e) = respond(conn, encoded) {
            warn!(error = %e, method = %request.method, path = %request.path, "Failed to write response");
        }
    }

    /// Environment adapter.
    ///
    /// Builds the request from a CGI-style mapping and `input`, reports the
    /// status line and headers through `start_response` and returns the body
    /// bytes (empty for HEAD).
    pub fn call_environment<F>(
        &self,
        env: &HashMap<String, String>,
        input: &mut dyn Read,
        start_response: F,
    ) -> Vec<u8>
    where
        F: FnOnce(&str, &[(String, String)]),
    {
        let started = Instant::now();
        let mut request = Request::from_environment(env, input);
        let mut response = self.handle(&mut request);
        let encoded = encode_response(&mut response, request.is_head());
        log_access(&request, encoded.status, started.elapsed());

        start_response(&status_line(encoded.status), &encoded.headers);
        encoded.body
    }
}
