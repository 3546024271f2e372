mod builder;
mod error;

pub use builder::CorsPolicyBuilder;
pub use error::CorsConfigError;

use regex::Regex;
use tracing::debug;

use crate::message::{Request, Response};

/// Origin validation strategy
#[derive(Clone)]
pub enum OriginValidation {
    /// Exact string matching
    Exact(Vec<String>),
    /// Wildcard (allow all origins)
    Wildcard,
    /// Regex pattern matching
    Regex(Vec<Regex>),
}

impl std::fmt::Debug for OriginValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OriginValidation::Exact(origins) => f.debug_tuple("Exact").field(origins).finish(),
            OriginValidation::Wildcard => write!(f, "Wildcard"),
            OriginValidation::Regex(patterns) => f
                .debug_tuple("Regex")
                .field(&patterns.iter().map(Regex::as_str).collect::<Vec<_>>())
                .finish(),
        }
    }
}

impl OriginValidation {
    fn is_allowed(&self, origin: &str) -> bool {
        match self {
            OriginValidation::Exact(origins) => origins.iter().any(|o| o == origin),
            OriginValidation::Wildcard => true,
            OriginValidation::Regex(patterns) => patterns.iter().any(|re| re.is_match(origin)),
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, OriginValidation::Wildcard)
    }
}

/// Optional CORS layer in front of the router.
///
/// Answers preflight requests on behalf of the router and decorates actual
/// responses for allowed origins. Requests without an `Origin` header are
/// left alone.
///
/// Build one with [`CorsPolicyBuilder`].
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pub(crate) origin_validation: OriginValidation,
    pub(crate) allowed_headers: Vec<String>,
    pub(crate) allow_credentials: bool,
    pub(crate) expose_headers: Vec<String>,
    pub(crate) max_age: Option<u32>,
}

impl CorsPolicy {
    pub fn builder() -> CorsPolicyBuilder {
        CorsPolicyBuilder::new()
    }

    /// Value for `Access-Control-Allow-Origin`, or `None` if `origin` is not
    /// allowed. Wildcard policies answer `"*"`.
    #[must_use]
    pub fn validate_origin(&self, origin: &str) -> Option<String> {
        if !self.origin_validation.is_allowed(origin) {
            return None;
        }
        if self.origin_validation.is_wildcard() {
            Some("*".to_string())
        } else {
            Some(origin.to_string())
        }
    }

    /// `OPTIONS` with both `Origin` and `Access-Control-Request-Method`.
    #[must_use]
    pub fn is_preflight(request: &Request) -> bool {
        request.method.eq_ignore_ascii_case("OPTIONS")
            && request.headers.contains("Origin")
            && request.headers.contains("Access-Control-Request-Method")
    }

    /// Answer a preflight request.
    ///
    /// `allowed_methods` is the router's method set for the requested path
    /// and must be non-empty. Disallowed origins get a 403.
    pub fn preflight(&self, request: &Request, allowed_methods: &[String]) -> Response {
        let origin = request.header("Origin").unwrap_or_default();
        let Some(allow_origin) = self.validate_origin(origin) else {
            debug!(origin = %origin, path = %request.path, "CORS preflight rejected");
            return Response::text("403 Forbidden").with_status(403);
        };

        let allow_headers = match request.header("Access-Control-Request-Headers") {
            Some(requested) => requested.to_string(),
            None => self.allowed_headers.join(", "),
        };

        let mut response = Response::default()
            .with_status(204)
            .with_header("Access-Control-Allow-Origin", allow_origin)
            .with_header("Access-Control-Allow-Methods", allowed_methods.join(", "));
        if !allow_headers.is_empty() {
            response.headers.set("Access-Control-Allow-Headers", allow_headers);
        }
        if let Some(max_age) = self.max_age {
            response.headers.set("Access-Control-Max-Age", max_age.to_string());
        }
        if self.allow_credentials {
            response.headers.set("Access-Control-Allow-Credentials", "true");
        }
        if !self.origin_validation.is_wildcard() {
            response.headers.set("Vary", "Origin");
        }

        debug!(origin = %origin, path = %request.path, methods = ?allowed_methods, "CORS preflight accepted");
        response
    }

    /// Add CORS headers to an actual response.
    ///
    /// Responses to disallowed or missing origins are returned unchanged.
    pub fn apply(&self, request: &Request, response: &mut Response) {
        let Some(origin) = request.header("Origin") else {
            return;
        };
        let Some(allow_origin) = self.validate_origin(origin) else {
            debug!(origin = %origin, "Origin not allowed, skipping CORS headers");
            return;
        };

        response.headers.set("Access-Control-Allow-Origin", allow_origin);
        if self.allow_credentials {
            response.headers.set("Access-Control-Allow-Credentials", "true");
        }
        if !self.expose_headers.is_empty() {
            response
                .headers
                .set("Access-Control-Expose-Headers", self.expose_headers.join(", "));
        }
        if !self.origin_validation.is_wildcard() && !response.headers.contains("Vary") {
            response.headers.set("Vary", "Origin");
        }
    }
}
