use regex::Regex;
use url::Url;

use super::{CorsConfigError, CorsPolicy, OriginValidation};

/// Builder for [`CorsPolicy`].
///
/// ```rust
/// use nkapi::middleware::CorsPolicyBuilder;
///
/// let cors = CorsPolicyBuilder::new()
///     .allowed_origins(&["https://example.com"])
///     .origin_patterns(&[r"^https://.*\.example\.org$"])
///     .allow_credentials(true)
///     .max_age(600)
///     .build()
///     .expect("valid CORS configuration");
/// assert!(cors.validate_origin("https://api.example.org").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct CorsPolicyBuilder {
    allowed_origins: Vec<String>,
    origin_patterns: Vec<String>,
    allowed_headers: Vec<String>,
    allow_credentials: bool,
    expose_headers: Vec<String>,
    max_age: Option<u32>,
}

impl CorsPolicyBuilder {
    pub fn new() -> Self {
        Self {
            allowed_origins: vec![],
            origin_patterns: vec![],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allow_credentials: false,
            expose_headers: vec![],
            max_age: None,
        }
    }

    /// Exact origins to allow. `"*"` allows every origin.
    pub fn allowed_origins<S: AsRef<str>>(mut self, origins: &[S]) -> Self {
        self.allowed_origins = origins.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Regular expressions matched against the `Origin` header.
    pub fn origin_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.origin_patterns = patterns.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Headers announced in preflight responses when the client did not ask
    /// for specific ones.
    pub fn allowed_headers<S: AsRef<str>>(mut self, headers: &[S]) -> Self {
        self.allowed_headers = headers.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn expose_headers<S: AsRef<str>>(mut self, headers: &[S]) -> Self {
        self.expose_headers = headers.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Preflight cache duration in seconds.
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn build(self) -> Result<CorsPolicy, CorsConfigError> {
        let wildcard = self.allowed_origins.iter().any(|o| o == "*");

        if self.allow_credentials && wildcard {
            return Err(CorsConfigError::WildcardWithCredentials);
        }
        if self.allow_credentials && self.allowed_origins.is_empty() && self.origin_patterns.is_empty() {
            return Err(CorsConfigError::EmptyOriginsWithCredentials);
        }

        for origin in self.allowed_origins.iter().filter(|o| *o != "*") {
            if !is_valid_origin(origin) {
                return Err(CorsConfigError::InvalidOriginFormat {
                    origin: origin.clone(),
                });
            }
        }

        let origin_validation = if wildcard {
            OriginValidation::Wildcard
        } else if self.origin_patterns.is_empty() {
            OriginValidation::Exact(self.allowed_origins)
        } else {
            // Exact origins join the pattern list as anchored literals.
            let mut patterns = Vec::with_capacity(self.allowed_origins.len() + self.origin_patterns.len());
            for origin in &self.allowed_origins {
                patterns.push(compile(&format!("^{}$", regex::escape(origin)))?);
            }
            for pattern in &self.origin_patterns {
                patterns.push(compile(pattern)?);
            }
            OriginValidation::Regex(patterns)
        };

        Ok(CorsPolicy {
            origin_validation,
            allowed_headers: self.allowed_headers,
            allow_credentials: self.allow_credentials,
            expose_headers: self.expose_headers,
            max_age: self.max_age,
        })
    }
}

impl Default for CorsPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str) -> Result<Regex, CorsConfigError> {
    Regex::new(pattern).map_err(|e| CorsConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// `scheme://host[:port]` with nothing after the authority.
fn is_valid_origin(origin: &str) -> bool {
    if origin.ends_with('/') {
        return false;
    }
    match Url::parse(origin) {
        Ok(url) => {
            url.host_str().is_some()
                && url.path() == "/"
                && url.query().is_none()
                && url.fragment().is_none()
                && url.username().is_empty()
                && url.password().is_none()
        }
        Err(_) => false,
    }
}
