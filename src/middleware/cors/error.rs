use std::fmt;

/// CORS configuration error
///
/// Returned by `CorsPolicyBuilder::build()` when the configuration is invalid
/// or violates CORS requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsConfigError {
    /// Wildcard origin (`*`) cannot be used with credentials
    WildcardWithCredentials,
    /// The origin string is not of the form `scheme://host[:port]`
    InvalidOriginFormat {
        /// The invalid origin string
        origin: String,
    },
    /// Credentials were enabled without naming any origin
    EmptyOriginsWithCredentials,
    /// An origin pattern failed to compile
    InvalidPattern {
        pattern: String,
        reason: String,
    },
}

impl fmt::Display for CorsConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorsConfigError::WildcardWithCredentials => {
                write!(
                    f,
                    "CORS configuration error: Cannot use wildcard origin (*) with credentials. \
                    When allow_credentials is true, you must specify exact origins."
                )
            }
            CorsConfigError::InvalidOriginFormat { origin } => {
                write!(
                    f,
                    "CORS configuration error: Invalid origin format '{}'. \
                    Expected format: scheme://host:port (e.g., https://example.com)",
                    origin
                )
            }
            CorsConfigError::EmptyOriginsWithCredentials => {
                write!(
                    f,
                    "CORS configuration error: Cannot use credentials with empty origins list. \
                    When allow_credentials is true, at least one origin must be specified."
                )
            }
            CorsConfigError::InvalidPattern { pattern, reason } => {
                write!(
                    f,
                    "CORS configuration error: Invalid origin pattern '{}': {}",
                    pattern, reason
                )
            }
        }
    }
}

impl std::error::Error for CorsConfigError {}
