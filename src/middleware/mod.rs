//! Optional layers applied around the router.

mod cors;

pub use cors::{CorsConfigError, CorsPolicy, CorsPolicyBuilder, OriginValidation};
