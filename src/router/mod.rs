//! # Router Module
//!
//! Per-method trie routing for nkapi.
//!
//! ## Overview
//!
//! The router is responsible for:
//! - Registering handlers for a set of methods at a path pattern
//! - Matching an incoming method and path to a handler
//! - Extracting `<name>` path parameters from the matched branch
//! - Telling "no such path" (404) apart from "wrong method" (405)
//!
//! ## Matching rules
//!
//! Paths are split on `/` with empty segments dropped, so leading, trailing
//! and doubled slashes never matter. Literal segments take precedence over
//! parameters at every depth; a literal branch that dead-ends backtracks into
//! the parameter branch. A handler only matches when every segment has been
//! consumed. `.` and `..` are plain segments and are never resolved.
//!
//! ## Example
//!
//! ```rust
//! use nkapi::message::{Request, Response};
//! use nkapi::router::Router;
//!
//! let mut router = Router::new();
//! router.register(["GET"], "/user/<uid>", |req: &Request| {
//!     Ok(Response::text(format!("user {}", req.param("uid").unwrap_or_default())))
//! });
//!
//! let mut request = Request::builder("GET", "/user/42").build();
//! let response = router.handle(&mut request);
//! assert_eq!(response.status, 200);
//! assert_eq!(request.param("uid"), Some("42"));
//!
//! let mut wrong = Request::builder("POST", "/user/42").build();
//! let response = router.handle(&mut wrong);
//! assert_eq!(response.status, 405);
//! assert_eq!(response.headers.get("Allow"), Some("GET"));
//! ```

mod core;
mod trie;

pub use core::{Handler, ParamVec, RouteInfo, RouteMatch, Router, MAX_INLINE_PARAMS};
