//! # NKAPI
//!
//! **NKAPI** is a small HTTP application toolkit: a request/response model,
//! a per-method trie router and a blocking development server.
//!
//! ## Architecture
//!
//! - **[`message`]** - [`Request`], [`Response`], [`HeaderMap`] and [`Body`]
//! - **[`router`]** - path registration and matching, 404/405 disambiguation
//! - **[`dispatcher`]** - failure boundary turning handler errors into 500s
//! - **[`server`]** - [`AppService`] with its raw-connection and
//!   environment adapters, plus the `tiny_http` listener
//! - **[`middleware`]** - CORS preflight and response headers
//! - **[`database`]** - mutex-guarded SQLite helper with committing sessions
//! - **[`config`]** - layered [`ServerConfig`] (defaults, TOML, environment)
//! - **[`logging`]** - `tracing` subscriber setup and access logging
//! - **[`cli`]** - the `nkapi` command line
//!
//! ### Request flow
//!
//! ```text
//! listener -> Request::from_connection -> AppService::handle
//!          -> (CORS preflight | Router::handle -> dispatcher::invoke)
//!          -> encode_response -> wire
//! ```
//!
//! Requests are handled one at a time; a slow handler blocks the listener.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nkapi::{Request, Response, Server};
//! use serde_json::json;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new("127.0.0.1", 8000, true)?;
//!     server.register(["GET"], "/hello/<name>", |req: &Request| {
//!         Ok(Response::json(json!({ "hello": req.param("name") })))
//!     });
//!     server.start()
//! }
//! ```

pub mod cli;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod echo;
pub mod logging;
pub mod message;
pub mod middleware;
pub mod router;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use database::{Database, DatabaseConfig, DatabaseError};
pub use logging::{colorize, init_logging, LogConfig};
pub use message::{Body, HeaderMap, Request, Response};
pub use middleware::{CorsPolicy, CorsPolicyBuilder};
pub use router::{Handler, RouteMatch, Router};
pub use server::{allocate_ephemeral_port, AppService, HttpServer, Server, ServerHandle};
