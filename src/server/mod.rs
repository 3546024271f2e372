//! Transport side: the shared [`AppService`], the raw-connection and
//! environment adapters, and the blocking `tiny_http` listener.

pub mod connection;
pub mod http_server;
pub mod response;
#[allow(clippy::module_inception)]
pub mod server;
pub mod service;

pub use http_server::{allocate_ephemeral_port, HttpServer, ServerHandle};
pub use response::{encode_response, status_line, status_reason, EncodedResponse};
pub use server::Server;
pub use service::AppService;
