//! # Message Model
//!
//! Request and response value objects shared by the router and both
//! transport adapters.
//!
//! - [`HeaderMap`] - case-insensitive headers with explicit append semantics
//! - [`Body`] - raw text, raw bytes or a decoded JSON value
//! - [`Request`] - built once per exchange from a [`Connection`] or a
//!   CGI-style environment mapping
//! - [`Response`] - infers its `Content-Type` and derives wire bytes on demand

mod body;
mod headers;
mod query;
mod request;
mod response;

pub use body::Body;
pub use headers::{canonical_name, HeaderMap, MULTI_VALUE_SEPARATOR};
pub use query::{normalize_query, parse_query_string, split_target, Query, QueryValue, RawQuery};
pub use request::{ClientAddr, Connection, Params, Request, RequestBuilder};
pub use response::{Response, CONTENT_TYPE_BINARY, CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT};
