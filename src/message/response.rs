use super::body::Body;
use super::headers::HeaderMap;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;
use std::fmt;
use tracing::warn;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// An outbound HTTP response.
///
/// The raw body is kept exactly as the handler set it. The bytes sent on
/// the wire are derived from it on every [`Response::body_bytes`] call,
/// which also refreshes `Content-Length`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub headers: HeaderMap,
    pub body: Body,
    pub status: u16,
}

impl Response {
    /// Build a response, inferring `Content-Type` when the caller left it out.
    ///
    /// Objects and arrays default to JSON, byte bodies to
    /// `application/octet-stream` and everything else to UTF-8 text. Blank
    /// bodies (see [`Body::is_blank`]) are stored as [`Body::Empty`], so an
    /// empty object or array is sent as an empty text body.
    pub fn new(headers: HeaderMap, body: impl Into<Body>, status: u16) -> Self {
        let body = body.into();
        let mut response = Self {
            headers,
            body: if body.is_blank() { Body::Empty } else { body },
            status,
        };
        if !response.headers.contains("Content-Type") {
            let inferred = if response.body.is_structured() {
                CONTENT_TYPE_JSON
            } else if response.body.is_bytes() {
                CONTENT_TYPE_BINARY
            } else {
                CONTENT_TYPE_TEXT
            };
            response.headers.set("Content-Type", inferred);
        }
        response.refresh_content_length();
        response
    }

    /// 200 response with a text body.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(HeaderMap::new(), Body::Text(body.into()), 200)
    }

    /// 200 response with a JSON body.
    pub fn json(value: Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.set("Content-Type", CONTENT_TYPE_JSON);
        Self::new(headers, Body::Json(value), 200)
    }

    /// 200 response with a binary body.
    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self::new(HeaderMap::new(), Body::Bytes(body.into()), 200)
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Replace the raw body. `Content-Type` is left as it is.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
        self.refresh_content_length();
    }

    /// Effective body bytes. Refreshes `Content-Length` as a side effect.
    pub fn body_bytes(&mut self) -> Vec<u8> {
        let bytes = self.render_body();
        self.headers.set("Content-Length", bytes.len().to_string());
        bytes
    }

    fn refresh_content_length(&mut self) {
        let length = self.render_body().len();
        self.headers.set("Content-Length", length.to_string());
    }

    /// Render the raw body without touching the headers.
    ///
    /// Structured bodies under a JSON content type are pretty-printed with a
    /// four-space indent and non-ASCII characters escaped as `\uXXXX`;
    /// everything else goes through [`Body::to_plain_bytes`].
    #[must_use]
    pub fn render_body(&self) -> Vec<u8> {
        match &self.body {
            Body::Json(value) if self.headers.is_json() && self.body.is_structured() => {
                pretty_json(value)
            }
            other => other.to_plain_bytes(),
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(HeaderMap::new(), Body::Empty, 200)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.render_body();
        let head = &bytes[..bytes.len().min(16)];
        write!(
            f,
            "Response \"{}\" {}",
            String::from_utf8_lossy(head),
            self.status
        )
    }
}

fn pretty_json(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = Serializer::with_formatter(&mut out, formatter);
    if let Err(e) = value.serialize(&mut ser) {
        warn!(error = %e, "Failed to pretty-print json body");
        out = value.to_string().into_bytes();
    }
    match String::from_utf8(out) {
        Ok(text) => escape_non_ascii(&text).into_bytes(),
        Err(e) => e.into_bytes(),
    }
}

/// Replace every non-ASCII character with its UTF-16 `\uXXXX` escape(s).
///
/// Only valid on serialized JSON: outside strings the output is pure ASCII.
fn escape_non_ascii(json: &str) -> String {
    if json.is_ascii() {
        return json.to_string();
    }
    let mut out = String::with_capacity(json.len() + 16);
    let mut units = [0u16; 2];
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}
