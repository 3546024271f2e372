use super::body::Body;
use super::headers::HeaderMap;
use super::query::{normalize_query, parse_query_string, split_target, Query, RawQuery};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Path parameters bound by the router, keyed by parameter name.
pub type Params = BTreeMap<String, String>;

/// Remote peer of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientAddr {
    pub host: String,
    pub port: u16,
}

impl ClientAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<SocketAddr> for ClientAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A raw inbound connection, as seen by the connection transport.
///
/// Implemented for `tiny_http::Request` by the server; tests provide their
/// own in-memory implementations.
pub trait Connection {
    /// Request method token as sent by the client.
    fn method(&self) -> String;
    /// Request target (path plus optional query string).
    fn target(&self) -> String;
    /// Header pairs in the order they were received.
    fn headers(&self) -> Vec<(String, String)>;
    fn client_address(&self) -> Option<ClientAddr>;
    /// Body stream; at most `Content-Length` bytes are read from it.
    fn body_reader(&mut self) -> &mut dyn Read;
}

/// An inbound HTTP exchange.
///
/// Built once per request by one of the transport adapters (or directly in
/// tests). `params` stays empty until the router fills it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Query,
    pub params: Params,
    pub headers: HeaderMap,
    pub body: Body,
    pub client_address: Option<ClientAddr>,
}

impl Request {
    /// Build a request, normalizing query values and decoding JSON bodies.
    ///
    /// A string body is parsed as JSON when the `Content-Type` mentions
    /// `application/json`. Parse failures keep the original string and emit a
    /// warning. Byte bodies are never decoded.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        query: RawQuery,
        headers: HeaderMap,
        body: Body,
        client_address: Option<ClientAddr>,
    ) -> Self {
        let body = match body {
            Body::Text(text) if headers.is_json() => match serde_json::from_str::<Value>(&text) {
                Ok(value) => Body::Json(value),
                Err(e) => {
                    warn!(error = %e, "Couldn't decode json in the request body");
                    Body::Text(text)
                }
            },
            other => other,
        };

        Self {
            method: method.into(),
            path: path.into(),
            query: normalize_query(query),
            params: Params::new(),
            headers,
            body,
            client_address,
        }
    }

    /// Start building a request for `method` and `path`.
    pub fn builder(method: impl Into<String>, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    /// Build a request from a raw connection.
    ///
    /// Reads exactly `Content-Length` bytes from the body stream. A missing,
    /// non-numeric or negative length reads nothing and leaves the body empty.
    pub fn from_connection<C: Connection + ?Sized>(conn: &mut C) -> Self {
        let method = conn.method();
        let target = conn.target();
        let headers: HeaderMap = conn.headers().into_iter().collect();
        let client_address = conn.client_address();

        let length = content_length(headers.get("Content-Length"));
        let body = read_body(conn.body_reader(), length);

        let (path, query_string) = split_target(&target);
        Self::new(
            method,
            path,
            parse_query_string(query_string),
            headers,
            body,
            client_address,
        )
    }

    /// Build a request from a CGI-style environment mapping.
    ///
    /// Headers come from `HTTP_*` keys (prefix stripped, `_` → `-`) plus
    /// `CONTENT_TYPE` and `CONTENT_LENGTH`. The body is read from `input`.
    pub fn from_environment(env: &HashMap<String, String>, input: &mut dyn Read) -> Self {
        let mut keys: Vec<&String> = env.keys().collect();
        keys.sort();

        let mut headers = HeaderMap::new();
        for key in keys {
            let name = if let Some(rest) = key.strip_prefix("HTTP_") {
                rest.replace('_', "-")
            } else if key == "CONTENT_TYPE" || key == "CONTENT_LENGTH" {
                key.replace('_', "-")
            } else {
                continue;
            };
            headers.append(&name, env[key].as_str());
        }

        let length = content_length(env.get("CONTENT_LENGTH").map(String::as_str));
        let body = read_body(input, length);

        let client_address = env.get("REMOTE_ADDR").map(|host| {
            let port = env
                .get("REMOTE_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(0);
            ClientAddr::new(host.clone(), port)
        });

        Self::new(
            env.get("REQUEST_METHOD").map_or("GET", String::as_str),
            env.get("PATH_INFO").map_or("/", String::as_str),
            parse_query_string(env.get("QUERY_STRING").map_or("", String::as_str)),
            headers,
            body,
            client_address,
        )
    }

    /// Get a path parameter bound by the router.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Get a header by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Whether the method is HEAD (case-insensitive).
    #[must_use]
    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Fluent construction of a [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: String,
    path: String,
    query: RawQuery,
    headers: HeaderMap,
    body: Body,
    client_address: Option<ClientAddr>,
}

impl RequestBuilder {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: RawQuery::new(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            client_address: None,
        }
    }

    /// Add query values for `key` (appends to any values already present).
    #[must_use]
    pub fn query<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .entry(key.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn client_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.client_address = Some(ClientAddr::new(host, port));
        self
    }

    #[must_use]
    pub fn build(self) -> Request {
        Request::new(
            self.method,
            self.path,
            self.query,
            self.headers,
            self.body,
            self.client_address,
        )
    }
}

/// Declared body length; anything unusable counts as zero.
fn content_length(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

fn read_body(reader: &mut dyn Read, length: usize) -> Body {
    if length == 0 {
        return Body::Empty;
    }
    let mut buf = Vec::with_capacity(length.min(64 * 1024));
    if let Err(e) = reader.take(length as u64).read_to_end(&mut buf) {
        warn!(error = %e, expected = length, read = buf.len(), "Failed to read request body");
    }
    if buf.len() < length {
        debug!(expected = length, read = buf.len(), "Request body shorter than Content-Length");
    }
    Body::Text(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::QueryValue;
    use serde_json::json;
    use std::io::Cursor;

    struct DummyConnection {
        method: &'static str,
        target: &'static str,
        headers: Vec<(String, String)>,
        body: Cursor<Vec<u8>>,
    }

    impl DummyConnection {
        fn new(method: &'static str, target: &'static str, headers: &[(&str, &str)], body: &[u8]) -> Self {
            Self {
                method,
                target,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: Cursor::new(body.to_vec()),
            }
        }
    }

    impl Connection for DummyConnection {
        fn method(&self) -> String {
            self.method.to_string()
        }
        fn target(&self) -> String {
            self.target.to_string()
        }
        fn headers(&self) -> Vec<(String, String)> {
            self.headers.clone()
        }
        fn client_address(&self) -> Option<ClientAddr> {
            Some(ClientAddr::new("10.0.0.1", 5555))
        }
        fn body_reader(&mut self) -> &mut dyn Read {
            &mut self.body
        }
    }

    #[test]
    fn test_basic_initialization_and_query_flattening() {
        let request = Request::builder("GET", "/alpha")
            .query("x", ["1"])
            .query("y", ["a", "b"])
            .header("Content-Type", "text/plain")
            .client_address("127.0.0.1", 1234)
            .build();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/alpha");
        assert_eq!(request.query["x"], QueryValue::from("1"));
        assert_eq!(request.query["y"], QueryValue::from(vec!["a", "b"]));
        assert!(request.params.is_empty());
        assert_eq!(request.header("content-type"), Some("text/plain"));
        assert_eq!(request.body, Body::Empty);
        assert_eq!(request.client_address, Some(ClientAddr::new("127.0.0.1", 1234)));
    }

    #[test]
    fn test_json_body_is_decoded() {
        let request = Request::builder("POST", "/json")
            .header("Content-Type", "application/json")
            .body(r#"{"a":1}"#)
            .build();
        assert_eq!(request.body, Body::Json(json!({"a": 1})));
    }

    #[test]
    fn test_json_content_type_match_is_case_insensitive() {
        let request = Request::builder("POST", "/json")
            .header("content-type", "Application/JSON; charset=utf-8")
            .body("[1, 2]")
            .build();
        assert_eq!(request.body, Body::Json(json!([1, 2])));
    }

    #[test]
    fn test_invalid_json_keeps_string() {
        let request = Request::builder("POST", "/json")
            .header("Content-Type", "application/json")
            .body("{not valid json]")
            .build();
        assert_eq!(request.body, Body::Text("{not valid json]".into()));
    }

    #[test]
    fn test_bytes_body_never_decoded() {
        let request = Request::builder("POST", "/x")
            .header("Content-Type", "application/json")
            .body(br#"{"a":1}"#.as_slice())
            .build();
        assert!(request.body.is_bytes());
    }

    #[test]
    fn test_empty_method_and_path() {
        let request = Request::builder("", "").build();
        assert_eq!(request.method, "");
        assert_eq!(request.path, "");
        assert!(request.query.is_empty());
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_unicode_path_and_query_keys() {
        let request = Request::builder("GET", "/💀🔥")
            .query("ключ", ["знач"])
            .query("🔥", ["x"])
            .build();
        assert_eq!(request.path, "/💀🔥");
        assert_eq!(request.query["ключ"], QueryValue::from("знач"));
        assert_eq!(request.query["🔥"], QueryValue::from("x"));
    }

    #[test]
    fn test_display() {
        let request = Request::builder("GET", "/xyz").build();
        assert_eq!(request.to_string(), "GET /xyz");
    }

    #[test]
    fn test_from_connection_parses_path_query_and_body() {
        let mut conn = DummyConnection::new(
            "POST",
            "/abc?x=1&y=2",
            &[("Content-Type", "application/json"), ("Content-Length", "9")],
            br#"{"a": 10}"#,
        );
        let request = Request::from_connection(&mut conn);
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/abc");
        assert_eq!(request.query["x"], QueryValue::from("1"));
        assert_eq!(request.query["y"], QueryValue::from("2"));
        assert_eq!(request.body, Body::Json(json!({"a": 10})));
        assert_eq!(request.client_address, Some(ClientAddr::new("10.0.0.1", 5555)));
    }

    #[test]
    fn test_from_connection_reads_only_declared_length() {
        let mut conn = DummyConnection::new(
            "POST",
            "/t",
            &[("Content-Length", "5")],
            b"hello world",
        );
        let request = Request::from_connection(&mut conn);
        assert_eq!(request.body, Body::Text("hello".into()));
    }

    #[test]
    fn test_from_connection_with_bad_length() {
        for bad in ["-10", "abc", ""] {
            let mut conn = DummyConnection::new(
                "POST",
                "/neg",
                &[("Content-Type", "application/json"), ("Content-Length", bad)],
                b"{}",
            );
            let request = Request::from_connection(&mut conn);
            assert_eq!(request.body, Body::Empty, "length {bad:?}");
        }
        let mut conn = DummyConnection::new("POST", "/none", &[], b"data");
        assert_eq!(Request::from_connection(&mut conn).body, Body::Empty);
    }

    #[test]
    fn test_from_connection_decodes_invalid_utf8_lossily() {
        let mut conn = DummyConnection::new("POST", "/b", &[("Content-Length", "3")], &[0x61, 0xff, 0x62]);
        let request = Request::from_connection(&mut conn);
        assert_eq!(request.body, Body::Text("a\u{fffd}b".into()));
    }

    fn environ(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_environment() {
        let env = environ(&[
            ("REQUEST_METHOD", "PUT"),
            ("PATH_INFO", "/upload"),
            ("QUERY_STRING", "k=9&k=10"),
            ("CONTENT_TYPE", "application/json"),
            ("CONTENT_LENGTH", "8"),
            ("REMOTE_ADDR", "78.105.99.107"),
            ("REMOTE_PORT", "443"),
            ("HTTP_X_TEST_HEADER", "xyz"),
            ("SERVER_NAME", "ignored"),
        ]);
        let mut input = Cursor::new(br#"{"x": 1}"#.to_vec());
        let request = Request::from_environment(&env, &mut input);

        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/upload");
        assert_eq!(request.query["k"], QueryValue::from(vec!["9", "10"]));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("X-Test-Header"), Some("xyz"));
        assert!(!request.headers.contains("Server-Name"));
        assert_eq!(request.body, Body::Json(json!({"x": 1})));
        assert_eq!(request.client_address, Some(ClientAddr::new("78.105.99.107", 443)));
    }

    #[test]
    fn test_from_environment_defaults_and_invalid_length() {
        let env = environ(&[("CONTENT_LENGTH", "not-a-number")]);
        let mut input = Cursor::new(b"should not read".to_vec());
        let request = Request::from_environment(&env, &mut input);
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/");
        assert_eq!(request.body, Body::Empty);
        assert!(request.client_address.is_none());
    }

    #[test]
    fn test_from_environment_large_body() {
        let giant = "x".repeat(5_000_000);
        let env = environ(&[
            ("REQUEST_METHOD", "POST"),
            ("PATH_INFO", "/big"),
            ("CONTENT_TYPE", "text/plain"),
            ("CONTENT_LENGTH", "5000000"),
        ]);
        let mut input = Cursor::new(giant.into_bytes());
        let request = Request::from_environment(&env, &mut input);
        assert_eq!(request.body.as_text().map(str::len), Some(5_000_000));
    }
}
