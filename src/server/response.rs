use crate::message::Response;
use http::StatusCode;

/// Canonical reason phrase, or `""` for unknown codes.
pub fn status_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("")
}

/// `"200 OK"`-style status line (without the protocol version).
pub fn status_line(status: u16) -> String {
    let reason = status_reason(status);
    if reason.is_empty() {
        status.to_string()
    } else {
        format!("{status} {reason}")
    }
}

/// A response flattened for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Derive wire headers and body from `response`.
///
/// `Content-Length` always describes the full effective body, but the body
/// itself is dropped for HEAD requests.
pub fn encode_response(response: &mut Response, head: bool) -> EncodedResponse {
    let body = response.body_bytes();
    let headers = response
        .headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EncodedResponse {
        status: response.status,
        headers,
        body: if head { Vec::new() } else { body },
    }
}
