//! Raw-connection transport over `tiny_http`.

use crate::message::{ClientAddr, Connection};
use std::io::{self, Read};
use tiny_http::Header;
use tracing::warn;

use super::response::EncodedResponse;

impl Connection for tiny_http::Request {
    fn method(&self) -> String {
        tiny_http::Request::method(self).to_string()
    }

    fn target(&self) -> String {
        self.url().to_string()
    }

    fn headers(&self) -> Vec<(String, String)> {
        tiny_http::Request::headers(self)
            .iter()
            .map(|h| (h.field.to_string(), h.value.to_string()))
            .collect()
    }

    fn client_address(&self) -> Option<ClientAddr> {
        self.remote_addr().copied().map(ClientAddr::from)
    }

    fn body_reader(&mut self) -> &mut dyn Read {
        self.as_reader()
    }
}

/// Write an encoded response back on the connection.
///
/// `tiny_http` takes `Content-Length` from the header list and never writes a
/// body for HEAD requests on its own.
pub fn respond(request: tiny_http::Request, encoded: EncodedResponse) -> io::Result<()> {
    let mut response = tiny_http::Response::from_data(encoded.body).with_status_code(encoded.status);
    for (name, value) in &encoded.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => warn!(header = %name, "Dropping header that is not valid on the wire"),
        }
    }
    request.respond(response)
}
