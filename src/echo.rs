//! Demo application served by `nkapi serve`.
//!
//! - `GET|POST /` echoes the request back, together with a snapshot of the
//!   response as it looked before the echo was added
//! - `GET|POST /status/<code>` answers with the requested status code

use anyhow::{bail, Context};
use serde_json::json;

use crate::message::{Request, Response};
use crate::router::Router;

const DEMO_METHODS: [&str; 2] = ["GET", "POST"];

/// Echo the request back as JSON.
pub fn echo_handler(req: &Request) -> anyhow::Result<Response> {
    let request_info = json!({
        "method": req.method,
        "path": req.path,
        "query": req.query,
        "headers": req.headers,
        "body": req.body,
        "client_address": req.client_address,
    });

    let mut response = Response::json(json!({ "request": request_info }));
    let rendered = String::from_utf8_lossy(&response.body_bytes()).into_owned();
    let response_info = json!({
        "status": response.status,
        "headers": response.headers,
        "body": rendered,
    });
    response.set_body(json!({ "request": request_info, "response": response_info }));
    Ok(response)
}

/// Respond with the status code taken from the path.
pub fn status_handler(req: &Request) -> anyhow::Result<Response> {
    let code = req.param("code").unwrap_or_default();
    let status: u16 = code
        .parse()
        .with_context(|| format!("invalid status code '{code}'"))?;
    if !(100..=999).contains(&status) {
        bail!("status code {status} is out of range");
    }
    Ok(Response::text(format!("status code {code}")).with_status(status))
}

/// Register the demo routes on `router`.
pub fn register_demo_routes(router: &mut Router) {
    router.register(DEMO_METHODS, "/", echo_handler);
    router.register(DEMO_METHODS, "/status/<code>", status_handler);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Body;

    fn demo_router() -> Router {
        let mut router = Router::new();
        register_demo_routes(&mut router);
        router
    }

    #[test]
    fn test_echo_reflects_request() {
        let mut request = Request::builder("POST", "/")
            .query("q", ["1"])
            .header("Content-Type", "application/json")
            .body(r#"{"hello": "world"}"#)
            .build();
        let response = demo_router().handle(&mut request);
        assert_eq!(response.status, 200);

        let body = response.body.as_json().cloned().unwrap_or_default();
        assert_eq!(body["request"]["method"], "POST");
        assert_eq!(body["request"]["query"]["q"], "1");
        assert_eq!(body["request"]["body"]["hello"], "world");
        assert_eq!(body["response"]["status"], 200);
        assert_eq!(body["response"]["headers"]["Content-Type"], "application/json");
    }

    #[test]
    fn test_status_route() {
        let mut request = Request::builder("GET", "/status/418").build();
        let response = demo_router().handle(&mut request);
        assert_eq!(response.status, 418);
        assert_eq!(response.body, Body::Text("status code 418".into()));
    }

    #[test]
    fn test_invalid_status_is_a_handler_failure() {
        for path in ["/status/abc", "/status/42", "/status/70000"] {
            let mut request = Request::builder("GET", path).build();
            let response = demo_router().handle(&mut request);
            assert_eq!(response.status, 500, "path {path}");
        }
    }

    #[test]
    fn test_demo_routes_listing() {
        let patterns: Vec<String> = demo_router()
            .routes()
            .into_iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(
            patterns,
            vec![
                "GET     /",
                "POST    /",
                "GET     /status/<code>",
                "POST    /status/<code>",
            ]
        );
    }
}
