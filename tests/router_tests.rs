//! Router and message model through the public API.

use nkapi::message::{Body, HeaderMap, Request, Response};
use nkapi::router::Router;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn text(body: &'static str) -> impl Fn(&Request) -> anyhow::Result<Response> + Send + Sync + 'static {
    move |_req: &Request| -> anyhow::Result<Response> { Ok(Response::text(body)) }
}

fn dispatch(router: &Router, method: &str, path: &str) -> (Response, Request) {
    let mut request = Request::builder(method, path).build();
    let response = router.handle(&mut request);
    (response, request)
}

#[test]
fn test_slash_variants_resolve_identically() {
    let mut router = Router::new();
    router.register(["GET"], "/a/b/", text("ab"));
    for path in ["a//b", "/a/b", "/a/b///", "a/b"] {
        let (response, _) = dispatch(&router, "GET", path);
        assert_eq!(response.body.as_text(), Some("ab"), "path {path}");
    }
}

#[test]
fn test_literal_precedence_and_params() {
    let mut router = Router::new();
    router.register(["GET"], "/obj/<id>", |req: &Request| {
        Ok(Response::text(format!("param {}", req.param("id").unwrap_or_default())))
    });
    router.register(["GET"], "/obj/list", text("literal"));

    let (response, request) = dispatch(&router, "GET", "/obj/list");
    assert_eq!(response.body.as_text(), Some("literal"));
    assert!(request.params.is_empty());

    let (response, request) = dispatch(&router, "GET", "/obj/42");
    assert_eq!(response.body.as_text(), Some("param 42"));
    assert_eq!(request.param("id"), Some("42"));
}

#[test]
fn test_nested_params() {
    let mut router = Router::new();
    router.register(["GET"], "/user/<uid>/post/<pid>", text("post"));
    let (_, request) = dispatch(&router, "GET", "/user/u1/post/p9");
    assert_eq!(request.param("uid"), Some("u1"));
    assert_eq!(request.param("pid"), Some("p9"));
    assert_eq!(request.params.len(), 2);
}

#[test]
fn test_method_case_insensitive() {
    let mut router = Router::new();
    router.register(["post"], "/submit", text("ok"));
    let (response, _) = dispatch(&router, "Post", "/submit");
    assert_eq!(response.status, 200);
}

#[test]
fn test_404_vs_405() {
    let mut router = Router::new();
    router.register(["PUT", "GET"], "/thing", text("thing"));
    router.register(["DELETE"], "/thing", text("gone"));

    let (response, _) = dispatch(&router, "POST", "/thing");
    assert_eq!(response.status, 405);
    assert_eq!(response.headers.get("Allow"), Some("DELETE, GET, PUT"));

    let (response, _) = dispatch(&router, "GET", "/other");
    assert_eq!(response.status, 404);
}

#[test]
fn test_no_prefix_matching() {
    let mut router = Router::new();
    router.register(["GET"], "/a", text("a"));
    let (response, _) = dispatch(&router, "GET", "/a/b");
    assert_eq!(response.status, 404);
}

#[test]
fn test_last_registration_wins() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut router = Router::new();
    router.register(["GET"], "/dup", text("first"));
    let counter = Arc::clone(&calls);
    router.register(["GET"], "/dup", move |_req: &Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Response::text("second"))
    });

    let (response, _) = dispatch(&router, "GET", "/dup");
    assert_eq!(response.body.as_text(), Some("second"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(router.routes().len(), 1);
}

#[test]
fn test_json_response_rendering() {
    let headers: HeaderMap = [("Content-Type", "application/json")].into_iter().collect();
    let mut response = Response::new(headers, json!({"a": 1}), 200);
    let bytes = response.body_bytes();
    assert_eq!(bytes, b"{\n    \"a\": 1\n}");
    assert_eq!(response.headers.get("Content-Length"), Some(bytes.len().to_string().as_str()));
    assert_eq!(bytes.len(), 14);
}

#[test]
fn test_text_response_defaults() {
    let mut response = Response::new(HeaderMap::new(), "hello", 200);
    assert_eq!(response.headers.get("Content-Type"), Some("text/plain; charset=utf-8"));
    assert_eq!(response.body_bytes(), b"hello");
    assert_eq!(response.headers.get("Content-Length"), Some("5"));
}

#[test]
fn test_json_request_is_decoded() {
    let request = Request::builder("POST", "/")
        .header("Content-Type", "application/json")
        .body(r#"{"a":1}"#)
        .build();
    assert_eq!(request.body, Body::Json(json!({"a": 1})));
}

#[test]
fn test_query_collapse() {
    let request = Request::builder("GET", "/")
        .query("x", ["1"])
        .query("y", ["a", "b"])
        .build();
    assert_eq!(
        serde_json::to_value(&request.query).unwrap(),
        json!({"x": "1", "y": ["a", "b"]})
    );
}
