//! CORS behaviour through the live listener.

use nkapi::config::ServerConfig;
use nkapi::echo::register_demo_routes;
use nkapi::middleware::{CorsConfigError, CorsPolicyBuilder};
use nkapi::router::Router;
use nkapi::server::AppService;

mod common;
use common::http::send_request;
use common::test_server::TestServer;

fn cors_server() -> TestServer {
    let cors = CorsPolicyBuilder::new()
        .allowed_origins(&["https://app.example"])
        .origin_patterns(&[r"^https://[a-z]+\.preview\.example$"])
        .expose_headers(&["X-Request-Id"])
        .max_age(600)
        .build()
        .unwrap();
    let mut router = Router::new();
    register_demo_routes(&mut router);
    TestServer::start(AppService::new(router).with_cors(Some(cors)))
}

fn preflight(server: &TestServer, path: &str, origin: &str, extra: &[(&str, &str)]) -> common::http::RawResponse {
    let mut headers = vec![("Origin", origin), ("Access-Control-Request-Method", "POST")];
    headers.extend_from_slice(extra);
    send_request(&server.addr(), "OPTIONS", path, &headers, b"")
}

#[test]
fn test_preflight_allowed_origin() {
    let server = cors_server();
    let resp = preflight(&server, "/status/200", "https://app.example", &[]);
    assert_eq!(resp.status, 204);
    assert!(resp.body.is_empty());
    assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("https://app.example"));
    assert_eq!(resp.header("Access-Control-Allow-Methods"), Some("GET, POST"));
    assert_eq!(
        resp.header("Access-Control-Allow-Headers"),
        Some("Content-Type, Authorization")
    );
    assert_eq!(resp.header("Access-Control-Max-Age"), Some("600"));
    assert_eq!(resp.header("Vary"), Some("Origin"));
}

#[test]
fn test_preflight_echoes_requested_headers() {
    let server = cors_server();
    let resp = preflight(
        &server,
        "/",
        "https://app.example",
        &[("Access-Control-Request-Headers", "X-Custom, Content-Type")],
    );
    assert_eq!(resp.status, 204);
    assert_eq!(
        resp.header("Access-Control-Allow-Headers"),
        Some("X-Custom, Content-Type")
    );
}

#[test]
fn test_preflight_pattern_origin() {
    let server = cors_server();
    let resp = preflight(&server, "/", "https://pr.preview.example", &[]);
    assert_eq!(resp.status, 204);
    assert_eq!(
        resp.header("Access-Control-Allow-Origin"),
        Some("https://pr.preview.example")
    );
}

#[test]
fn test_preflight_rejected_origin() {
    let server = cors_server();
    let resp = preflight(&server, "/", "https://evil.example", &[]);
    assert_eq!(resp.status, 403);
    assert!(resp.header("Access-Control-Allow-Origin").is_none());
}

#[test]
fn test_preflight_unknown_path_falls_through() {
    let server = cors_server();
    let resp = preflight(&server, "/missing", "https://app.example", &[]);
    assert_eq!(resp.status, 404);
}

#[test]
fn test_actual_request_headers() {
    let server = cors_server();
    let resp = send_request(
        &server.addr(),
        "GET",
        "/status/200",
        &[("Origin", "https://app.example")],
        b"",
    );
    assert_eq!(resp.status, 200);
    assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("https://app.example"));
    assert_eq!(resp.header("Access-Control-Expose-Headers"), Some("X-Request-Id"));

    let resp = send_request(
        &server.addr(),
        "GET",
        "/status/200",
        &[("Origin", "https://evil.example")],
        b"",
    );
    assert_eq!(resp.status, 200);
    assert!(resp.header("Access-Control-Allow-Origin").is_none());
}

#[test]
fn test_wildcard_policy_from_config() {
    let config = ServerConfig::from_toml(
        r#"
        [cors]
        allowed_origins = ["*"]
        "#,
    )
    .unwrap();
    let cors = config.cors_policy().unwrap();
    let mut router = Router::new();
    register_demo_routes(&mut router);
    let server = TestServer::start(AppService::new(router).with_cors(cors));

    let resp = preflight(&server, "/", "https://anything.example", &[]);
    assert_eq!(resp.status, 204);
    assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("*"));
    assert!(resp.header("Vary").is_none());
}

#[test]
fn test_invalid_policies_rejected() {
    assert_eq!(
        CorsPolicyBuilder::new()
            .allowed_origins(&["*"])
            .allow_credentials(true)
            .build()
            .unwrap_err(),
        CorsConfigError::WildcardWithCredentials
    );
    assert!(matches!(
        CorsPolicyBuilder::new().allowed_origins(&["app.example"]).build(),
        Err(CorsConfigError::InvalidOriginFormat { .. })
    ));
    assert!(matches!(
        CorsPolicyBuilder::new().origin_patterns(&["(unclosed"]).build(),
        Err(CorsConfigError::InvalidPattern { .. })
    ));
}
