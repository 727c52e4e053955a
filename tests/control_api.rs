//! Control API driven through the router.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::RecordingFactory;
use proxy_gateway::api;
use proxy_gateway::config::parse_config;
use proxy_gateway::executor;
use proxy_gateway::net::Protocol;
use proxy_gateway::observability::LogLevel;
use proxy_gateway::tunnel::Mode;

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn get_configs_reports_current_state() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let snapshot = parse_config("port = 7890\nauthentication = [\"alice:pw\"]\nmode = \"direct\"").unwrap();
    executor::apply(&runtime, snapshot, true).await;
    let app = api::router(runtime, "");

    let response = send(&app, Method::GET, "/configs", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({
            "port": 7890,
            "socks-port": 0,
            "redir-port": 0,
            "redir-bind-address": "*",
            "allow-lan": false,
            "bind-address": "*",
            "mode": "direct",
            "log-level": "info",
            "authentication": ["alice"],
        })
    );
}

#[tokio::test]
async fn patch_allow_lan_keeps_known_ports() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    executor::apply(&runtime, parse_config("port = 7890").unwrap(), true).await;
    let app = api::router(runtime.clone(), "");

    let response = send(&app, Method::PATCH, "/configs", Some(json!({ "allow-lan": true }))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(factory.binds(Protocol::Http), vec!["[::1]:7890", ":7890"]);
    assert_eq!(runtime.inbounds().address(Protocol::Http).as_deref(), Some(":7890"));

    let body = json_body(send(&app, Method::GET, "/configs", None).await).await;
    assert_eq!(body["port"], 7890);
    assert_eq!(body["allow-lan"], true);
}

#[tokio::test]
async fn patch_updates_mode_level_and_ports() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");

    let patch = json!({ "socks-port": 1080, "mode": "global", "log-level": "debug", "port": null });
    let response = send(&app, Method::PATCH, "/configs", Some(patch)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_eq!(factory.binds(Protocol::Socks), vec!["[::1]:1080"]);
    assert!(factory.binds(Protocol::Http).is_empty());
    assert_eq!(runtime.tunnel().mode(), Mode::Global);
    assert_eq!(runtime.log().level(), LogLevel::Debug);
}

#[tokio::test]
async fn patch_with_bind_failure_still_succeeds() {
    let factory = RecordingFactory::new();
    factory.refuse("[::1]:7890");
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");

    let response = send(&app, Method::PATCH, "/configs", Some(json!({ "port": 7890 }))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(runtime.inbounds().address(Protocol::Http), None);
}

#[tokio::test]
async fn patch_malformed_body_is_rejected() {
    let runtime = common::runtime_with(&RecordingFactory::new());
    let app = api::router(runtime.clone(), "");

    let response = send(&app, Method::PATCH, "/configs", Some(json!({ "port": "seven" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "message": "Body invalid" }));

    let request = Request::builder()
        .method(Method::PATCH)
        .uri("/configs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_body_without_content_type_is_applied() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");

    let request = Request::builder()
        .method(Method::PATCH)
        .uri("/configs")
        .body(Body::from(r#"{"port": 7890}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(factory.binds(Protocol::Http), vec!["[::1]:7890"]);
}

#[tokio::test]
async fn put_body_with_text_content_type_is_applied() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");
    let path = common::write_config("socks-port = 7891\n");

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/configs?force=true")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(json!({ "path": path }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(factory.binds(Protocol::Socks), vec!["[::1]:7891"]);

    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn put_bad_query_is_reported_as_json() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");
    let path = common::write_config("port = 7890\n");

    let response = send(
        &app,
        Method::PUT,
        "/configs?force=true&force=false",
        Some(json!({ "path": path })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("force"));
    assert!(factory.events().is_empty());

    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn put_relative_path_is_rejected_without_parsing() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");

    let response = send(&app, Method::PUT, "/configs?force=true", Some(json!({ "path": "config.yaml" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({ "message": "path is not an absolute path" })
    );
    assert!(factory.events().is_empty());
}

#[tokio::test]
async fn put_applies_file_and_respects_force() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");
    let path = common::write_config("port = 7890\nrules = [\"MATCH,DIRECT\"]\n");
    let body = json!({ "path": path });

    let response = send(&app, Method::PUT, "/configs", Some(body.clone())).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(runtime.tunnel().rules().len(), 1);
    assert!(factory.events().is_empty(), "listeners untouched without force");

    let response = send(&app, Method::PUT, "/configs?force=true", Some(body)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(factory.binds(Protocol::Http), vec!["[::1]:7890"]);

    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn put_forwards_parse_errors() {
    let factory = RecordingFactory::new();
    let runtime = common::runtime_with(&factory);
    let app = api::router(runtime.clone(), "");
    let path = common::write_config("port = [broken\n");

    let response = send(&app, Method::PUT, "/configs?force=true", Some(json!({ "path": path }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().starts_with("Parse error"));
    assert!(factory.events().is_empty());

    std::fs::remove_file(path).unwrap();
}

#[tokio::test]
async fn secret_is_required_when_configured() {
    let runtime = common::runtime_with(&RecordingFactory::new());
    let app = api::router(runtime, "s3cret");

    let response = send(&app, Method::GET, "/configs", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({ "message": "Unauthorized" }));

    let request = Request::builder()
        .uri("/configs")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/configs")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn version_is_reported() {
    let runtime = common::runtime_with(&RecordingFactory::new());
    let app = api::router(runtime, "");

    let response = send(&app, Method::GET, "/version", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["version"], env!("CARGO_PKG_VERSION"));
}
