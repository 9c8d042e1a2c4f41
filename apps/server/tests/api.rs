//! Transport smoke tests: the router wired to a real registry, driven
//! without a socket.

use armlet_server::{api, Config, Registry};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

fn app() -> Router {
    api::router(Registry::new(Config::default()))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_and_version_respond() {
    let app = app();
    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = app.oneshot(get("/api/v1/version")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let app = app();

    let response = app
        .clone()
        .oneshot(post("/api/v1/session", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = body_json(response).await["sessionId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/v1/session/{id}/load"),
            r#"{"source": ".org 0x8000\nMOV R0, #7\nSWI #0\n"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["success"], true);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/session/{id}/registers")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "loaded");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/session/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A destroyed session's ID answers 404 from then on.
    let response = app
        .oneshot(get(&format!("/api/v1/session/{id}/registers")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn parse_failures_return_400_with_diagnostics() {
    let app = app();
    let response = app
        .clone()
        .oneshot(post("/api/v1/session", "{}"))
        .await
        .unwrap();
    let id = body_json(response).await["sessionId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(post(
            &format!("/api/v1/session/{id}/load"),
            r#"{"source": "FROB R1\n"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let reply = body_json(response).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["errors"][0]["line"], 1);
}

#[tokio::test]
async fn examples_catalogue_is_read_only_by_name() {
    let app = app();
    let response = app.clone().oneshot(get("/api/v1/examples")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert!(list["examples"].as_array().unwrap().len() >= 4);

    let response = app
        .clone()
        .oneshot(get("/api/v1/examples/hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get("/api/v1/examples/%2E%2E%2Fsecrets"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_sessions_are_404() {
    let app = app();
    let response = app
        .oneshot(get(
            "/api/v1/session/00000000-0000-0000-0000-000000000000/registers",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
