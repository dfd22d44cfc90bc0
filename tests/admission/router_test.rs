//! HTTP contract of `/mutate` and `/mutate-no-sgx`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use tower::ServiceExt;

use marblemesh::admission::{router, AdmissionState};
use marblemesh::mutate::InjectionPolicy;

use super::fixture::{testpod_review, COORDINATOR, UID};

fn app() -> Router {
    router(Arc::new(AdmissionState::new(InjectionPolicy::new(
        COORDINATOR,
    ))))
}

fn request(method: Method, uri: &str, content_type: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    match builder.body(Body::from(body)) {
        Ok(request) => request,
        Err(err) => panic!("request should build: {err}"),
    }
}

async fn send(app: Router, request: Request<Body>) -> Response {
    match app.oneshot(request).await {
        Ok(response) => response,
        Err(err) => match err {},
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = match to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => panic!("body should be readable: {err}"),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => panic!("body should be JSON: {err}"),
    }
}

fn patch_ops(response: &Value) -> Vec<Value> {
    let encoded = response["response"]["patch"].as_str().unwrap_or_default();
    let raw = match STANDARD.decode(encoded) {
        Ok(raw) => raw,
        Err(err) => panic!("patch should be base64: {err}"),
    };
    match serde_json::from_slice(&raw) {
        Ok(ops) => ops,
        Err(err) => panic!("patch should be a JSON array: {err}"),
    }
}

#[tokio::test]
async fn mutate_injects_env_and_toleration() {
    let response = send(
        app(),
        request(Method::POST, "/mutate", Some("application/json"), testpod_review()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/json")
    );

    let review = body_json(response).await;
    assert_eq!(review["response"]["uid"], UID);
    assert_eq!(review["response"]["allowed"], true);
    assert_eq!(review["response"]["patchType"], "JSONPatch");

    let ops = patch_ops(&review);
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0]["path"], "/spec/containers/0/env");
    assert_eq!(ops[1]["path"], "/spec/tolerations");
}

#[tokio::test]
async fn mutate_no_sgx_skips_toleration() {
    let response = send(
        app(),
        request(
            Method::POST,
            "/mutate-no-sgx",
            Some("application/json; charset=utf-8"),
            testpod_review(),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let ops = patch_ops(&body_json(response).await);
    assert_eq!(ops.len(), 1);
    assert!(ops.iter().all(|op| op["path"] != "/spec/tolerations"));
}

#[tokio::test]
async fn non_post_is_a_client_error() {
    for method in [Method::GET, Method::PUT, Method::DELETE] {
        let response = send(
            app(),
            request(method.clone(), "/mutate", Some("application/json"), testpod_review()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{method}");
    }
}

#[tokio::test]
async fn wrong_content_type_is_a_client_error() {
    for content_type in [Some("text/plain"), None] {
        let response = send(
            app(),
            request(Method::POST, "/mutate", content_type, testpod_review()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn malformed_bodies_are_client_errors() {
    let bodies: [&[u8]; 4] = [
        b"",
        b"{not json",
        br#"{"apiVersion":"admission.k8s.io/v1","kind":"AdmissionReview"}"#,
        br#"{"request":{"uid":"1","object":{"spec":{"containers":7}}}}"#,
    ];
    for body in bodies {
        let response = send(
            app(),
            request(Method::POST, "/mutate", Some("application/json"), body.to_vec()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn oversized_body_is_a_client_error() {
    let state = AdmissionState {
        policy: InjectionPolicy::new(COORDINATOR),
        max_body_bytes: 64,
    };
    let response = send(
        router(Arc::new(state)),
        request(Method::POST, "/mutate", Some("application/json"), testpod_review()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let response = send(
        app(),
        request(Method::POST, "/validate", Some("application/json"), testpod_review()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_reviews_share_state() {
    let app = app();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            send(
                app,
                request(Method::POST, "/mutate", Some("application/json"), testpod_review()),
            )
            .await
            .status()
        }));
    }
    for handle in handles {
        match handle.await {
            Ok(status) => assert_eq!(status, StatusCode::OK),
            Err(err) => panic!("request task should not panic: {err}"),
        }
    }
}
