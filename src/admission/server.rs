//! HTTP routing for the admission endpoints.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use tracing::{info, warn};

use super::{mutate, AdmissionError};
use crate::mutate::InjectionPolicy;

/// Default request body limit (4 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Read-only state shared by all handlers. Built once before serving.
#[derive(Debug, Clone)]
pub struct AdmissionState {
    /// Injection settings.
    pub policy: InjectionPolicy,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl AdmissionState {
    /// State with the default body limit.
    pub fn new(policy: InjectionPolicy) -> Self {
        Self {
            policy,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Build the webhook router.
///
/// All methods are routed to the handlers so that a non-POST request is
/// answered with 400 like any other malformed request.
pub fn router(state: Arc<AdmissionState>) -> Router {
    Router::new()
        .route("/mutate", any(mutate_with_toleration))
        .route("/mutate-no-sgx", any(mutate_without_toleration))
        .with_state(state)
}

async fn mutate_with_toleration(
    State(state): State<Arc<AdmissionState>>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    respond(&state, method, &headers, body, true).await
}

async fn mutate_without_toleration(
    State(state): State<Arc<AdmissionState>>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    respond(&state, method, &headers, body, false).await
}

async fn respond(
    state: &AdmissionState,
    method: Method,
    headers: &HeaderMap,
    body: Body,
    inject_trust_toleration: bool,
) -> Response {
    match handle(state, method, headers, body, inject_trust_toleration).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, status = %e.status_code(), "admission request rejected");
            e.into_response()
        }
    }
}

async fn handle(
    state: &AdmissionState,
    method: Method,
    headers: &HeaderMap,
    body: Body,
    inject_trust_toleration: bool,
) -> Result<Vec<u8>, AdmissionError> {
    if method != Method::POST {
        return Err(AdmissionError::MethodNotAllowed(method.to_string()));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if !content_type.is_some_and(is_json) {
        return Err(AdmissionError::UnsupportedContentType(
            content_type.map(str::to_owned),
        ));
    }

    let bytes = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| AdmissionError::UnreadableBody(e.to_string()))?;

    let mutation = mutate(&bytes, &state.policy, inject_trust_toleration)?;
    info!(
        uid = %mutation.uid,
        operations = mutation.operations.len(),
        sgx = inject_trust_toleration,
        "admission request mutated"
    );
    Ok(mutation.body)
}

/// Media type check that tolerates parameters such as `charset`.
fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}
