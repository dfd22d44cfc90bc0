//! Mutating admission webhook for marble pods.
//!
//! Two endpoints share one handler:
//! - `/mutate` injects marble parameters and the SGX toleration
//! - `/mutate-no-sgx` injects marble parameters only
//!
//! Every review that decodes is allowed. The only product is the JSON patch.

mod error;
mod server;

pub use error::AdmissionError;
pub use server::{router, AdmissionState, DEFAULT_MAX_BODY_BYTES};

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use k8s_openapi::api::core::v1 as corev1;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mutate::{build_patch, InjectionPolicy, PatchOperation, PodSpec};

/// API version of the review envelopes we answer.
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
/// Kind of the review envelopes we answer.
pub const ADMISSION_KIND: &str = "AdmissionReview";
/// Patch type marker for JSON patches.
pub const JSON_PATCH_TYPE: &str = "JSONPatch";

/// Incoming review envelope. Only the fields we use are decoded.
#[derive(Debug, Deserialize)]
pub struct AdmissionReview {
    /// The request; absent in malformed reviews.
    #[serde(default)]
    pub request: Option<AdmissionRequest>,
}

/// The request part of a review.
#[derive(Debug, Deserialize)]
pub struct AdmissionRequest {
    /// Identifier echoed back in the response.
    pub uid: String,
    /// Namespace of the object being admitted.
    #[serde(default)]
    pub namespace: Option<String>,
    /// The raw object being admitted.
    #[serde(default)]
    pub object: Option<Value>,
}

/// Outgoing review envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    /// Always [`ADMISSION_API_VERSION`].
    pub api_version: &'static str,
    /// Always [`ADMISSION_KIND`].
    pub kind: &'static str,
    /// The verdict.
    pub response: AdmissionResponse,
}

/// The response part of a review.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// Request identifier.
    pub uid: String,
    /// Always true; this webhook only mutates.
    pub allowed: bool,
    /// Always [`JSON_PATCH_TYPE`].
    pub patch_type: &'static str,
    /// Base64 of the JSON operation array.
    pub patch: String,
    /// Audit annotations recorded by the API server.
    pub audit_annotations: BTreeMap<String, String>,
}

/// Result of a successful review: the encoded response plus what went in it.
#[derive(Debug)]
pub struct Mutation {
    /// Request identifier.
    pub uid: String,
    /// The operations that were encoded.
    pub operations: Vec<PatchOperation>,
    /// Serialized review response.
    pub body: Vec<u8>,
}

/// Decode a review, build the patch for its pod, and encode the response.
///
/// # Errors
///
/// Returns a malformed-request [`AdmissionError`] when the review or pod
/// cannot be decoded, and [`AdmissionError::Serialization`] when the
/// response cannot be encoded.
pub fn mutate(
    body: &[u8],
    policy: &InjectionPolicy,
    inject_trust_toleration: bool,
) -> Result<Mutation, AdmissionError> {
    let review: AdmissionReview = serde_json::from_slice(body)
        .map_err(|e| AdmissionError::MalformedReview(e.to_string()))?;
    let request = review.request.ok_or(AdmissionError::MissingRequest)?;

    let object = request
        .object
        .ok_or_else(|| AdmissionError::MalformedPod("request carries no object".to_owned()))?;
    let pod: corev1::Pod =
        serde_json::from_value(object).map_err(|e| AdmissionError::MalformedPod(e.to_string()))?;

    let spec = PodSpec::from_pod(&pod).with_default_namespace(request.namespace.as_deref());
    let operations = build_patch(&spec, policy, inject_trust_toleration);

    let patch = serde_json::to_vec(&operations)
        .map_err(|e| AdmissionError::Serialization(e.to_string()))?;

    let response = AdmissionReviewResponse {
        api_version: ADMISSION_API_VERSION,
        kind: ADMISSION_KIND,
        response: AdmissionResponse {
            uid: request.uid.clone(),
            allowed: true,
            patch_type: JSON_PATCH_TYPE,
            patch: STANDARD.encode(patch),
            audit_annotations: BTreeMap::from([("mutated".to_owned(), "true".to_owned())]),
        },
    };
    let body =
        serde_json::to_vec(&response).map_err(|e| AdmissionError::Serialization(e.to_string()))?;

    Ok(Mutation {
        uid: request.uid,
        operations,
        body,
    })
}
