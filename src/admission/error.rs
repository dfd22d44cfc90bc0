//! Error types for the admission handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can occur while handling an admission review.
///
/// Everything except [`AdmissionError::Serialization`] is a malformed
/// request and maps to 400. None of them are fatal to the server.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Method other than POST.
    #[error("unable to handle {0} requests, only POST is supported")]
    MethodNotAllowed(String),

    /// Content type is missing or not JSON.
    #[error("wrong content type: {0:?}")]
    UnsupportedContentType(Option<String>),

    /// Body could not be read or exceeded the size limit.
    #[error("unable to read request body: {0}")]
    UnreadableBody(String),

    /// Body is not an admission review document.
    #[error("malformed admission review: {0}")]
    MalformedReview(String),

    /// Admission review without a `request`.
    #[error("empty admission request")]
    MissingRequest,

    /// The embedded object is missing or not a pod.
    #[error("malformed pod object: {0}")]
    MalformedPod(String),

    /// Response could not be serialized.
    #[error("unable to serialize admission response: {0}")]
    Serialization(String),
}

impl AdmissionError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the caller sent something we cannot process.
    #[must_use]
    pub const fn is_malformed_request(&self) -> bool {
        !matches!(self, Self::Serialization(_))
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::MethodNotAllowed(_) => "unable to handle requests other than POST",
            Self::UnsupportedContentType(_) => "wrong application type",
            Self::UnreadableBody(_) => "unable to read request",
            Self::MalformedReview(_) | Self::MissingRequest | Self::MalformedPod(_) => {
                "malformed admission request"
            }
            Self::Serialization(_) => "unable to mutate request",
        };

        (self.status_code(), body).into_response()
    }
}
