//! Mapping of store errors onto HTTP responses.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::core::errors::StoreError;

/// Error returned by route handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request body or query string could not be decoded.
    BadRequest(String),
    /// A store operation failed.
    Store(StoreError),
    /// The store did not answer within the request timeout.
    Timeout(Duration),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Store(StoreError::Validation(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::DeadlineExceeded(_)) | Self::Timeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(message) | Self::Store(StoreError::Validation(message)) => {
                message.clone()
            }
            Self::Store(err @ StoreError::NotFound(_)) => {
                let mut message = err.to_string();
                if let Some(first) = message.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                message
            }
            Self::Store(StoreError::DeadlineExceeded(_)) => {
                tracing::warn!("Write reached the database after its deadline; rolled back");
                "Request timed out".to_string()
            }
            Self::Store(err) => {
                tracing::error!("Store failure: {err}");
                "Internal storage error".to_string()
            }
            Self::Timeout(limit) => {
                tracing::warn!("Request exceeded {}s store timeout", limit.as_secs());
                "Request timed out".to_string()
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
