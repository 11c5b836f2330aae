use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use regcheck_check::CheckError;

/// Every failure leaves the service as `{"detail": "..."}`: 400 for requests
/// the caller can fix, 500 with the underlying error text for the rest.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::BadRequest(detail) => warn!(%status, detail, "request rejected"),
            ApiError::Internal(detail) => error!(%status, detail, "request failed"),
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<regcheck_core::Error> for ApiError {
    fn from(err: regcheck_core::Error) -> Self {
        match err {
            regcheck_core::Error::DuplicateRule(_) | regcheck_core::Error::InvalidRule(_) => {
                ApiError::BadRequest(err.to_string())
            }
            // Undecodable uploads are not distinguished from other failures.
            regcheck_core::Error::Decode { .. } | regcheck_core::Error::InvalidPriceTable(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<CheckError> for ApiError {
    fn from(err: CheckError) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
