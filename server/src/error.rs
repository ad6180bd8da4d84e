//! Request-boundary error taxonomy.
//!
//! Handlers return `Result<_, ApiError>` and propagate with `?`; the
//! `IntoResponse` impl maps each kind to its HTTP status and logs it once.
//! Parse failures of optional inputs never reach here — they degrade to
//! "input absent" locally.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::index::IndexError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed required input: bad identifier, bad unit, invalid filters
    /// where they are mandatory.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown search state, document, or site.
    #[error("not found")]
    NotFound,

    /// The index call failed or its response did not decode.
    #[error(transparent)]
    Upstream(#[from] IndexError),

    /// Programmer error surfaced as a 500.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Upstream(err) => error!(code = status.as_u16(), error = %err, "index call failed"),
            ApiError::Internal(message) => error!(code = status.as_u16(), error = %message, "internal error"),
            _ => warn!(code = status.as_u16(), error = %self, "request rejected"),
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_the_taxonomy() {
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Upstream(IndexError::NoAggregations).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::Internal("x".to_string()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
