//! HTTP error responses for web adapter.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::domain::error::TraderError;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &TraderError) -> StatusCode {
    match err {
        e if e.is_rejection() => StatusCode::BAD_REQUEST,
        TraderError::NoData { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TraderError> for WebError {
    fn from(err: TraderError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejections_are_bad_requests() {
        let errors = [
            TraderError::invalid("missing required parameters"),
            TraderError::InsufficientFunds {
                required: dec!(10.00),
                available: dec!(5.00),
            },
            TraderError::InsufficientShares {
                symbol: "TCS".into(),
                requested: 3,
                held: 1,
            },
            TraderError::NoPosition {
                symbol: "TCS".into(),
            },
        ];
        for err in &errors {
            assert_eq!(status_from_error(err), StatusCode::BAD_REQUEST, "{err}");
        }
    }

    #[test]
    fn no_data_is_not_found() {
        let err = TraderError::NoData {
            symbol: "TCS".into(),
        };
        assert_eq!(status_from_error(&err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn collaborator_failures_are_server_errors() {
        assert_eq!(
            status_from_error(&TraderError::provider("timeout")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_from_error(&TraderError::persistence("locked")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
