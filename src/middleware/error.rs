//! Error response formatting
//!
//! Renders [`AppError`] into the JSON bodies the storefront reads.

use crate::error::{AppError, ErrorShape};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Present (and `false`) only on payment envelope responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    /// Human-readable error message
    pub error: String,

    #[serde(rename = "technicalError", skip_serializing_if = "Option::is_none")]
    pub technical_error: Option<String>,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        match error.shape {
            ErrorShape::Plain => Self::plain(error.user_message()),
            ErrorShape::Envelope => Self {
                success: Some(false),
                error: error.user_message(),
                technical_error: error.technical_message(),
            },
        }
    }

    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            success: None,
            error: message.into(),
            technical_error: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = %self,
                code = ?self.error_code(),
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = %self,
                code = ?self.error_code(),
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
