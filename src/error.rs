//! Error handling for the gateway's HTTP surface
//!
//! Every handler failure is an [`AppError`]. The error carries the HTTP status
//! mapping, the client-facing message and the body shape the storefront expects
//! for that endpoint: a bare `{error}` object or the payment envelope
//! `{success: false, error, technicalError}`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::backend::client::BackendError;

/// Machine-readable error codes, used in logs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "METHOD_NOT_ALLOWED")]
    MethodNotAllowed,
    #[serde(rename = "UPSTREAM_ERROR")]
    UpstreamError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Body layout of the error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorShape {
    /// `{ "error": "..." }`
    Plain,
    /// `{ "success": false, "error": "...", "technicalError": "..." }`
    Envelope,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    /// Missing or malformed request fields
    Validation { message: String },
    /// No bearer token or auth cookie on a protected route
    Unauthorized,
    MethodNotAllowed,
    /// A failure reported with an explicit status, usually relayed from the backend
    Upstream { status: u16, message: String },
    /// Transport failures, undecodable bodies and anything unexpected
    Internal { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub shape: ErrorShape,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            shape: ErrorShape::Plain,
            request_id: None,
            context: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation {
            message: message.into(),
        })
    }

    pub fn unauthorized() -> Self {
        Self::new(AppErrorKind::Unauthorized)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(AppErrorKind::MethodNotAllowed)
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Upstream {
            status,
            message: message.into(),
        })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Internal {
            message: message.into(),
        })
    }

    /// Render this error with the payment envelope.
    pub fn enveloped(mut self) -> Self {
        self.shape = ErrorShape::Envelope;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Validation { .. } => 400,
            AppErrorKind::Unauthorized => 401,
            AppErrorKind::MethodNotAllowed => 405,
            AppErrorKind::Upstream { status, .. } => *status,
            AppErrorKind::Internal { .. } => 500,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Validation { .. } => ErrorCode::ValidationError,
            AppErrorKind::Unauthorized => ErrorCode::Unauthorized,
            AppErrorKind::MethodNotAllowed => ErrorCode::MethodNotAllowed,
            AppErrorKind::Upstream { .. } => ErrorCode::UpstreamError,
            AppErrorKind::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Message placed in the `error` field of the response body
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Validation { message } => message.clone(),
            AppErrorKind::Unauthorized => "Unauthorized".to_string(),
            AppErrorKind::MethodNotAllowed => "Method not allowed".to_string(),
            AppErrorKind::Upstream { message, .. } => message.clone(),
            AppErrorKind::Internal { .. } => "Internal server error".to_string(),
        }
    }

    /// Underlying cause, exposed as `technicalError` in enveloped bodies
    pub fn technical_message(&self) -> Option<String> {
        match &self.kind {
            AppErrorKind::Internal { message } => Some(message.clone()),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Upstream { status, .. } => {
                *status == 429 || matches!(status, 502..=504)
            }
            AppErrorKind::Internal { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.technical_message() {
            Some(technical) => write!(f, "{}: {}", self.user_message(), technical),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { status, body } => AppError::upstream(
                status,
                crate::backend::client::message_from(&body)
                    .unwrap_or_else(|| format!("Backend request failed with status {}", status)),
            ),
            other => AppError::internal(other.to_string()),
        }
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_error() {
        let error = AppError::validation("Payment ID is required");

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert_eq!(error.user_message(), "Payment ID is required");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_upstream_error_keeps_backend_status() {
        let error = AppError::upstream(402, "Insufficient balance");

        assert_eq!(error.status_code(), 402);
        assert_eq!(error.user_message(), "Insufficient balance");
        assert!(!error.is_retryable());
        assert!(AppError::upstream(503, "down").is_retryable());
    }

    #[test]
    fn test_internal_error_hides_cause_from_message() {
        let error = AppError::internal("connection refused").enveloped();

        assert_eq!(error.status_code(), 500);
        assert_eq!(error.shape, ErrorShape::Envelope);
        assert_eq!(error.user_message(), "Internal server error");
        assert_eq!(error.technical_message().as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_backend_status_conversion() {
        let error: AppError = BackendError::Status {
            status: 404,
            body: json!({ "message": "Payment not found" }),
        }
        .into();

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.user_message(), "Payment not found");
    }

    #[test]
    fn test_request_id_and_context_are_carried() {
        let error = AppError::internal("pool timeout")
            .with_request_id("req-42")
            .with_context("finalize");

        assert_eq!(error.request_id.as_deref(), Some("req-42"));
        assert_eq!(error.context.as_deref(), Some("finalize"));
        assert_eq!(error.to_string(), "Internal server error: pool timeout");
    }
}
