use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::client::{BackendClient, BackendError, BackendReply};
use crate::backend::retry::Retryable;
use crate::backend::session::SessionStore;
use crate::payments::types::{InitiatePaymentRequest, InitiatePaymentResponse, RetryPaymentRequest};

pub type PaymentClientResult<T> = Result<T, PaymentClientError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentClientError {
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("Invalid payment response: {message}")]
    Decode { message: String },
}

impl PaymentClientError {
    /// Message suitable for a toast, or `None` when it would be meaningless
    pub fn user_message(&self) -> Option<String> {
        match self {
            PaymentClientError::Rejected { message, .. } if !message.is_empty() => {
                Some(message.clone())
            }
            PaymentClientError::Transport { message } if !message.is_empty() => {
                Some(message.clone())
            }
            _ => None,
        }
    }
}

impl Retryable for PaymentClientError {
    fn status_code(&self) -> Option<u16> {
        match self {
            PaymentClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, PaymentClientError::Transport { .. })
    }
}

impl From<BackendError> for PaymentClientError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Transport { message, .. } => PaymentClientError::Transport { message },
            BackendError::Decode { message } => PaymentClientError::Decode { message },
            BackendError::Status { status, body } => PaymentClientError::Rejected {
                status,
                message: crate::backend::client::message_from(&body)
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            },
        }
    }
}

/// Storefront payment routes as seen from the checkout.
#[async_trait]
pub trait PaymentApi: Send + Sync {
    /// Starts a gateway session. A `success: false` body is returned as `Ok`.
    async fn initiate(
        &self,
        request: &InitiatePaymentRequest,
    ) -> PaymentClientResult<InitiatePaymentResponse>;

    /// Re-initiates payment for an existing order. Non-2xx is an error.
    async fn retry(&self, request: &RetryPaymentRequest)
        -> PaymentClientResult<InitiatePaymentResponse>;

    /// Attaches a payment session to an order.
    async fn link(&self, reference: &str, order_id: &str) -> PaymentClientResult<()>;
}

/// [`PaymentApi`] over HTTP against the storefront's own `/api/payments` routes.
#[derive(Clone)]
pub struct HttpPaymentApi {
    client: BackendClient,
    session: Option<Arc<dyn SessionStore>>,
}

impl HttpPaymentApi {
    pub fn new(client: BackendClient) -> Self {
        Self {
            client,
            session: None,
        }
    }

    pub fn with_session(mut self, session: Arc<dyn SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    async fn token(&self) -> Option<String> {
        match &self.session {
            Some(session) => session.token().await,
            None => None,
        }
    }

    fn decode(reply: &BackendReply) -> PaymentClientResult<InitiatePaymentResponse> {
        serde_json::from_value(reply.body.clone()).map_err(|e| PaymentClientError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl PaymentApi for HttpPaymentApi {
    async fn initiate(
        &self,
        request: &InitiatePaymentRequest,
    ) -> PaymentClientResult<InitiatePaymentResponse> {
        let body = serde_json::to_value(request).map_err(|e| PaymentClientError::Decode {
            message: e.to_string(),
        })?;
        let token = self.token().await;
        let reply = self
            .client
            .post("/api/payments/kpay/initiate")
            .bearer(token.as_deref())
            .json(body)
            .send()
            .await?;

        if reply.body.is_null() {
            return Err(PaymentClientError::Rejected {
                status: reply.status,
                message: String::new(),
            });
        }

        let response = Self::decode(&reply)?;
        info!(
            status = reply.status,
            success = response.success,
            "payment initiation answered"
        );
        Ok(response)
    }

    async fn retry(
        &self,
        request: &RetryPaymentRequest,
    ) -> PaymentClientResult<InitiatePaymentResponse> {
        let body = serde_json::to_value(request).map_err(|e| PaymentClientError::Decode {
            message: e.to_string(),
        })?;
        let token = self.token().await;
        let reply = self
            .client
            .post("/api/payments/retry")
            .bearer(token.as_deref())
            .json(body)
            .send()
            .await?;

        if !reply.is_success() {
            let message = reply.body
                .get("error")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .unwrap_or_else(|| reply.message_or("Retry payment failed"));
            warn!(status = reply.status, error = %message, "payment retry rejected");
            return Err(PaymentClientError::Rejected {
                status: reply.status,
                message,
            });
        }

        Self::decode(&reply)
    }

    async fn link(&self, reference: &str, order_id: &str) -> PaymentClientResult<()> {
        let token = self.token().await;
        let reply = self
            .client
            .patch(&format!("/api/payments/{}", reference))
            .bearer(token.as_deref())
            .json(json!({ "order_id": order_id }))
            .send()
            .await?;

        reply.into_result().map(|_| ()).map_err(PaymentClientError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;

    fn api(server: &MockServer) -> HttpPaymentApi {
        HttpPaymentApi::new(BackendClient::new(&BackendConfig::new(server.base_url())).unwrap())
    }

    #[tokio::test]
    async fn test_initiate_returns_failure_envelope() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/payments/kpay/initiate");
                then.status(402)
                    .json_body(json!({ "success": false, "error": "Insufficient balance" }));
            })
            .await;

        let response = api(&server)
            .initiate(&InitiatePaymentRequest::default())
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Insufficient balance"));
    }

    #[tokio::test]
    async fn test_retry_surfaces_rejection_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/payments/retry");
                then.status(400).json_body(json!({ "error": "Missing required fields" }));
            })
            .await;

        let err = api(&server)
            .retry(&RetryPaymentRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.user_message().as_deref(), Some("Missing required fields"));
        assert_eq!(err.status_code(), Some(400));
    }

    #[tokio::test]
    async fn test_link_patches_payment_reference() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/api/payments/PAY-123")
                    .json_body(json!({ "order_id": "order-1" }));
                then.status(200).json_body(json!({ "success": true }));
            })
            .await;

        api(&server).link("PAY-123", "order-1").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_session_token_is_attached() {
        use crate::backend::session::MemorySessionStore;

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/payments/kpay/initiate")
                    .header("authorization", "Bearer user-token");
                then.status(200)
                    .json_body(json!({ "success": true, "reference": "PAY-9" }));
            })
            .await;

        let session = Arc::new(MemorySessionStore::with_tokens("user-token", None));
        let response = api(&server)
            .with_session(session)
            .initiate(&InitiatePaymentRequest::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.reference.as_deref(), Some("PAY-9"));
    }
}
