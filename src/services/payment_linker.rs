//! Best-effort attachment of the stored payment session to a new order.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::retry::{Retryable, RetryPolicy};
use crate::payments::client::{PaymentApi, PaymentClientError};
use crate::services::session_storage::SessionStorage;

/// Session-storage key holding the reference of the current payment session.
pub const PAYMENT_REFERENCE_KEY: &str = "kpay_reference";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// The backend answered 409: the session already points at an order.
    AlreadyLinked,
    NoReference,
    Failed { attempts: u32, last_error: String },
}

impl LinkOutcome {
    /// Whether the caller may consider the order and payment reconciled.
    pub fn succeeded(&self) -> bool {
        !matches!(self, LinkOutcome::Failed { .. })
    }
}

#[derive(Clone)]
pub struct PaymentLinker {
    payments: Arc<dyn PaymentApi>,
    storage: Arc<dyn SessionStorage>,
    policy: RetryPolicy,
}

impl PaymentLinker {
    pub fn new(payments: Arc<dyn PaymentApi>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            payments,
            storage,
            policy: RetryPolicy::payment_link(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Links the stored reference to `order_id`. The reference is dropped
    /// from storage once linked and kept when every attempt failed.
    pub async fn link(&self, order_id: &str) -> LinkOutcome {
        let reference = match self.storage.get(PAYMENT_REFERENCE_KEY).await {
            Some(reference) if !reference.is_empty() => reference,
            _ => return LinkOutcome::NoReference,
        };

        let attempts = AtomicU32::new(0);
        let result = self
            .policy
            .execute(|attempt| {
                attempts.store(attempt, Ordering::SeqCst);
                let reference = reference.clone();
                async move {
                    match self.payments.link(&reference, order_id).await {
                        Ok(()) => Ok(LinkOutcome::Linked),
                        Err(e) if e.status_code() == Some(409) => Ok(LinkOutcome::AlreadyLinked),
                        Err(e) => Err(e),
                    }
                }
            })
            .await;

        match result {
            Ok(outcome) => {
                self.storage.remove(PAYMENT_REFERENCE_KEY).await;
                info!(
                    order_id,
                    reference = %reference,
                    outcome = ?outcome,
                    "payment session linked to order"
                );
                outcome
            }
            Err(e) => {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(
                    order_id,
                    reference = %reference,
                    attempts,
                    error = %e,
                    "payment linking gave up"
                );
                LinkOutcome::Failed {
                    attempts,
                    last_error: describe(&e),
                }
            }
        }
    }
}

fn describe(error: &PaymentClientError) -> String {
    error.user_message().unwrap_or_else(|| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::retry::Backoff;
    use crate::payments::client::PaymentClientResult;
    use crate::payments::types::{
        InitiatePaymentRequest, InitiatePaymentResponse, RetryPaymentRequest,
    };
    use crate::services::session_storage::MemorySessionStorage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Mutex;

    struct ScriptedLinks {
        replies: Mutex<VecDeque<PaymentClientResult<()>>>,
        calls: AtomicU32,
    }

    impl ScriptedLinks {
        fn new(replies: Vec<PaymentClientResult<()>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PaymentApi for ScriptedLinks {
        async fn initiate(
            &self,
            _request: &InitiatePaymentRequest,
        ) -> PaymentClientResult<InitiatePaymentResponse> {
            unreachable!("initiate is not used by the linker")
        }

        async fn retry(
            &self,
            _request: &RetryPaymentRequest,
        ) -> PaymentClientResult<InitiatePaymentResponse> {
            unreachable!("retry is not used by the linker")
        }

        async fn link(&self, _reference: &str, _order_id: &str) -> PaymentClientResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().await.pop_front().unwrap_or(Ok(()))
        }
    }

    fn rejected(status: u16) -> PaymentClientResult<()> {
        Err(PaymentClientError::Rejected {
            status,
            message: format!("status {}", status),
        })
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::payment_link().with_backoff(Backoff::Fixed(Duration::from_millis(1)))
    }

    async fn storage_with_reference() -> Arc<MemorySessionStorage> {
        let storage = Arc::new(MemorySessionStorage::new());
        storage.set(PAYMENT_REFERENCE_KEY, "PAY-1".to_string()).await;
        storage
    }

    #[tokio::test]
    async fn test_no_reference_skips_linking() {
        let api = ScriptedLinks::new(vec![]);
        let linker = PaymentLinker::new(api.clone(), Arc::new(MemorySessionStorage::new()));

        assert_eq!(linker.link("o1").await, LinkOutcome::NoReference);
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_conflict_counts_as_linked() {
        let api = ScriptedLinks::new(vec![rejected(409)]);
        let storage = storage_with_reference().await;
        let linker = PaymentLinker::new(api.clone(), storage.clone()).with_policy(quick_policy());

        assert_eq!(linker.link("o1").await, LinkOutcome::AlreadyLinked);
        assert!(storage.get(PAYMENT_REFERENCE_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let api = ScriptedLinks::new(vec![rejected(500), Ok(())]);
        let storage = storage_with_reference().await;
        let linker = PaymentLinker::new(api.clone(), storage.clone()).with_policy(quick_policy());

        assert_eq!(linker.link("o1").await, LinkOutcome::Linked);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_reference() {
        let api = ScriptedLinks::new(vec![rejected(500), rejected(404), rejected(502)]);
        let storage = storage_with_reference().await;
        let linker = PaymentLinker::new(api.clone(), storage.clone()).with_policy(quick_policy());

        let outcome = linker.link("o1").await;

        assert_eq!(
            outcome,
            LinkOutcome::Failed {
                attempts: 3,
                last_error: "status 502".to_string()
            }
        );
        assert!(!outcome.succeeded());
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            storage.get(PAYMENT_REFERENCE_KEY).await.as_deref(),
            Some("PAY-1")
        );
    }
}
