//! Named retry policies shared by payment linking, token refresh and the
//! payment-status proxy.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that a [`RetryPolicy`] can classify.
pub trait Retryable {
    /// HTTP status of the failed call, when one was received
    fn status_code(&self) -> Option<u16>;

    /// Connection resets, timeouts and other failures without a status
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `step * attempt`
    Linear(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear(step) => step.saturating_mul(attempt),
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub name: &'static str,
    pub max_attempts: u32,
    pub backoff: Backoff,
    retryable_status: fn(u16) -> bool,
}

fn gateway_or_throttled(status: u16) -> bool {
    status == 429 || matches!(status, 502..=504)
}

fn server_error(status: u16) -> bool {
    status == 429 || status >= 500
}

fn never(_: u16) -> bool {
    false
}

fn always(_: u16) -> bool {
    true
}

impl RetryPolicy {
    pub fn new(name: &'static str, max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            name,
            max_attempts: max_attempts.max(1),
            backoff,
            retryable_status: server_error,
        }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::new("none", 1, Backoff::Fixed(Duration::ZERO)).with_retryable_status(never)
    }

    /// Linking a payment session to a freshly created order. Every failure
    /// is retried until the budget runs out.
    pub fn payment_link() -> Self {
        Self::new("payment_link", 3, Backoff::Linear(Duration::from_millis(500)))
            .with_retryable_status(always)
    }

    /// Polling the gateway status through the backend.
    pub fn gateway_status(max_attempts: u32) -> Self {
        Self::new(
            "gateway_status",
            max_attempts,
            Backoff::Exponential {
                base: Duration::from_millis(250),
                max: Duration::from_secs(4),
            },
        )
        .with_retryable_status(gateway_or_throttled)
    }

    /// Refreshing an access token; transport failures only.
    pub fn token_refresh() -> Self {
        Self::new("token_refresh", 2, Backoff::Fixed(Duration::from_millis(300)))
            .with_retryable_status(never)
    }

    pub fn with_retryable_status(mut self, predicate: fn(u16) -> bool) -> Self {
        self.retryable_status = predicate;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn should_retry<E: Retryable>(&self, error: &E, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match error.status_code() {
            Some(status) => (self.retryable_status)(status),
            None => error.is_transient(),
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// the attempt budget is spent. The closure receives the 1-based attempt.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        policy = self.name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct FakeError(Option<u16>);

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake error {:?}", self.0)
        }
    }

    impl Retryable for FakeError {
        fn status_code(&self) -> Option<u16> {
            self.0
        }

        fn is_transient(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_backoff_delays() {
        let linear = Backoff::Linear(Duration::from_millis(500));
        assert_eq!(linear.delay(1), Duration::from_millis(500));
        assert_eq!(linear.delay(2), Duration::from_millis(1000));

        let exp = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(exp.delay(1), Duration::from_millis(100));
        assert_eq!(exp.delay(2), Duration::from_millis(200));
        assert_eq!(exp.delay(3), Duration::from_millis(350));
    }

    #[test]
    fn test_gateway_status_predicate() {
        let policy = RetryPolicy::gateway_status(3);
        assert!(policy.should_retry(&FakeError(Some(503)), 1));
        assert!(policy.should_retry(&FakeError(Some(429)), 1));
        assert!(!policy.should_retry(&FakeError(Some(500)), 1));
        assert!(!policy.should_retry(&FakeError(Some(400)), 1));
        assert!(policy.should_retry(&FakeError(None), 2));
        assert!(!policy.should_retry(&FakeError(None), 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::payment_link();

        let result: Result<(), FakeError> = policy
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError(Some(500))) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_returns_first_success() {
        let policy = RetryPolicy::payment_link();

        let result: Result<u32, FakeError> = policy
            .execute(|attempt| async move {
                if attempt < 2 {
                    Err(FakeError(None))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_none_policy_never_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), FakeError> = RetryPolicy::none()
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError(None)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
