//! Periodically pushes the schedule's `orders_enabled` value to the backend.
//!
//! The backend owns the flag and only applies scheduler updates while no
//! admin override is in place.

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backend::client::{message_from, BackendClient, BackendError};
use crate::config::SchedulerConfig;

const KIGALI_OFFSET_SECS: i32 = 2 * 3600;
const OFF_HOURS_START: u32 = 21 * 60 + 30;
const OFF_HOURS_END: u32 = 9 * 60;
const SCHEDULER_PATH: &str = "/settings/orders-enabled/scheduler";
const SERVICE_KEY_HEADER: &str = "X-Service-Key";

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("no service key configured (SERVICE_API_KEY or ADMIN_API_KEY)")]
    MissingServiceKey,

    #[error("scheduler update rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Minute of the day in Kigali (UTC+2, no daylight saving).
pub fn kigali_minute_of_day(now: DateTime<Utc>) -> u32 {
    let local = match FixedOffset::east_opt(KIGALI_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).time(),
        None => now.time(),
    };
    local.hour() * 60 + local.minute()
}

/// Orders are closed from 21:30 until 09:00 Kigali time.
pub fn is_off_hours(now: DateTime<Utc>) -> bool {
    let minute = kigali_minute_of_day(now);
    minute >= OFF_HOURS_START || minute < OFF_HOURS_END
}

pub fn desired_enabled(now: DateTime<Utc>) -> bool {
    !is_off_hours(now)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleReply {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub source: Option<String>,
}

impl ScheduleReply {
    pub fn is_admin_override(&self) -> bool {
        self.source.as_deref() == Some("admin")
    }
}

pub struct OrderScheduleWorker {
    backend: BackendClient,
    service_key: Option<String>,
    interval: Duration,
}

impl OrderScheduleWorker {
    pub fn new(backend: BackendClient, config: &SchedulerConfig) -> Self {
        Self {
            backend,
            service_key: config.service_key.clone(),
            interval: Duration::from_secs(config.interval_secs.max(1)),
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "order schedule worker started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("order schedule worker stopping");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.apply(Utc::now()).await {
                        warn!(error = %e, "order schedule update failed");
                    }
                }
            }
        }

        info!("order schedule worker stopped");
    }

    /// Sends the desired value for `now` and reports what the backend kept.
    pub async fn apply(&self, now: DateTime<Utc>) -> Result<ScheduleReply, ScheduleError> {
        let key = self
            .service_key
            .as_deref()
            .ok_or(ScheduleError::MissingServiceKey)?;
        let enabled = desired_enabled(now);

        let reply = self
            .backend
            .post(SCHEDULER_PATH)
            .header(SERVICE_KEY_HEADER, key)
            .json(json!({ "enabled": enabled }))
            .send()
            .await?;

        if !reply.is_success() {
            return Err(ScheduleError::Rejected {
                status: reply.status,
                message: message_from(&reply.body).unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        let result: ScheduleReply =
            serde_json::from_value(reply.data().clone()).map_err(|e| BackendError::Decode {
                message: e.to_string(),
            })?;

        if result.is_admin_override() {
            info!(desired = enabled, "admin override present, schedule left orders_enabled unchanged");
        } else {
            info!(
                enabled = ?result.enabled,
                source = ?result.source,
                "orders_enabled updated by schedule"
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use chrono::TimeZone;
    use httpmock::prelude::*;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_off_hours_boundaries() {
        // 19:29 UTC is 21:29 in Kigali
        assert!(!is_off_hours(utc(19, 29)));
        assert!(is_off_hours(utc(19, 30)));
        assert!(is_off_hours(utc(23, 0)));
        // 06:59 UTC is 08:59 in Kigali
        assert!(is_off_hours(utc(6, 59)));
        assert!(!is_off_hours(utc(7, 0)));
        assert!(desired_enabled(utc(10, 0)));
    }

    #[test]
    fn test_minute_of_day_wraps_midnight() {
        assert_eq!(kigali_minute_of_day(utc(23, 15)), 75);
        assert_eq!(kigali_minute_of_day(utc(0, 0)), 120);
    }

    fn worker(server: &MockServer, key: Option<&str>) -> OrderScheduleWorker {
        let backend = BackendClient::new(&BackendConfig::new(server.base_url())).unwrap();
        OrderScheduleWorker::new(
            backend,
            &SchedulerConfig {
                enabled: true,
                interval_secs: 300,
                service_key: key.map(|k| k.to_string()),
            },
        )
    }

    #[tokio::test]
    async fn test_apply_posts_desired_value_with_service_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(SCHEDULER_PATH)
                    .header("x-service-key", "svc")
                    .json_body(json!({ "enabled": false }));
                then.status(200)
                    .json_body(json!({ "enabled": false, "source": "schedule" }));
            })
            .await;

        let reply = worker(&server, Some("svc")).apply(utc(20, 0)).await.unwrap();
        mock.assert_async().await;
        assert_eq!(reply.enabled, Some(false));
        assert!(!reply.is_admin_override());
    }

    #[tokio::test]
    async fn test_admin_override_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(SCHEDULER_PATH);
                then.status(200)
                    .json_body(json!({ "enabled": true, "source": "admin" }));
            })
            .await;

        let reply = worker(&server, Some("svc")).apply(utc(20, 0)).await.unwrap();
        assert!(reply.is_admin_override());
    }

    #[tokio::test]
    async fn test_missing_key_and_rejection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(SCHEDULER_PATH);
                then.status(403).json_body(json!({ "error": "Invalid service key" }));
            })
            .await;

        let err = worker(&server, None).apply(utc(12, 0)).await.unwrap_err();
        assert!(matches!(err, ScheduleError::MissingServiceKey));

        let err = worker(&server, Some("bad")).apply(utc(12, 0)).await.unwrap_err();
        match err {
            ScheduleError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Invalid service key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
