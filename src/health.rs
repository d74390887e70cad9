//! Health check module
//! Reports backend reachability and, when configured, Redis

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

use crate::backend::client::BackendClient;
#[cfg(feature = "cache")]
use crate::cache::RedisPool;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    backend: BackendClient,
    #[cfg(feature = "cache")]
    cache: Option<RedisPool>,
}

impl HealthChecker {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            #[cfg(feature = "cache")]
            cache: None,
        }
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, pool: Option<RedisPool>) -> Self {
        self.cache = pool;
        self
    }

    /// Backend down is unhealthy. Redis down only degrades the service,
    /// since the ledger falls back to memory.
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let backend = match timeout(Duration::from_secs(5), check_backend_health(&self.backend)).await {
            Ok(Ok((response_time, status))) if status < 500 => {
                info!("Backend health check: OK ({}ms)", response_time);
                ComponentHealth::up(Some(response_time))
            }
            Ok(Ok((response_time, status))) => {
                error!("Backend health check answered HTTP {}", status);
                ComponentHealth::warning(Some(response_time), Some(format!("HTTP {}", status)))
            }
            Ok(Err(e)) => {
                error!("Backend health check failed: {}", e);
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!("Backend health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };
        let backend_down = backend.status == ComponentState::Down;
        health_status.checks.insert("backend".to_string(), backend);

        let mut cache_down = false;
        if let Some(cache) = self.check_cache().await {
            cache_down = cache.status == ComponentState::Down;
            health_status.checks.insert("cache".to_string(), cache);
        }

        health_status.status = if backend_down {
            HealthState::Unhealthy
        } else if cache_down {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        health_status
    }

    #[cfg(feature = "cache")]
    async fn check_cache(&self) -> Option<ComponentHealth> {
        let pool = self.cache.as_ref()?;
        let health = match timeout(Duration::from_secs(5), check_cache_health(pool)).await {
            Ok(Ok(response_time)) => {
                info!("Cache health check: OK ({}ms)", response_time);
                ComponentHealth::up(Some(response_time))
            }
            Ok(Err(e)) => {
                error!("Cache health check failed: {}", e);
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!("Cache health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };
        Some(health)
    }

    #[cfg(not(feature = "cache"))]
    async fn check_cache(&self) -> Option<ComponentHealth> {
        None
    }
}

/// Any HTTP answer from the backend counts as reachable.
pub async fn check_backend_health(
    backend: &BackendClient,
) -> Result<(u128, u16), Box<dyn std::error::Error + Send + Sync>> {
    let start = Instant::now();

    match backend.get("/health").send_text().await {
        Ok((status, _)) => Ok((start.elapsed().as_millis(), status)),
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(feature = "cache")]
pub async fn check_cache_health(
    pool: &RedisPool,
) -> Result<u128, Box<dyn std::error::Error + Send + Sync>> {
    let start = Instant::now();

    match crate::cache::health_check(pool).await {
        Ok(()) => Ok(start.elapsed().as_millis()),
        Err(e) => Err(Box::new(e)),
    }
}
