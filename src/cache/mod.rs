//! Redis pool behind the payment ledger
//!
//! Optional at runtime: when Redis cannot be reached at startup the service
//! keeps running on the in-memory ledger.

pub mod error;
pub mod keys;

use bb8::Pool;
use bb8_redis::redis;
use bb8_redis::RedisConnectionManager;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::CacheConfig;
use error::{CacheError, CacheResult};

pub type RedisPool = Pool<RedisConnectionManager>;

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the pool and refuses it unless Redis answers a PING.
pub async fn init_cache_pool(config: &CacheConfig) -> CacheResult<RedisPool> {
    info!(
        max_connections = config.max_connections,
        redis_url = %config.redis_url,
        "Connecting payment ledger to Redis"
    );

    let manager = RedisConnectionManager::new(config.redis_url.clone())
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .connection_timeout(CHECKOUT_TIMEOUT)
        .build(manager)
        .await
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;

    if let Err(e) = health_check(&pool).await {
        warn!(error = %e, "Redis did not answer PING");
        return Err(e);
    }

    Ok(pool)
}

/// PING over a pooled connection.
pub async fn health_check(pool: &RedisPool) -> CacheResult<()> {
    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
    Ok(())
}
