//! Payment-reference keyed ledger of orders created from payment sessions.
//!
//! Finalize consults it so that a reference which already produced an order
//! never reports `canCreateOrder` again, whatever the backend flag says.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("ledger storage unavailable: {0}")]
    Storage(String),

    #[error("ledger entry unreadable: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(order_id: Option<String>, order_number: Option<String>) -> Self {
        Self {
            order_id,
            order_number,
            recorded_at: Utc::now(),
        }
    }
}

/// The reference itself, or `tid:<transactionId>` when only the gateway id is known.
pub fn ledger_key(reference: Option<&str>, transaction_id: Option<&str>) -> Option<String> {
    match (
        reference.filter(|r| !r.is_empty()),
        transaction_id.filter(|t| !t.is_empty()),
    ) {
        (Some(reference), _) => Some(reference.to_string()),
        (None, Some(tid)) => Some(format!("tid:{}", tid)),
        (None, None) => None,
    }
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn order_for(&self, key: &str) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Stores `entry` unless the key is already taken. Returns whether it was stored.
    async fn record(&self, key: &str, entry: LedgerEntry) -> Result<bool, LedgerError>;
}

#[derive(Debug, Default)]
pub struct MemoryOrderLedger {
    entries: RwLock<HashMap<String, LedgerEntry>>,
}

impl MemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderLedger for MemoryOrderLedger {
    async fn order_for(&self, key: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn record(&self, key: &str, entry: LedgerEntry) -> Result<bool, LedgerError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), entry);
        Ok(true)
    }
}

#[cfg(feature = "cache")]
pub use redis_ledger::RedisOrderLedger;

#[cfg(feature = "cache")]
mod redis_ledger {
    use super::*;
    use crate::cache::error::CacheError;
    use crate::cache::keys::payment::OrderLinkKey;
    use crate::cache::RedisPool;
    use bb8_redis::redis;
    use std::time::Duration;

    /// Ledger stored in Redis with `SET NX EX`, so concurrent finalize calls
    /// across instances agree on the first writer.
    #[derive(Clone)]
    pub struct RedisOrderLedger {
        pool: RedisPool,
        ttl: Duration,
    }

    impl RedisOrderLedger {
        pub fn new(pool: RedisPool, ttl: Duration) -> Self {
            Self { pool, ttl }
        }
    }

    impl From<CacheError> for LedgerError {
        fn from(err: CacheError) -> Self {
            match err {
                CacheError::Encoding(e) => LedgerError::Corrupt(e.to_string()),
                other => LedgerError::Storage(other.to_string()),
            }
        }
    }

    #[async_trait]
    impl OrderLedger for RedisOrderLedger {
        async fn order_for(&self, key: &str) -> Result<Option<LedgerEntry>, LedgerError> {
            let mut conn = self.pool.get().await.map_err(CacheError::from)?;
            let raw: Option<String> = redis::cmd("GET")
                .arg(OrderLinkKey::new(key).to_string())
                .query_async(&mut *conn)
                .await
                .map_err(CacheError::from)?;

            match raw {
                Some(raw) => Ok(Some(
                    serde_json::from_str(&raw).map_err(CacheError::from)?,
                )),
                None => Ok(None),
            }
        }

        async fn record(&self, key: &str, entry: LedgerEntry) -> Result<bool, LedgerError> {
            let payload = serde_json::to_string(&entry).map_err(CacheError::from)?;
            let mut conn = self.pool.get().await.map_err(CacheError::from)?;
            let stored: Option<String> = redis::cmd("SET")
                .arg(OrderLinkKey::new(key).to_string())
                .arg(payload)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl.as_secs().max(1))
                .query_async(&mut *conn)
                .await
                .map_err(CacheError::from)?;

            Ok(stored.is_some())
        }
    }
}
