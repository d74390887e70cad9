//! Errors raised while talking to Redis

use bb8_redis::redis;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// No connection could be opened or checked out of the pool
    #[error("Redis unavailable: {0}")]
    Unavailable(String),

    /// A stored ledger entry could not be encoded or decoded
    #[error("Ledger entry encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Redis command failed: {0}")]
    Command(#[from] redis::RedisError),
}

impl From<bb8::RunError<redis::RedisError>> for CacheError {
    fn from(err: bb8::RunError<redis::RedisError>) -> Self {
        CacheError::Unavailable(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
