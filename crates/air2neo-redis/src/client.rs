//! Redis connection management.

use redis::aio::ConnectionManager;
use thiserror::Error;

/// Redis error types.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("Corrupt watermark entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Result type for Redis operations.
pub type RedisResult<T> = Result<T, RedisError>;

/// Multiplexed connection. Clone it to get a handle for each operation.
pub type RedisPool = ConnectionManager;

/// Connect to Redis, e.g. `redis://127.0.0.1:6379`.
pub async fn init_pool(redis_url: &str) -> RedisResult<RedisPool> {
    let client = redis::Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;
    Ok(manager)
}
