// Redis connection pool built on deadpool-redis
// Used for the system-settings cache and fixed-window rate limiting

use deadpool_redis::{redis::AsyncCommands, Config, Connection, Pool, Runtime};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedisPoolError {
    #[error("Redis pool error: {0}")]
    Pool(String),

    #[error("Redis command error: {0}")]
    Command(#[from] deadpool_redis::redis::RedisError),
}

#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    pub fn new(url: &str, pool_size: usize) -> Result<Self, RedisPoolError> {
        let mut cfg = Config::from_url(url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| RedisPoolError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn get_connection(&self) -> Result<Connection, RedisPoolError> {
        self.pool
            .get()
            .await
            .map_err(|e| RedisPoolError::Pool(e.to_string()))
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, RedisPoolError> {
        let mut conn = self.get_connection().await?;
        Ok(conn.get(key).await?)
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), RedisPoolError> {
        let mut conn = self.get_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), RedisPoolError> {
        let mut conn = self.get_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    /// Increment a counter, setting the window TTL on first use.
    /// Returns the value after increment.
    pub async fn incr_with_window(&self, key: &str, window_seconds: u64) -> Result<u64, RedisPoolError> {
        let mut conn = self.get_connection().await?;
        let count: u64 = conn.incr(key, 1u64).await?;
        if count == 1 {
            conn.expire::<_, ()>(key, window_seconds as i64).await?;
        }
        Ok(count)
    }

    pub async fn health_check(&self) -> bool {
        match self.get_connection().await {
            Ok(mut conn) => {
                let pong: Result<String, _> =
                    deadpool_redis::redis::cmd("PING").query_async(&mut conn).await;
                matches!(pong.as_deref(), Ok("PONG"))
            },
            Err(_) => false,
        }
    }
}
