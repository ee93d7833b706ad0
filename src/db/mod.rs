// Database layer - Diesel async pool + Redis pool

pub mod diesel_pool;
pub mod redis_pool;

pub use diesel_pool::{check_diesel_health, create_diesel_pool, mask_connection_string, DieselDatabaseConfig, DieselPool};
pub use redis_pool::{RedisPool, RedisPoolError};
