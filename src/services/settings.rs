// Typed access to system_settings with a short redis cache
// Reads go through redis with a 60 s TTL; writes update the row and delete
// the cache key so the next read sees the new value.

use diesel_async::AsyncPgConnection;

use crate::db::RedisPool;
use crate::models::system_setting::{SystemSetting, SystemSettingError};

pub const SUBSCRIPTION_PRICE_CENTS: &str = "subscription_price_cents";
pub const DEPENDENT_PRICE_CENTS: &str = "dependent_price_cents";
pub const AGENDA_ACCESS_PRICE_CENTS: &str = "agenda_access_price_cents";
pub const PROFESSIONAL_SHARE_PERCENT: &str = "professional_share_percent";

const CACHE_TTL_SECONDS: u64 = 60;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<SystemSettingError> for SettingsError {
    fn from(e: SystemSettingError) -> Self {
        match e {
            SystemSettingError::Database(db) => SettingsError::Database(db),
        }
    }
}

#[derive(Clone)]
pub struct SettingsService {
    redis: RedisPool,
}

impl SettingsService {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn cache_key(key: &str) -> String {
        format!("settings:{}", key)
    }

    /// Raw setting lookup: redis first, then the database. Cache failures
    /// fall through to the database.
    async fn get_raw(
        &self,
        conn: &mut AsyncPgConnection,
        key: &str,
    ) -> Result<Option<String>, SettingsError> {
        let cache_key = Self::cache_key(key);

        if let Ok(Some(cached)) = self.redis.get(&cache_key).await {
            return Ok(Some(cached));
        }

        let value = SystemSetting::get(conn, key).await?;
        if let Some(ref v) = value {
            if let Err(e) = self.redis.set_ex(&cache_key, v, CACHE_TTL_SECONDS).await {
                tracing::warn!("Failed to cache setting {}: {}", key, e);
            }
        }

        Ok(value)
    }

    async fn get_i64(
        &self,
        conn: &mut AsyncPgConnection,
        key: &str,
        default: i64,
    ) -> Result<i64, SettingsError> {
        let value = self
            .get_raw(conn, key)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default);

        Ok(value)
    }

    /// Update a setting and invalidate its cache entry
    pub async fn set(
        &self,
        conn: &mut AsyncPgConnection,
        key: &str,
        value: &str,
    ) -> Result<(), SettingsError> {
        SystemSetting::set(conn, key, value).await?;
        if let Err(e) = self.redis.delete(&Self::cache_key(key)).await {
            tracing::warn!("Failed to invalidate setting cache for {}: {}", key, e);
        }
        Ok(())
    }

    /// Annual titular subscription price (default R$600,00)
    pub async fn subscription_price_cents(
        &self,
        conn: &mut AsyncPgConnection,
    ) -> Result<i64, SettingsError> {
        self.get_i64(conn, SUBSCRIPTION_PRICE_CENTS, 60_000).await
    }

    /// Annual dependent activation price (default R$250,00)
    pub async fn dependent_price_cents(
        &self,
        conn: &mut AsyncPgConnection,
    ) -> Result<i64, SettingsError> {
        self.get_i64(conn, DEPENDENT_PRICE_CENTS, 25_000).await
    }

    /// Agenda access price per 30 days (default R$24,99)
    pub async fn agenda_access_price_cents(
        &self,
        conn: &mut AsyncPgConnection,
    ) -> Result<i64, SettingsError> {
        self.get_i64(conn, AGENDA_ACCESS_PRICE_CENTS, 2_499).await
    }

    /// Platform-wide professional revenue share, percent (default 50)
    pub async fn professional_share_percent(
        &self,
        conn: &mut AsyncPgConnection,
    ) -> Result<i64, SettingsError> {
        self.get_i64(conn, PROFESSIONAL_SHARE_PERCENT, 50).await
    }
}
