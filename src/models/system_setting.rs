// System settings model
// Key/value store for admin-tunable pricing and revenue-share values.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::schema::system_settings;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = system_settings)]
#[diesel(primary_key(key))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SystemSetting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = system_settings)]
pub struct NewSystemSetting {
    pub key: String,
    pub value: String,
}

#[derive(thiserror::Error, Debug)]
pub enum SystemSettingError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl SystemSetting {
    pub async fn get(
        conn: &mut AsyncPgConnection,
        key_val: &str,
    ) -> Result<Option<String>, SystemSettingError> {
        use crate::schema::system_settings::dsl::*;

        let row = system_settings
            .filter(key.eq(key_val))
            .first::<SystemSetting>(conn)
            .await
            .optional()?;

        Ok(row.map(|s| s.value))
    }

    /// Upsert a setting value
    pub async fn set(
        conn: &mut AsyncPgConnection,
        key_val: &str,
        value_val: &str,
    ) -> Result<(), SystemSettingError> {
        use crate::schema::system_settings::dsl::*;

        diesel::insert_into(system_settings)
            .values(&NewSystemSetting {
                key: key_val.to_string(),
                value: value_val.to_string(),
            })
            .on_conflict(key)
            .do_update()
            .set((value.eq(value_val), updated_at.eq(Utc::now())))
            .execute(conn)
            .await?;

        Ok(())
    }
}
