// Scheduling access model
// Time-bounded entitlement unlocking the professional agenda.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::scheduling_access;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable)]
#[diesel(table_name = scheduling_access)]
#[diesel(primary_key(professional_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SchedulingAccess {
    pub professional_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = scheduling_access)]
pub struct NewSchedulingAccess {
    pub professional_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum SchedulingAccessError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl SchedulingAccess {
    pub async fn find(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
    ) -> Result<Option<Self>, SchedulingAccessError> {
        use crate::schema::scheduling_access::dsl::*;

        let row = scheduling_access
            .filter(professional_id.eq(professional))
            .first::<SchedulingAccess>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Whether the professional currently holds access
    pub async fn has_access(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
    ) -> Result<bool, SchedulingAccessError> {
        Ok(Self::find(conn, professional)
            .await?
            .map(|a| a.expires_at > Utc::now())
            .unwrap_or(false))
    }

    /// Extend access by `duration_days`, counting from the current expiry
    /// when it is still in the future, else from now. Upserts the row;
    /// replaying the same payment never shortens the entitlement.
    pub async fn extend(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
        duration_days: i64,
    ) -> Result<DateTime<Utc>, SchedulingAccessError> {
        use crate::schema::scheduling_access::dsl::*;

        let now = Utc::now();
        let existing = scheduling_access
            .filter(professional_id.eq(professional))
            .for_update()
            .first::<SchedulingAccess>(conn)
            .await
            .optional()?;

        let base = existing
            .as_ref()
            .map(|a| a.expires_at.max(now))
            .unwrap_or(now);
        let new_expiry = base + Duration::days(duration_days);

        diesel::insert_into(scheduling_access)
            .values(&NewSchedulingAccess {
                professional_id: professional,
                expires_at: new_expiry,
            })
            .on_conflict(professional_id)
            .do_update()
            .set((expires_at.eq(new_expiry), updated_at.eq(now)))
            .execute(conn)
            .await?;

        Ok(new_expiry)
    }
}
