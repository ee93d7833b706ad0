// Dependent database model
// Covered under a titular's account but activated by its own payment.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::SubscriptionStatus;
use crate::schema::dependents;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = dependents)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Dependent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub cpf: String,
    pub birth_date: NaiveDate,
    pub subscription_status: String,
    pub subscription_expiry: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum DependentError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Dependent not found")]
    NotFound,
}

impl Dependent {
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        dependent_id: Uuid,
    ) -> Result<Self, DependentError> {
        use crate::schema::dependents::dsl::*;

        dependents
            .filter(id.eq(dependent_id))
            .first::<Dependent>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => DependentError::NotFound,
                _ => DependentError::Database(e),
            })
    }

    /// Activate unless already active and covering a future date; row is
    /// locked so webhook replays are no-ops. Returns false when already
    /// active.
    pub async fn activate_subscription(
        conn: &mut AsyncPgConnection,
        dependent_id: Uuid,
        today: NaiveDate,
        new_expiry: NaiveDate,
    ) -> Result<bool, DependentError> {
        use crate::schema::dependents::dsl::*;

        let dependent = dependents
            .filter(id.eq(dependent_id))
            .for_update()
            .first::<Dependent>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => DependentError::NotFound,
                _ => DependentError::Database(e),
            })?;

        let already_covered = dependent.subscription_status == SubscriptionStatus::Active.as_str()
            && dependent.subscription_expiry.map(|d| d >= today).unwrap_or(false);
        if already_covered {
            return Ok(false);
        }

        diesel::update(dependents.filter(id.eq(dependent_id)))
            .set((
                subscription_status.eq(SubscriptionStatus::Active.as_str()),
                subscription_expiry.eq(Some(new_expiry)),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(true)
    }

    /// Expire overdue active dependents; used by the daily sweep
    pub async fn expire_overdue(
        conn: &mut AsyncPgConnection,
        today: NaiveDate,
    ) -> Result<usize, DependentError> {
        use crate::schema::dependents::dsl::*;

        let updated = diesel::update(
            dependents
                .filter(subscription_status.eq(SubscriptionStatus::Active.as_str()))
                .filter(subscription_expiry.is_not_null())
                .filter(subscription_expiry.lt(today)),
        )
        .set((
            subscription_status.eq(SubscriptionStatus::Expired.as_str()),
            updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

        Ok(updated)
    }
}
