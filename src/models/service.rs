// Service catalog model (read-only collaborator of the agenda engine)

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::services;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = services)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Service {
    pub id: Uuid,
    pub professional_id: Option<Uuid>,
    pub name: String,
    pub price_cents: i64,
    pub duration_minutes: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceModelError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Service not found")]
    NotFound,
}

impl Service {
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        service_id: Uuid,
    ) -> Result<Self, ServiceModelError> {
        use crate::schema::services::dsl::*;

        services
            .filter(id.eq(service_id))
            .filter(is_active.eq(true))
            .first::<Service>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => ServiceModelError::NotFound,
                _ => ServiceModelError::Database(e),
            })
    }
}
