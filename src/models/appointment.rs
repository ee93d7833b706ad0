// Appointment database model
// Conflict detection runs inside the insert transaction under a
// per-professional advisory lock: FOR UPDATE only locks rows the overlap
// predicate already matches, so an empty slot locks nothing and two
// concurrent inserts into the same free window would both pass without it.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::appointments;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            _ => Err(format!("Invalid appointment status: {}", s)),
        }
    }
}

/// Whether the patient is covered by the plan or pays out of pocket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatientType {
    Convenio,
    Private,
}

impl PatientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientType::Convenio => "convenio",
            PatientType::Private => "private",
        }
    }
}

impl FromStr for PatientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "convenio" => Ok(PatientType::Convenio),
            "private" => Ok(PatientType::Private),
            _ => Err(format!("Invalid patient type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Appointment {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub client_user_id: Option<Uuid>,
    pub dependent_id: Option<Uuid>,
    pub private_patient_name: Option<String>,
    pub service_id: Uuid,
    pub location_id: Option<Uuid>,
    pub appointment_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: String,
    pub value_cents: i64,
    pub notes: Option<String>,
    pub patient_type: String,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub is_recurring: bool,
    pub recurring_group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = appointments)]
pub struct NewAppointment {
    pub professional_id: Uuid,
    pub client_user_id: Option<Uuid>,
    pub dependent_id: Option<Uuid>,
    pub private_patient_name: Option<String>,
    pub service_id: Uuid,
    pub location_id: Option<Uuid>,
    pub appointment_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: String,
    pub value_cents: i64,
    pub notes: Option<String>,
    pub patient_type: String,
    pub is_recurring: bool,
    pub recurring_group_id: Option<Uuid>,
}

/// Patch applied by update_appointment; None leaves the column untouched
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = appointments)]
pub struct AppointmentChanges {
    pub service_id: Option<Uuid>,
    pub location_id: Option<Option<Uuid>>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub value_cents: Option<i64>,
    pub notes: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(thiserror::Error, Debug)]
pub enum AppointmentError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Appointment not found")]
    NotFound,
}

/// Stable 64-bit advisory lock key for one professional's agenda
pub fn agenda_lock_key(professional: Uuid) -> i64 {
    let bytes = professional.as_bytes();
    let mut hi = [0u8; 8];
    let mut lo = [0u8; 8];
    hi.copy_from_slice(&bytes[..8]);
    lo.copy_from_slice(&bytes[8..]);
    i64::from_be_bytes(hi) ^ i64::from_be_bytes(lo)
}

impl Appointment {
    /// Take the transaction-scoped advisory lock serializing conflict
    /// checks and inserts for one professional. Must run inside the same
    /// transaction as the check it protects; released at commit/rollback.
    pub async fn lock_agenda(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
    ) -> Result<(), AppointmentError> {
        diesel::sql_query("SELECT pg_advisory_xact_lock($1)")
            .bind::<diesel::sql_types::BigInt, _>(agenda_lock_key(professional))
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        appointment_id: Uuid,
    ) -> Result<Self, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        appointments
            .filter(id.eq(appointment_id))
            .first::<Appointment>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => AppointmentError::NotFound,
                _ => AppointmentError::Database(e),
            })
    }

    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_appointment: NewAppointment,
    ) -> Result<Self, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        diesel::insert_into(appointments)
            .values(&new_appointment)
            .get_result::<Appointment>(conn)
            .await
            .map_err(AppointmentError::Database)
    }

    /// Lock and count non-cancelled rows of the professional overlapping the
    /// candidate window. Excludes `skip_id` so reschedules do not conflict
    /// with themselves.
    pub async fn conflicting_exists(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
        candidate_start: DateTime<Utc>,
        candidate_end: DateTime<Utc>,
        skip_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        let base = appointments
            .filter(professional_id.eq(professional))
            .filter(status.ne(AppointmentStatus::Cancelled.as_str()))
            .filter(appointment_at.lt(candidate_end))
            .filter(ends_at.gt(candidate_start));

        let rows = match skip_id {
            Some(skip) => {
                base.filter(id.ne(skip))
                    .for_update()
                    .load::<Appointment>(conn)
                    .await?
            },
            None => base.for_update().load::<Appointment>(conn).await?,
        };

        Ok(!rows.is_empty())
    }

    /// Lock and check for a non-cancelled row at exactly `at`; used for
    /// point-in-time services without a duration.
    pub async fn exists_at(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
        at: DateTime<Utc>,
        skip_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        let base = appointments
            .filter(professional_id.eq(professional))
            .filter(status.ne(AppointmentStatus::Cancelled.as_str()))
            .filter(appointment_at.eq(at));

        let rows = match skip_id {
            Some(skip) => {
                base.filter(id.ne(skip))
                    .for_update()
                    .load::<Appointment>(conn)
                    .await?
            },
            None => base.for_update().load::<Appointment>(conn).await?,
        };

        Ok(!rows.is_empty())
    }

    /// Appointments of a professional within a period, oldest first
    pub async fn list_for_professional(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        let rows = appointments
            .filter(professional_id.eq(professional))
            .filter(appointment_at.ge(from))
            .filter(appointment_at.lt(to))
            .order(appointment_at.asc())
            .load::<Appointment>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn apply_changes(
        conn: &mut AsyncPgConnection,
        appointment_id: Uuid,
        mut changes: AppointmentChanges,
    ) -> Result<Self, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        changes.updated_at = Some(Utc::now());

        diesel::update(appointments.filter(id.eq(appointment_id)))
            .set(&changes)
            .get_result::<Appointment>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => AppointmentError::NotFound,
                _ => AppointmentError::Database(e),
            })
    }

    /// Flip to cancelled, keeping the row for reporting. Conditional on the
    /// row not already being cancelled; returns false when it was.
    pub async fn cancel(
        conn: &mut AsyncPgConnection,
        appointment_id: Uuid,
        reason: Option<String>,
        cancelled_by_val: Uuid,
    ) -> Result<bool, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        let now = Utc::now();

        let updated = diesel::update(
            appointments
                .filter(id.eq(appointment_id))
                .filter(status.ne(AppointmentStatus::Cancelled.as_str())),
        )
        .set((
            status.eq(AppointmentStatus::Cancelled.as_str()),
            cancellation_reason.eq(reason),
            cancelled_at.eq(Some(now)),
            cancelled_by.eq(Some(cancelled_by_val)),
            updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    pub async fn delete(
        conn: &mut AsyncPgConnection,
        appointment_id: Uuid,
    ) -> Result<(), AppointmentError> {
        use crate::schema::appointments::dsl::*;

        let deleted = diesel::delete(appointments.filter(id.eq(appointment_id)))
            .execute(conn)
            .await?;

        if deleted == 0 {
            return Err(AppointmentError::NotFound);
        }

        Ok(())
    }

    /// Completed rows of a professional within a period, for revenue
    pub async fn completed_in_period(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        let rows = appointments
            .filter(professional_id.eq(professional))
            .filter(status.eq(AppointmentStatus::Completed.as_str()))
            .filter(appointment_at.ge(from))
            .filter(appointment_at.lt(to))
            .order(appointment_at.asc())
            .load::<Appointment>(conn)
            .await?;

        Ok(rows)
    }

    /// Cancelled rows of a professional within a period
    pub async fn cancelled_in_period(
        conn: &mut AsyncPgConnection,
        professional: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, AppointmentError> {
        use crate::schema::appointments::dsl::*;

        let rows = appointments
            .filter(professional_id.eq(professional))
            .filter(status.eq(AppointmentStatus::Cancelled.as_str()))
            .filter(appointment_at.ge(from))
            .filter(appointment_at.lt(to))
            .order(appointment_at.asc())
            .load::<Appointment>(conn)
            .await?;

        Ok(rows)
    }

    pub fn status_enum(&self) -> AppointmentStatus {
        AppointmentStatus::from_str(&self.status).unwrap_or(AppointmentStatus::Scheduled)
    }

    pub fn patient_type_enum(&self) -> PatientType {
        PatientType::from_str(&self.patient_type).unwrap_or(PatientType::Private)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversion() {
        for status in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert_eq!(AppointmentStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(AppointmentStatus::from_str("rescheduled").is_err());
    }

    #[test]
    fn test_patient_type_conversion() {
        assert_eq!(PatientType::from_str("convenio"), Ok(PatientType::Convenio));
        assert_eq!(PatientType::from_str("private"), Ok(PatientType::Private));
        assert!(PatientType::from_str("guest").is_err());
    }

    #[test]
    fn test_agenda_lock_key_is_stable_per_professional() {
        // Two sessions scheduling for the same professional must contend
        // on the same advisory lock; different professionals must not.
        let professional = Uuid::new_v4();
        assert_eq!(agenda_lock_key(professional), agenda_lock_key(professional));
        assert_ne!(agenda_lock_key(professional), agenda_lock_key(Uuid::new_v4()));
    }
}
