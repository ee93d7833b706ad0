// Agenda engine
// Every mutating operation passes the scheduling-access gate first.
// Conflict checks and inserts share a transaction holding the
// professional's advisory lock, so two sessions cannot both claim a free
// slot. A recurring series is all-or-nothing: the first conflicting
// occurrence aborts the whole batch and names itself in the error.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use diesel_async::{AsyncConnection, AsyncPgConnection};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::appointment::{
    Appointment, AppointmentChanges, AppointmentError, AppointmentStatus, NewAppointment,
    PatientType,
};
use crate::models::scheduling_access::{SchedulingAccess, SchedulingAccessError};
use crate::models::service::{Service, ServiceModelError};
use crate::models::user::User;
use crate::services::settings::{SettingsError, SettingsService};

/// Hard ceiling on occurrences a recurring series may expand to
const MAX_OCCURRENCES: usize = 52;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl RecurrenceInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceInterval::Daily => "daily",
            RecurrenceInterval::Weekly => "weekly",
            RecurrenceInterval::Biweekly => "biweekly",
            RecurrenceInterval::Monthly => "monthly",
        }
    }
}

impl FromStr for RecurrenceInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(RecurrenceInterval::Daily),
            "weekly" => Ok(RecurrenceInterval::Weekly),
            "biweekly" => Ok(RecurrenceInterval::Biweekly),
            "monthly" => Ok(RecurrenceInterval::Monthly),
            _ => Err(format!("Invalid recurrence interval: {}", s)),
        }
    }
}

/// How a recurring series ends: after a fixed count or at a date
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceRule {
    pub interval: RecurrenceInterval,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(thiserror::Error, Debug)]
pub enum AgendaError {
    #[error("Scheduling access required")]
    AccessRequired,

    #[error("Appointment conflicts with an existing one at {at}")]
    Conflict {
        at: DateTime<Utc>,
        /// Set when the conflict arises inside a recurring series
        occurrence_index: Option<usize>,
    },

    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment belongs to another professional")]
    NotOwner,

    #[error("Service not found")]
    ServiceNotFound,

    #[error("Invalid appointment data: {0}")]
    InvalidInput(String),

    #[error("Completed appointments cannot be deleted")]
    CompletedImmutable,

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<AppointmentError> for AgendaError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AgendaError::NotFound,
            AppointmentError::Database(db) => AgendaError::Database(db),
        }
    }
}

impl From<SchedulingAccessError> for AgendaError {
    fn from(e: SchedulingAccessError) -> Self {
        match e {
            SchedulingAccessError::Database(db) => AgendaError::Database(db),
        }
    }
}

impl From<ServiceModelError> for AgendaError {
    fn from(e: ServiceModelError) -> Self {
        match e {
            ServiceModelError::NotFound => AgendaError::ServiceNotFound,
            ServiceModelError::Database(db) => AgendaError::Database(db),
        }
    }
}

impl From<SettingsError> for AgendaError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Database(db) => AgendaError::Database(db),
        }
    }
}

/// Input for creating one appointment (or the first of a series)
#[derive(Debug, Clone)]
pub struct CreateAppointmentInput {
    pub client_user_id: Option<Uuid>,
    pub dependent_id: Option<Uuid>,
    pub private_patient_name: Option<String>,
    pub service_id: Uuid,
    pub location_id: Option<Uuid>,
    pub appointment_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub patient_type: PatientType,
    /// Overrides the service price when set
    pub value_cents: Option<i64>,
}

/// Patch for update_appointment; None leaves the field unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateAppointmentInput {
    pub service_id: Option<Uuid>,
    pub location_id: Option<Option<Uuid>>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub notes: Option<Option<String>>,
    pub status: Option<AppointmentStatus>,
    pub value_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessStatus {
    pub has_access: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Professional revenue over a period. Convenio consultations owe the
/// platform share; private ones are reported gross but owe nothing.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueReport {
    pub total_consultations: usize,
    pub convenio_consultations: usize,
    pub convenio_gross_cents: i64,
    pub private_gross_cents: i64,
    pub share_percent: i64,
    pub amount_to_pay_cents: i64,
}

#[derive(Clone)]
pub struct AgendaService {
    settings: SettingsService,
}

impl AgendaService {
    pub fn new(settings: SettingsService) -> Self {
        Self { settings }
    }

    /// Gate consulted by every mutating operation
    pub async fn require_access(
        conn: &mut AsyncPgConnection,
        professional_id: Uuid,
    ) -> Result<(), AgendaError> {
        if SchedulingAccess::has_access(conn, professional_id).await? {
            Ok(())
        } else {
            Err(AgendaError::AccessRequired)
        }
    }

    pub async fn access_status(
        conn: &mut AsyncPgConnection,
        professional_id: Uuid,
    ) -> Result<AccessStatus, AgendaError> {
        let access = SchedulingAccess::find(conn, professional_id).await?;
        let now = Utc::now();

        Ok(AccessStatus {
            has_access: access.as_ref().map(|a| a.expires_at > now).unwrap_or(false),
            expires_at: access.map(|a| a.expires_at),
        })
    }

    fn validate_patient(input: &CreateAppointmentInput) -> Result<(), AgendaError> {
        match input.patient_type {
            PatientType::Convenio => {
                if input.client_user_id.is_none() {
                    return Err(AgendaError::InvalidInput(
                        "convenio appointments require a client".to_string(),
                    ));
                }
            },
            PatientType::Private => {
                if input.private_patient_name.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(AgendaError::InvalidInput(
                        "private appointments require a patient name".to_string(),
                    ));
                }
            },
        }
        Ok(())
    }

    fn slot_end(start: DateTime<Utc>, service: &Service) -> DateTime<Utc> {
        match service.duration_minutes {
            Some(minutes) if minutes > 0 => start + Duration::minutes(minutes as i64),
            _ => start,
        }
    }

    async fn ensure_free(
        conn: &mut AsyncPgConnection,
        professional_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        skip_id: Option<Uuid>,
        occurrence_index: Option<usize>,
    ) -> Result<(), AgendaError> {
        let taken = if end > start {
            Appointment::conflicting_exists(conn, professional_id, start, end, skip_id).await?
        } else {
            Appointment::exists_at(conn, professional_id, start, skip_id).await?
        };

        if taken {
            return Err(AgendaError::Conflict {
                at: start,
                occurrence_index,
            });
        }
        Ok(())
    }

    /// Expand the occurrence start times of a recurring series.
    /// Exactly one of count/until must be set; the result is capped at
    /// MAX_OCCURRENCES and always includes the first occurrence.
    pub fn expand_occurrences(
        start: DateTime<Utc>,
        rule: &RecurrenceRule,
    ) -> Result<Vec<DateTime<Utc>>, AgendaError> {
        if rule.count.is_none() == rule.until.is_none() {
            return Err(AgendaError::InvalidInput(
                "recurrence needs exactly one of count or until".to_string(),
            ));
        }
        if let Some(count) = rule.count {
            if count == 0 || count as usize > MAX_OCCURRENCES {
                return Err(AgendaError::InvalidInput(format!(
                    "recurrence count must be between 1 and {}",
                    MAX_OCCURRENCES
                )));
            }
        }
        if let Some(until) = rule.until {
            if until < start {
                return Err(AgendaError::InvalidInput(
                    "recurrence end date precedes the first occurrence".to_string(),
                ));
            }
        }

        let mut occurrences = Vec::new();
        let mut current = start;
        let mut step = 0u32;

        loop {
            if let Some(count) = rule.count {
                if occurrences.len() as u32 >= count {
                    break;
                }
            }
            if let Some(until) = rule.until {
                if current > until {
                    break;
                }
            }
            if occurrences.len() >= MAX_OCCURRENCES {
                break;
            }

            occurrences.push(current);
            step += 1;
            current = match rule.interval {
                RecurrenceInterval::Daily => start + Duration::days(step as i64),
                RecurrenceInterval::Weekly => start + Duration::weeks(step as i64),
                RecurrenceInterval::Biweekly => start + Duration::weeks(2 * step as i64),
                RecurrenceInterval::Monthly => start
                    .checked_add_months(Months::new(step))
                    .unwrap_or(current),
            };
        }

        Ok(occurrences)
    }

    /// Create one appointment. Conflict detection and insertion share a
    /// transaction; the window is locked before the insert.
    pub async fn create_appointment(
        &self,
        conn: &mut AsyncPgConnection,
        professional: &User,
        input: CreateAppointmentInput,
    ) -> Result<Appointment, AgendaError> {
        Self::require_access(conn, professional.id).await?;
        Self::validate_patient(&input)?;

        let service = Service::find_by_id(conn, input.service_id).await?;
        let professional_id = professional.id;

        let appointment = conn
            .transaction::<_, AgendaError, _>(|tx| {
                Box::pin(async move {
                    Appointment::lock_agenda(tx, professional_id).await?;

                    let start = input.appointment_at;
                    let end = Self::slot_end(start, &service);
                    Self::ensure_free(tx, professional_id, start, end, None, None).await?;

                    let appointment = Appointment::create(
                        tx,
                        NewAppointment {
                            professional_id,
                            client_user_id: input.client_user_id,
                            dependent_id: input.dependent_id,
                            private_patient_name: input.private_patient_name,
                            service_id: service.id,
                            location_id: input.location_id,
                            appointment_at: start,
                            ends_at: end,
                            status: AppointmentStatus::Scheduled.as_str().to_string(),
                            value_cents: input.value_cents.unwrap_or(service.price_cents),
                            notes: input.notes,
                            patient_type: input.patient_type.as_str().to_string(),
                            is_recurring: false,
                            recurring_group_id: None,
                        },
                    )
                    .await?;

                    Ok(appointment)
                })
            })
            .await?;

        Ok(appointment)
    }

    /// Create a recurring series, all-or-nothing. A conflict on any
    /// occurrence rolls everything back and reports which one failed.
    pub async fn create_recurring_series(
        &self,
        conn: &mut AsyncPgConnection,
        professional: &User,
        input: CreateAppointmentInput,
        rule: RecurrenceRule,
    ) -> Result<Vec<Appointment>, AgendaError> {
        Self::require_access(conn, professional.id).await?;
        Self::validate_patient(&input)?;

        let service = Service::find_by_id(conn, input.service_id).await?;
        let occurrences = Self::expand_occurrences(input.appointment_at, &rule)?;
        let professional_id = professional.id;

        let created = conn
            .transaction::<_, AgendaError, _>(|tx| {
                Box::pin(async move {
                    Appointment::lock_agenda(tx, professional_id).await?;

                    let group_id = Uuid::new_v4();
                    let mut created = Vec::with_capacity(occurrences.len());

                    for (index, start) in occurrences.iter().copied().enumerate() {
                        let end = Self::slot_end(start, &service);
                        Self::ensure_free(tx, professional_id, start, end, None, Some(index))
                            .await?;

                        let appointment = Appointment::create(
                            tx,
                            NewAppointment {
                                professional_id,
                                client_user_id: input.client_user_id,
                                dependent_id: input.dependent_id,
                                private_patient_name: input.private_patient_name.clone(),
                                service_id: service.id,
                                location_id: input.location_id,
                                appointment_at: start,
                                ends_at: end,
                                status: AppointmentStatus::Scheduled.as_str().to_string(),
                                value_cents: input.value_cents.unwrap_or(service.price_cents),
                                notes: input.notes.clone(),
                                patient_type: input.patient_type.as_str().to_string(),
                                is_recurring: true,
                                recurring_group_id: Some(group_id),
                            },
                        )
                        .await?;

                        created.push(appointment);
                    }

                    Ok(created)
                })
            })
            .await?;

        tracing::info!(
            "Created recurring series of {} appointments for professional {}",
            created.len(),
            professional.id
        );

        Ok(created)
    }

    async fn load_owned(
        conn: &mut AsyncPgConnection,
        professional_id: Uuid,
        appointment_id: Uuid,
    ) -> Result<Appointment, AgendaError> {
        let appointment = Appointment::find_by_id(conn, appointment_id).await?;
        if appointment.professional_id != professional_id {
            return Err(AgendaError::NotOwner);
        }
        Ok(appointment)
    }

    /// Patch an appointment. Cancellation goes through cancel_appointment,
    /// never through the status field here.
    pub async fn update_appointment(
        &self,
        conn: &mut AsyncPgConnection,
        professional: &User,
        appointment_id: Uuid,
        input: UpdateAppointmentInput,
    ) -> Result<Appointment, AgendaError> {
        Self::require_access(conn, professional.id).await?;

        if input.status == Some(AppointmentStatus::Cancelled) {
            return Err(AgendaError::InvalidInput(
                "use the cancellation endpoint to cancel".to_string(),
            ));
        }

        let existing = Self::load_owned(conn, professional.id, appointment_id).await?;
        let professional_id = professional.id;

        let service = match input.service_id {
            Some(service_id) => Service::find_by_id(conn, service_id).await?,
            None => Service::find_by_id(conn, existing.service_id).await?,
        };

        let updated = conn
            .transaction::<_, AgendaError, _>(|tx| {
                Box::pin(async move {
                    let mut changes = AppointmentChanges {
                        service_id: input.service_id,
                        location_id: input.location_id,
                        notes: input.notes,
                        status: input.status.map(|s| s.as_str().to_string()),
                        value_cents: input.value_cents,
                        ..Default::default()
                    };

                    if let Some(start) = input.appointment_at {
                        Appointment::lock_agenda(tx, professional_id).await?;

                        let end = Self::slot_end(start, &service);
                        Self::ensure_free(
                            tx,
                            professional_id,
                            start,
                            end,
                            Some(appointment_id),
                            None,
                        )
                        .await?;
                        changes.appointment_at = Some(start);
                        changes.ends_at = Some(end);
                    }

                    Ok(Appointment::apply_changes(tx, appointment_id, changes).await?)
                })
            })
            .await?;

        Ok(updated)
    }

    /// Cancel, keeping the row for the cancellations report
    pub async fn cancel_appointment(
        &self,
        conn: &mut AsyncPgConnection,
        professional: &User,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<(), AgendaError> {
        Self::require_access(conn, professional.id).await?;
        Self::load_owned(conn, professional.id, appointment_id).await?;

        Appointment::cancel(conn, appointment_id, reason, professional.id).await?;
        Ok(())
    }

    /// Hard delete; refused for completed consultations
    pub async fn delete_appointment(
        &self,
        conn: &mut AsyncPgConnection,
        professional: &User,
        appointment_id: Uuid,
    ) -> Result<(), AgendaError> {
        Self::require_access(conn, professional.id).await?;
        let appointment = Self::load_owned(conn, professional.id, appointment_id).await?;

        if appointment.status_enum() == AppointmentStatus::Completed {
            return Err(AgendaError::CompletedImmutable);
        }

        Appointment::delete(conn, appointment_id).await?;
        Ok(())
    }

    /// One day of a professional's agenda
    pub async fn appointments_for_day(
        &self,
        conn: &mut AsyncPgConnection,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AgendaError> {
        let from = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| AgendaError::InvalidInput("invalid date".to_string()))?;
        let to = from + Duration::days(1);

        Ok(Appointment::list_for_professional(conn, professional_id, from, to).await?)
    }

    /// Revenue owed to the platform over a period. Only completed convenio
    /// consultations enter amount_to_pay; the share is the professional's
    /// override when present, else the global setting.
    pub async fn professional_revenue(
        &self,
        conn: &mut AsyncPgConnection,
        professional: &User,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<RevenueReport, AgendaError> {
        let completed =
            Appointment::completed_in_period(conn, professional.id, from, to).await?;

        let share_percent = match professional.professional_share_percent {
            Some(share) => share as i64,
            None => self.settings.professional_share_percent(conn).await?,
        };

        let mut convenio_gross = 0i64;
        let mut private_gross = 0i64;
        let mut convenio_count = 0usize;

        for appointment in &completed {
            match appointment.patient_type_enum() {
                PatientType::Convenio => {
                    convenio_gross += appointment.value_cents;
                    convenio_count += 1;
                },
                PatientType::Private => private_gross += appointment.value_cents,
            }
        }

        Ok(RevenueReport {
            total_consultations: completed.len(),
            convenio_consultations: convenio_count,
            convenio_gross_cents: convenio_gross,
            private_gross_cents: private_gross,
            share_percent,
            amount_to_pay_cents: convenio_gross * share_percent / 100,
        })
    }

    /// Cancelled consultations over a period
    pub async fn cancelled_consultations(
        &self,
        conn: &mut AsyncPgConnection,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AgendaError> {
        Ok(Appointment::cancelled_in_period(conn, professional_id, from, to).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_expand_weekly_by_count() {
        let rule = RecurrenceRule {
            interval: RecurrenceInterval::Weekly,
            count: Some(5),
            until: None,
        };
        let occurrences =
            AgendaService::expand_occurrences(at(2026, 1, 5, 10), &rule).unwrap();

        assert_eq!(occurrences.len(), 5);
        assert_eq!(occurrences[0], at(2026, 1, 5, 10));
        assert_eq!(occurrences[1], at(2026, 1, 12, 10));
        assert_eq!(occurrences[4], at(2026, 2, 2, 10));
    }

    #[test]
    fn test_expand_biweekly_until() {
        let rule = RecurrenceRule {
            interval: RecurrenceInterval::Biweekly,
            count: None,
            until: Some(at(2026, 2, 2, 10)),
        };
        let occurrences =
            AgendaService::expand_occurrences(at(2026, 1, 5, 10), &rule).unwrap();

        // Jan 5, Jan 19, Feb 2
        assert_eq!(occurrences.len(), 3);
        assert_eq!(occurrences[2], at(2026, 2, 2, 10));
    }

    #[test]
    fn test_expand_monthly_keeps_day() {
        let rule = RecurrenceRule {
            interval: RecurrenceInterval::Monthly,
            count: Some(3),
            until: None,
        };
        let occurrences =
            AgendaService::expand_occurrences(at(2026, 1, 15, 9), &rule).unwrap();

        assert_eq!(occurrences[1], at(2026, 2, 15, 9));
        assert_eq!(occurrences[2], at(2026, 3, 15, 9));
    }

    #[test]
    fn test_expand_caps_occurrences() {
        let rule = RecurrenceRule {
            interval: RecurrenceInterval::Daily,
            count: None,
            until: Some(at(2027, 1, 1, 10)),
        };
        let occurrences =
            AgendaService::expand_occurrences(at(2026, 1, 1, 10), &rule).unwrap();

        assert_eq!(occurrences.len(), MAX_OCCURRENCES);
    }

    #[test]
    fn test_expand_rejects_bad_rules() {
        let both = RecurrenceRule {
            interval: RecurrenceInterval::Weekly,
            count: Some(3),
            until: Some(at(2026, 6, 1, 10)),
        };
        assert!(AgendaService::expand_occurrences(at(2026, 1, 1, 10), &both).is_err());

        let neither = RecurrenceRule {
            interval: RecurrenceInterval::Weekly,
            count: None,
            until: None,
        };
        assert!(AgendaService::expand_occurrences(at(2026, 1, 1, 10), &neither).is_err());

        let too_many = RecurrenceRule {
            interval: RecurrenceInterval::Weekly,
            count: Some(53),
            until: None,
        };
        assert!(AgendaService::expand_occurrences(at(2026, 1, 1, 10), &too_many).is_err());

        let backwards = RecurrenceRule {
            interval: RecurrenceInterval::Weekly,
            count: None,
            until: Some(at(2025, 1, 1, 10)),
        };
        assert!(AgendaService::expand_occurrences(at(2026, 1, 1, 10), &backwards).is_err());
    }

    #[test]
    fn test_interval_conversion() {
        for interval in [
            RecurrenceInterval::Daily,
            RecurrenceInterval::Weekly,
            RecurrenceInterval::Biweekly,
            RecurrenceInterval::Monthly,
        ] {
            assert_eq!(RecurrenceInterval::from_str(interval.as_str()), Ok(interval));
        }
        assert!(RecurrenceInterval::from_str("yearly").is_err());
    }
}
