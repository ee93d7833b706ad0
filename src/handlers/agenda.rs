// Agenda and report handlers
// All endpoints require the professional role; mutating ones additionally
// pass the scheduling-access gate inside the service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::appointment::{Appointment, AppointmentStatus, PatientType};
use crate::models::user::{Role, User};
use crate::services::agenda::{
    CreateAppointmentInput, RecurrenceInterval, RecurrenceRule, RevenueReport,
    UpdateAppointmentInput,
};
use crate::utils::service_error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    /// YYYY-MM-DD
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RecurrencePayload {
    pub interval: String,
    pub count: Option<u32>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub client_user_id: Option<Uuid>,
    pub dependent_id: Option<Uuid>,
    pub private_patient_name: Option<String>,
    pub service_id: Uuid,
    pub location_id: Option<Uuid>,
    pub appointment_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub patient_type: String,
    pub value_cents: Option<i64>,
    pub recurrence: Option<RecurrencePayload>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub service_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub appointment_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub value_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn require_professional(auth: &AuthenticatedUser) -> Result<(), ServiceError> {
    if auth.has_role(Role::Professional.as_str()) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("professional_role_required"))
    }
}

fn period_bounds(query: &PeriodQuery) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let from = query
        .start_date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ServiceError::BadRequest("Invalid start date".to_string()))?;
    let to = query
        .end_date
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ServiceError::BadRequest("Invalid end date".to_string()))?;

    if to <= from {
        return Err(ServiceError::BadRequest(
            "End date precedes start date".to_string(),
        ));
    }
    Ok((from, to))
}

fn parse_create_input(
    payload: &CreateAppointmentRequest,
) -> Result<CreateAppointmentInput, ServiceError> {
    let patient_type = PatientType::from_str(&payload.patient_type)
        .map_err(ServiceError::BadRequest)?;

    Ok(CreateAppointmentInput {
        client_user_id: payload.client_user_id,
        dependent_id: payload.dependent_id,
        private_patient_name: payload.private_patient_name.clone(),
        service_id: payload.service_id,
        location_id: payload.location_id,
        appointment_at: payload.appointment_at,
        notes: payload.notes.clone(),
        patient_type,
        value_cents: payload.value_cents,
    })
}

/// GET /api/scheduling/appointments?date=YYYY-MM-DD
pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Appointment>>, ServiceError> {
    require_professional(&auth)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let appointments = state
        .agenda
        .appointments_for_day(&mut conn, auth.user_id, query.date)
        .await?;

    Ok(Json(appointments))
}

/// POST /api/scheduling/appointments
/// With a recurrence block the whole series is created atomically.
pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    require_professional(&auth)?;
    let input = parse_create_input(&payload)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    match payload.recurrence {
        Some(recurrence) => {
            let interval = RecurrenceInterval::from_str(&recurrence.interval)
                .map_err(ServiceError::BadRequest)?;
            let rule = RecurrenceRule {
                interval,
                count: recurrence.count,
                until: recurrence.until,
            };

            let created = state
                .agenda
                .create_recurring_series(&mut conn, &user, input, rule)
                .await?;

            Ok((
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "appointments": created,
                    "recurring_group_id": created.first().and_then(|a| a.recurring_group_id),
                })),
            ))
        },
        None => {
            let appointment = state
                .agenda
                .create_appointment(&mut conn, &user, input)
                .await?;

            Ok((
                StatusCode::CREATED,
                Json(serde_json::json!({ "appointment": appointment })),
            ))
        },
    }
}

/// PUT /api/scheduling/appointments/{id}
pub async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAppointmentRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    require_professional(&auth)?;

    let status = payload
        .status
        .as_deref()
        .map(AppointmentStatus::from_str)
        .transpose()
        .map_err(ServiceError::BadRequest)?;

    let input = UpdateAppointmentInput {
        service_id: payload.service_id,
        location_id: payload.location_id.map(Some),
        appointment_at: payload.appointment_at,
        notes: payload.notes.map(Some),
        status,
        value_cents: payload.value_cents,
    };

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    let updated = state
        .agenda
        .update_appointment(&mut conn, &user, id, input)
        .await?;

    Ok(Json(serde_json::json!({ "appointment": updated })))
}

/// POST /api/scheduling/appointments/{id}/cancel
pub async fn cancel_appointment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelAppointmentRequest>,
) -> Result<StatusCode, ServiceError> {
    require_professional(&auth)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    state
        .agenda
        .cancel_appointment(&mut conn, &user, id, payload.reason)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/scheduling/appointments/{id}
pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    require_professional(&auth)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    state
        .agenda
        .delete_appointment(&mut conn, &user, id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/reports/professional-revenue?start_date&end_date
pub async fn professional_revenue(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<RevenueReport>, ServiceError> {
    require_professional(&auth)?;
    let (from, to) = period_bounds(&query)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;
    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    let report = state
        .agenda
        .professional_revenue(&mut conn, &user, from, to)
        .await?;

    Ok(Json(report))
}

/// GET /api/reports/cancelled-consultations?start_date&end_date
pub async fn cancelled_consultations(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<Appointment>>, ServiceError> {
    require_professional(&auth)?;
    let (from, to) = period_bounds(&query)?;

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let cancelled = state
        .agenda
        .cancelled_consultations(&mut conn, auth.user_id, from, to)
        .await?;

    Ok(Json(cancelled))
}
