// Subscription and payment handlers
// Prices always come from server-side settings; the client never sends an
// amount. Coupon type is re-derived from the action at payment creation.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::coupon::{Coupon, CouponType};
use crate::models::user::{Role, User};
use crate::services::agenda::AgendaService;
use crate::services::coupon::{CouponService, CouponServiceError};
use crate::services::subscription::{CheckoutOutcome, SubscriptionError};
use crate::utils::service_error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct ValidateCouponQuery {
    #[serde(rename = "type")]
    pub coupon_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<CouponSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CouponSummary {
    pub code: String,
    pub discount_type: String,
    pub discount_value_cents: i64,
    pub coupon_type: String,
}

impl From<Coupon> for CouponSummary {
    fn from(c: Coupon) -> Self {
        CouponSummary {
            code: c.code,
            discount_type: c.discount_type,
            discount_value_cents: c.discount_value_cents,
            coupon_type: c.coupon_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDependentPaymentRequest {
    pub dependent_id: Uuid,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAgendaPaymentRequest {
    pub duration_days: i64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CheckoutResponse {
    AlreadyActive {
        already_active: bool,
    },
    Activated {
        activated: bool,
        amount_cents: i64,
        discount_cents: i64,
    },
    Redirect {
        init_point: String,
        preference_id: String,
        amount_cents: i64,
        discount_cents: i64,
    },
}

fn checkout_response(outcome: CheckoutOutcome) -> CheckoutResponse {
    match outcome {
        CheckoutOutcome::Activated {
            amount_cents,
            discount_cents,
        } => CheckoutResponse::Activated {
            activated: true,
            amount_cents,
            discount_cents,
        },
        CheckoutOutcome::PaymentRequired {
            preference_id,
            init_point,
            amount_cents,
            discount_cents,
        } => CheckoutResponse::Redirect {
            init_point,
            preference_id,
            amount_cents,
            discount_cents,
        },
    }
}

/// GET /api/validate-coupon/{code}?type=titular|dependente
/// Advisory check for checkout UIs; the type is re-derived server-side when
/// the payment is actually created.
pub async fn validate_coupon(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(code): Path<String>,
    Query(query): Query<ValidateCouponQuery>,
) -> Result<Json<ValidateCouponResponse>, ServiceError> {
    let expected = match query.coupon_type.as_deref() {
        Some("dependente") => CouponType::Dependente,
        _ => CouponType::Titular,
    };

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    match CouponService::validate(&mut conn, &code, expected, auth.user_id).await {
        Ok(coupon) => Ok(Json(ValidateCouponResponse {
            valid: true,
            coupon: Some(coupon.into()),
            message: None,
        })),
        Err(
            e @ (CouponServiceError::NotFound
            | CouponServiceError::Inactive
            | CouponServiceError::WrongType
            | CouponServiceError::AlreadyUsed),
        ) => Ok(Json(ValidateCouponResponse {
            valid: false,
            coupon: None,
            message: Some(e.to_string()),
        })),
        Err(CouponServiceError::Database(db)) => Err(db.into()),
    }
}

/// POST /api/create-subscription
pub async fn create_subscription(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    match state
        .subscription
        .create_subscription_checkout(&mut conn, &user, payload.coupon_code.as_deref())
        .await
    {
        Ok(outcome) => Ok(Json(checkout_response(outcome))),
        Err(SubscriptionError::AlreadyActive) => Ok(Json(CheckoutResponse::AlreadyActive {
            already_active: true,
        })),
        Err(e) => Err(e.into()),
    }
}

/// POST /api/payment/create-dependent-payment
pub async fn create_dependent_payment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateDependentPaymentRequest>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    let outcome = state
        .subscription
        .create_dependent_checkout(
            &mut conn,
            &user,
            payload.dependent_id,
            payload.coupon_code.as_deref(),
        )
        .await?;

    Ok(Json(checkout_response(outcome)))
}

/// POST /api/professional/create-agenda-payment
pub async fn create_agenda_payment(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<CreateAgendaPaymentRequest>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    if !auth.has_role(Role::Professional.as_str()) {
        return Err(ServiceError::Forbidden("professional_role_required"));
    }

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let user = User::find_by_id(&mut conn, auth.user_id).await?;

    let outcome = state
        .subscription
        .create_agenda_checkout(&mut conn, &user, payload.duration_days)
        .await?;

    Ok(Json(checkout_response(outcome)))
}

/// POST /api/professional/scheduling-access-status
pub async fn scheduling_access_status(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<serde_json::Value>, ServiceError> {
    if !auth.has_role(Role::Professional.as_str()) {
        return Err(ServiceError::Forbidden("professional_role_required"));
    }

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let status = AgendaService::access_status(&mut conn, auth.user_id).await?;
    Ok(Json(serde_json::json!({
        "has_access": status.has_access,
        "expires_at": status.expires_at,
    })))
}
