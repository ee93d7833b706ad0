// HTTP error envelope for the service layer
// Handlers return ServiceError and get a consistent {message, code} body.
// Database details are logged, never leaked to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::appointment::AppointmentError;
use crate::models::coupon::CouponError;
use crate::models::dependent::DependentError;
use crate::models::user::UserError;
use crate::services::affiliate::AffiliateError;
use crate::services::agenda::AgendaError;
use crate::services::coupon::CouponServiceError;
use crate::services::jwt::JwtError;
use crate::services::payment_gateway::PaymentGatewayError;
use crate::services::settings::SettingsError;
use crate::services::subscription::SubscriptionError;
use crate::utils::password::PasswordError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, try again later")]
    RateLimited,

    #[error("Payment gateway unavailable")]
    PaymentGateway,

    #[error("Internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    code: String,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::PaymentGateway => StatusCode::BAD_GATEWAY,
            ServiceError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Forbidden(code) => code,
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::RateLimited => "rate_limited",
            ServiceError::PaymentGateway => "payment_gateway",
            ServiceError::Internal => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            message: self.to_string(),
            code: self.code().to_string(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<diesel::result::Error> for ServiceError {
    fn from(e: diesel::result::Error) -> Self {
        tracing::error!("Database error: {}", e);
        ServiceError::Internal
    }
}

impl From<UserError> for ServiceError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::NotFound => ServiceError::NotFound("User not found".to_string()),
            UserError::CpfTaken => ServiceError::Conflict("CPF already registered".to_string()),
            UserError::InvalidId => ServiceError::BadRequest("Invalid user id".to_string()),
            UserError::Database(db) => db.into(),
        }
    }
}

impl From<DependentError> for ServiceError {
    fn from(e: DependentError) -> Self {
        match e {
            DependentError::NotFound => {
                ServiceError::NotFound("Dependent not found".to_string())
            },
            DependentError::Database(db) => db.into(),
        }
    }
}

impl From<CouponError> for ServiceError {
    fn from(e: CouponError) -> Self {
        match e {
            CouponError::NotFound => ServiceError::NotFound("Coupon not found".to_string()),
            CouponError::Database(db) => db.into(),
        }
    }
}

impl From<CouponServiceError> for ServiceError {
    fn from(e: CouponServiceError) -> Self {
        match e {
            CouponServiceError::NotFound => {
                ServiceError::NotFound("Coupon not found".to_string())
            },
            CouponServiceError::Inactive
            | CouponServiceError::WrongType
            | CouponServiceError::AlreadyUsed => ServiceError::BadRequest(e.to_string()),
            CouponServiceError::Database(db) => db.into(),
        }
    }
}

impl From<SubscriptionError> for ServiceError {
    fn from(e: SubscriptionError) -> Self {
        match e {
            SubscriptionError::AlreadyActive => ServiceError::Conflict(e.to_string()),
            SubscriptionError::DependentNotFound | SubscriptionError::UserNotFound => {
                ServiceError::NotFound(e.to_string())
            },
            SubscriptionError::NotOwner => ServiceError::Forbidden("not_owner"),
            SubscriptionError::InvalidDuration => ServiceError::BadRequest(e.to_string()),
            SubscriptionError::Coupon(inner) => inner.into(),
            SubscriptionError::Gateway(inner) => inner.into(),
            SubscriptionError::Database(db) => db.into(),
        }
    }
}

impl From<PaymentGatewayError> for ServiceError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::PaymentNotFound => {
                ServiceError::NotFound("Payment not found".to_string())
            },
            PaymentGatewayError::Request(req) => {
                tracing::error!("Payment gateway request failed: {}", req);
                ServiceError::PaymentGateway
            },
            PaymentGatewayError::GatewayUnavailable(status) => {
                tracing::error!("Payment gateway returned status {}", status);
                ServiceError::PaymentGateway
            },
        }
    }
}

impl From<AffiliateError> for ServiceError {
    fn from(e: AffiliateError) -> Self {
        match e {
            AffiliateError::InvalidReferralCode => ServiceError::BadRequest(e.to_string()),
            AffiliateError::Database(db) => db.into(),
        }
    }
}

impl From<AgendaError> for ServiceError {
    fn from(e: AgendaError) -> Self {
        match e {
            AgendaError::AccessRequired => ServiceError::Forbidden("scheduling_access_required"),
            AgendaError::Conflict { .. } => ServiceError::Conflict(e.to_string()),
            AgendaError::NotFound => ServiceError::NotFound(e.to_string()),
            AgendaError::NotOwner => ServiceError::Forbidden("not_owner"),
            AgendaError::ServiceNotFound => ServiceError::NotFound(e.to_string()),
            AgendaError::InvalidInput(msg) => ServiceError::BadRequest(msg),
            AgendaError::CompletedImmutable => ServiceError::Conflict(e.to_string()),
            AgendaError::Database(db) => db.into(),
        }
    }
}

impl From<AppointmentError> for ServiceError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => {
                ServiceError::NotFound("Appointment not found".to_string())
            },
            AppointmentError::Database(db) => db.into(),
        }
    }
}

impl From<SettingsError> for ServiceError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Database(db) => db.into(),
        }
    }
}

impl From<JwtError> for ServiceError {
    fn from(e: JwtError) -> Self {
        tracing::error!("JWT error in service context: {}", e);
        ServiceError::Internal
    }
}

impl From<PasswordError> for ServiceError {
    fn from(e: PasswordError) -> Self {
        tracing::error!("Password hashing error: {}", e);
        ServiceError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::PaymentGateway.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::Forbidden("scheduling_access_required").code(),
            "scheduling_access_required"
        );
    }

    #[test]
    fn test_agenda_error_mapping() {
        let err: ServiceError = AgendaError::AccessRequired.into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "scheduling_access_required");

        let err: ServiceError = AgendaError::Conflict {
            at: chrono::Utc::now(),
            occurrence_index: Some(2),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
