// Authentication error responses
// Every variant maps to a stable machine-readable code the client can
// branch on; the body shape is always {message, code}.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No authentication token provided")]
    NoToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Invalid CPF or password")]
    InvalidCredentials,

    #[error("Refresh token is no longer valid")]
    InvalidRefreshToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Role not held by this user")]
    RoleNotHeld,

    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error("Authentication error")]
    Internal,
}

#[derive(Debug, Serialize)]
pub struct AuthErrorBody {
    pub message: String,
    pub code: &'static str,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NoToken
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::UserNotFound => StatusCode::UNAUTHORIZED,
            AuthError::RoleNotHeld => StatusCode::FORBIDDEN,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::NoToken => "NO_TOKEN",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::RoleNotHeld => "ROLE_NOT_HELD",
            AuthError::RateLimited => "RATE_LIMITED",
            AuthError::Internal => "AUTH_ERROR",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let body = AuthErrorBody {
            message: self.to_string(),
            code: self.error_code(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        assert_eq!(AuthError::NoToken.error_code(), "NO_TOKEN");
        assert_eq!(AuthError::NoToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::TokenExpired.error_code(), "TOKEN_EXPIRED");
        assert_eq!(AuthError::RoleNotHeld.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AuthError::Internal.error_code(), "AUTH_ERROR");
    }
}
