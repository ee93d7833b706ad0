// Authentication middleware for protected routes
// Validates the bearer token, reloads the user row so deletions take
// effect immediately, and injects AuthenticatedUser into extensions.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::user::{User, UserError};
use crate::services::jwt::JwtError;
use crate::utils::auth_errors::AuthError;

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return AuthError::NoToken.into_response(),
    };

    let claims = match state.jwt.validate_access_token(token) {
        Ok(claims) => claims,
        Err(JwtError::Expired) => return AuthError::TokenExpired.into_response(),
        Err(_) => return AuthError::InvalidToken.into_response(),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return AuthError::InvalidToken.into_response(),
    };

    // the row must still exist; a deleted user's token is dead on arrival
    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Failed to get database connection in auth middleware: {}", e);
            return AuthError::Internal.into_response();
        },
    };

    match User::find_by_id(&mut conn, user_id).await {
        Ok(_) => {},
        Err(UserError::NotFound) => return AuthError::UserNotFound.into_response(),
        Err(e) => {
            tracing::error!("User lookup failed in auth middleware: {}", e);
            return AuthError::Internal.into_response();
        },
    }
    drop(conn);

    let auth_user = AuthenticatedUser {
        user_id,
        token_id: claims.jti,
        cpf: claims.cpf,
        name: claims.name,
        role: claims.role,
        roles: claims.roles,
    };

    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::NoToken)
    }
}
