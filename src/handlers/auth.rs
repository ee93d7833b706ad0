// Authentication handlers
// Login never issues tokens to a multi-role user; the client must pick a
// role first. Auth endpoints use camelCase bodies.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::refresh_token::{RefreshToken, SessionInfo};
use crate::models::user::{NewUser, Role, SubscriptionStatus, User, UserError};
use crate::services::jwt::JwtError;
use crate::utils::auth_errors::AuthError;
use crate::utils::password::{hash_password, verify_password};
use crate::utils::service_error::ServiceError;
use crate::utils::validation::{is_valid_cpf, normalize_cpf, non_empty_trimmed};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,

    pub cpf: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub cpf: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRoleRequest {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct SwitchRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub needs_role_selection: bool,
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

fn session_info(addr: &SocketAddr, headers: &HeaderMap) -> SessionInfo {
    SessionInfo {
        ip_address: Some(addr.ip().to_string()),
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::BadRequest(e.to_string()))?;

    let cpf = normalize_cpf(&payload.cpf);
    if !is_valid_cpf(&cpf) {
        return Err(ServiceError::BadRequest("Invalid CPF".to_string()));
    }
    let name = non_empty_trimmed(&payload.name)
        .ok_or_else(|| ServiceError::BadRequest("Name is required".to_string()))?;

    let password_hash = hash_password(&payload.password)?;
    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let user = User::create(
        &mut conn,
        NewUser {
            cpf,
            password_hash,
            name: name.to_string(),
            email: payload.email.as_deref().and_then(non_empty_trimmed).map(String::from),
            phone: payload.phone.as_deref().and_then(non_empty_trimmed).map(String::from),
            roles: vec![Role::Client.as_str().to_string()],
            subscription_status: SubscriptionStatus::Pending.as_str().to_string(),
        },
    )
    .await?;

    tracing::info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "user": user }))).into_response())
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    if !state.rate_limit.check_login(&addr.ip().to_string()).await {
        return Err(AuthError::RateLimited);
    }

    let cpf = normalize_cpf(&payload.cpf);
    let mut conn = state.diesel_pool.get().await.map_err(|e| {
        tracing::error!("Connection pool error during login: {}", e);
        AuthError::Internal
    })?;

    let user = match User::find_by_cpf(&mut conn, &cpf).await {
        Ok(user) => user,
        Err(UserError::NotFound) => return Err(AuthError::InvalidCredentials),
        Err(e) => {
            tracing::error!("User lookup failed during login: {}", e);
            return Err(AuthError::Internal);
        },
    };

    let valid = verify_password(&payload.password, &user.password_hash).map_err(|e| {
        tracing::error!("Password verification failed: {}", e);
        AuthError::Internal
    })?;
    if !valid {
        tracing::warn!("Failed login attempt for user {} from {}", user.id, addr.ip());
        return Err(AuthError::InvalidCredentials);
    }

    if user.roles.len() > 1 {
        return Ok(Json(LoginResponse {
            needs_role_selection: true,
            user,
            access_token: None,
            refresh_token: None,
        }));
    }

    let role = user
        .roles
        .first()
        .cloned()
        .unwrap_or_else(|| Role::Client.as_str().to_string());
    let pair = state
        .jwt
        .generate_token_pair(&mut conn, &user, &role, session_info(&addr, &headers))
        .await
        .map_err(|e| {
            tracing::error!("Token generation failed during login: {}", e);
            AuthError::Internal
        })?;

    Ok(Json(LoginResponse {
        needs_role_selection: false,
        user,
        access_token: Some(pair.access_token),
        refresh_token: Some(pair.refresh_token),
    }))
}

/// POST /api/auth/select-role
pub async fn select_role(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<SelectRoleRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    if Role::from_str(&payload.role).is_err() {
        return Err(AuthError::RoleNotHeld);
    }

    let mut conn = state.diesel_pool.get().await.map_err(|e| {
        tracing::error!("Connection pool error during role selection: {}", e);
        AuthError::Internal
    })?;

    let user = match User::find_by_id(&mut conn, payload.user_id).await {
        Ok(user) => user,
        Err(UserError::NotFound) => return Err(AuthError::UserNotFound),
        Err(e) => {
            tracing::error!("User lookup failed during role selection: {}", e);
            return Err(AuthError::Internal);
        },
    };

    if !user.roles.iter().any(|r| r == &payload.role) {
        return Err(AuthError::RoleNotHeld);
    }

    let pair = state
        .jwt
        .generate_token_pair(&mut conn, &user, &payload.role, session_info(&addr, &headers))
        .await
        .map_err(|e| {
            tracing::error!("Token generation failed during role selection: {}", e);
            AuthError::Internal
        })?;

    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        user,
    }))
}

/// POST /api/auth/switch-role (authenticated)
/// Revokes every outstanding refresh token before minting the new pair.
pub async fn switch_role(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<SwitchRoleRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let mut conn = state.diesel_pool.get().await.map_err(|e| {
        tracing::error!("Connection pool error during role switch: {}", e);
        AuthError::Internal
    })?;

    let user = match User::find_by_id(&mut conn, auth.user_id).await {
        Ok(user) => user,
        Err(UserError::NotFound) => return Err(AuthError::UserNotFound),
        Err(e) => {
            tracing::error!("User lookup failed during role switch: {}", e);
            return Err(AuthError::Internal);
        },
    };

    if !user.roles.iter().any(|r| r == &payload.role) {
        return Err(AuthError::RoleNotHeld);
    }

    RefreshToken::revoke_all_for_user(&mut conn, user.id, "role_switch")
        .await
        .map_err(|e| {
            tracing::error!("Token revocation failed during role switch: {}", e);
            AuthError::Internal
        })?;

    let pair = state
        .jwt
        .generate_token_pair(&mut conn, &user, &payload.role, session_info(&addr, &headers))
        .await
        .map_err(|e| {
            tracing::error!("Token generation failed during role switch: {}", e);
            AuthError::Internal
        })?;

    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        user,
    }))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let mut conn = state.diesel_pool.get().await.map_err(|e| {
        tracing::error!("Connection pool error during refresh: {}", e);
        AuthError::Internal
    })?;

    let (pair, user) = state
        .jwt
        .rotate_refresh_token(&mut conn, &payload.refresh_token, session_info(&addr, &headers))
        .await
        .map_err(|e| match e {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidToken => AuthError::InvalidToken,
            JwtError::InvalidRefreshToken => AuthError::InvalidRefreshToken,
            JwtError::UserNotFound => AuthError::UserNotFound,
            other => {
                tracing::error!("Refresh rotation failed: {}", other);
                AuthError::Internal
            },
        })?;

    Ok(Json(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: pair.expires_in,
        user,
    }))
}

/// GET /api/auth/me (authenticated)
/// Reloads the user row so role and subscription changes are observed.
pub async fn me(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<serde_json::Value>, AuthError> {
    let mut conn = state.diesel_pool.get().await.map_err(|e| {
        tracing::error!("Connection pool error in me: {}", e);
        AuthError::Internal
    })?;

    let user = match User::find_by_id(&mut conn, auth.user_id).await {
        Ok(user) => user,
        Err(UserError::NotFound) => return Err(AuthError::UserNotFound),
        Err(e) => {
            tracing::error!("User lookup failed in me: {}", e);
            return Err(AuthError::Internal);
        },
    };

    Ok(Json(serde_json::json!({ "user": user })))
}

/// POST /api/auth/logout (authenticated); revokes all refresh rows
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<StatusCode, AuthError> {
    let mut conn = state.diesel_pool.get().await.map_err(|e| {
        tracing::error!("Connection pool error during logout: {}", e);
        AuthError::Internal
    })?;

    let revoked = RefreshToken::revoke_all_for_user(&mut conn, auth.user_id, "logout")
        .await
        .map_err(|e| {
            tracing::error!("Token revocation failed during logout: {}", e);
            AuthError::Internal
        })?;

    tracing::info!("User {} logged out, {} tokens revoked", auth.user_id, revoked);
    Ok(StatusCode::NO_CONTENT)
}
