// Affiliate tracking handlers
// track, link-user and the visitor check are public (they run before any
// account exists); reporting requires a vendedor or admin session.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::user::Role;
use crate::services::affiliate::{AffiliateService, ClickMetadata, ReferralReport};
use crate::utils::service_error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct TrackClickRequest {
    pub referral_code: String,
    pub visitor_identifier: String,
    pub referrer_url: Option<String>,
    pub landing_page: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkUserRequest {
    pub user_id: Uuid,
    pub visitor_identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MyReferralsQuery {
    /// Admins may inspect another affiliate's report
    pub affiliate_id: Option<Uuid>,
}

/// POST /api/affiliate-tracking/track (public, rate limited)
pub async fn track(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<TrackClickRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let ip = addr.ip().to_string();
    if !state
        .rate_limit
        .check_track_click(&ip, &payload.visitor_identifier)
        .await
    {
        return Err(ServiceError::RateLimited);
    }

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let metadata = ClickMetadata {
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        referrer_url: payload.referrer_url,
        landing_page: payload.landing_page,
    };

    let tracked = AffiliateService::track_click(
        &mut conn,
        &payload.referral_code,
        &payload.visitor_identifier,
        metadata,
    )
    .await?;

    Ok(Json(serde_json::json!({ "tracked": tracked })))
}

/// POST /api/affiliate-tracking/link-user (public, called after registration)
pub async fn link_user(
    State(state): State<AppState>,
    Json(payload): Json<LinkUserRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let linked =
        AffiliateService::link_user(&mut conn, payload.user_id, &payload.visitor_identifier)
            .await?;

    Ok(Json(serde_json::json!({ "linked": linked })))
}

/// POST /api/affiliate-tracking/convert (authenticated)
/// Conversions normally arrive via the payment webhook; this endpoint
/// exists for admin-driven corrections.
pub async fn convert(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(payload): Json<ConvertRequest>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    if !auth.is_admin() && auth.user_id != payload.user_id {
        return Err(ServiceError::Forbidden("not_owner"));
    }

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let converted = AffiliateService::mark_converted(&mut conn, payload.user_id).await?;
    Ok(Json(serde_json::json!({ "converted": converted })))
}

/// GET /api/affiliate-tracking/my-referrals (authenticated vendedor/admin)
pub async fn my_referrals(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<MyReferralsQuery>,
) -> Result<Json<ReferralReport>, ServiceError> {
    let affiliate_id = match query.affiliate_id {
        Some(other) if other != auth.user_id => {
            if !auth.is_admin() {
                return Err(ServiceError::Forbidden("not_owner"));
            }
            other
        },
        _ => {
            if !auth.has_role(Role::Vendedor.as_str()) && !auth.is_admin() {
                return Err(ServiceError::Forbidden("affiliate_role_required"));
            }
            auth.user_id
        },
    };

    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let report = AffiliateService::referral_report(&mut conn, affiliate_id).await?;
    Ok(Json(report))
}

/// GET /api/affiliate-tracking/check/{visitor_identifier} (public)
pub async fn check_visitor(
    State(state): State<AppState>,
    Path(visitor_identifier): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let mut conn = state
        .diesel_pool
        .get()
        .await
        .map_err(|_| ServiceError::Internal)?;

    let tracked = AffiliateService::visitor_tracked(&mut conn, &visitor_identifier).await?;
    Ok(Json(serde_json::json!({ "tracked": tracked })))
}
