// HTTP handlers and route assembly

pub mod affiliate;
pub mod agenda;
pub mod auth;
pub mod subscription;
pub mod webhook;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::app::AppState;

/// Public authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/select-role", post(auth::select_role))
        .route("/refresh", post(auth::refresh))
}

/// Authentication routes behind the auth middleware
pub fn auth_protected_routes() -> Router<AppState> {
    Router::new()
        .route("/switch-role", post(auth::switch_role))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
}

/// Subscription and payment routes (authenticated)
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/validate-coupon/{code}", get(subscription::validate_coupon))
        .route("/create-subscription", post(subscription::create_subscription))
        .route(
            "/payment/create-dependent-payment",
            post(subscription::create_dependent_payment),
        )
        .route(
            "/professional/create-agenda-payment",
            post(subscription::create_agenda_payment),
        )
        .route(
            "/professional/scheduling-access-status",
            post(subscription::scheduling_access_status),
        )
}

/// Webhook routes (public; the gateway cannot authenticate)
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/payment-success", post(webhook::payment_success))
}

/// Public affiliate tracking routes
pub fn affiliate_public_routes() -> Router<AppState> {
    Router::new()
        .route("/track", post(affiliate::track))
        .route("/link-user", post(affiliate::link_user))
        .route("/check/{visitor_identifier}", get(affiliate::check_visitor))
}

/// Affiliate routes behind the auth middleware
pub fn affiliate_protected_routes() -> Router<AppState> {
    Router::new()
        .route("/convert", post(affiliate::convert))
        .route("/my-referrals", get(affiliate::my_referrals))
}

/// Agenda routes (authenticated professionals)
pub fn scheduling_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/appointments",
            get(agenda::list_appointments).post(agenda::create_appointment),
        )
        .route(
            "/appointments/{id}",
            put(agenda::update_appointment).delete(agenda::delete_appointment),
        )
        .route("/appointments/{id}/cancel", post(agenda::cancel_appointment))
}

/// Report routes (authenticated professionals)
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/professional-revenue", get(agenda::professional_revenue))
        .route(
            "/cancelled-consultations",
            get(agenda::cancelled_consultations),
        )
}
