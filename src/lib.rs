// Library exports for the convênio backend

pub mod app;
pub mod app_config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

use axum::{middleware::from_fn_with_state, Router};

pub use app::AppState;
pub use app_config::{AppConfig, CONFIG};
pub use db::{DieselPool, RedisPool};
pub use middleware::{auth_middleware, AuthenticatedUser};
pub use models::auth::{AccessTokenClaims, RefreshTokenClaims};
pub use services::{JwtService, PaymentGatewayService};

/// Build the full application state from the environment
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let config = app_config::config();

    let db_config = db::DieselDatabaseConfig::default();
    tracing::info!(
        "Initializing database pool ({})",
        db::mask_connection_string(&db_config.url)
    );
    let diesel_pool = db::create_diesel_pool(db_config).await?;

    tracing::info!("Initializing Redis pool...");
    let redis_pool = RedisPool::new(&config.redis_url, config.redis_pool_size)?;

    let jwt = JwtService::new(&config.jwt);
    let gateway = PaymentGatewayService::new(config.payment_gateway.clone())?;

    Ok(AppState::new(diesel_pool, redis_pool, jwt, gateway))
}

/// Assemble the router: public routes, then authenticated routes behind
/// the auth middleware.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .nest("/api/auth", handlers::auth_protected_routes())
        .nest("/api", handlers::payment_routes())
        .nest("/api/affiliate-tracking", handlers::affiliate_protected_routes())
        .nest("/api/scheduling", handlers::scheduling_routes())
        .nest("/api/reports", handlers::report_routes())
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/auth", handlers::auth_routes())
        .nest("/api/webhooks", handlers::webhook_routes())
        .nest("/api/affiliate-tracking", handlers::affiliate_public_routes())
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Liveness endpoint reporting component health
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    use axum::http::StatusCode;
    use axum::Json;

    let postgres_healthy = db::check_diesel_health(&state.diesel_pool).await.is_ok();
    let redis_healthy = state.redis_pool.health_check().await;
    let healthy = postgres_healthy && redis_healthy;

    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "convenio-backend",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "components": {
            "postgresql": if postgres_healthy { "healthy" } else { "unhealthy" },
            "redis": if redis_healthy { "healthy" } else { "unhealthy" },
        }
    });

    if healthy {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}
