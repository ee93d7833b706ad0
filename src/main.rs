// Convênio backend entry point

use std::net::SocketAddr;

use convenio_backend::services::expiry_sweeper;
use convenio_backend::{app_config, build_router, initialize_app_state};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = app_config::config();
    tracing::info!(
        "Starting convenio-backend ({} environment)",
        config.environment
    );

    let state = initialize_app_state().await?;

    // daily subscription expiry sweep
    expiry_sweeper::spawn(state.diesel_pool.clone());

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Listening on {}", config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
