use std::net::SocketAddr;
use std::sync::Arc;

use store_auth::{
    app::{build_auth_service, create_router, AppState},
    auth::{clock::SystemClock, middleware::ForwardedForPolicy, repository::PgAuthRepository},
    config::AppConfig,
    db,
    error::StartupError,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG wins; default to info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Store auth - Starting...");

    if let Err(e) = run().await {
        tracing::error!("Startup failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    tracing::debug!("Loaded configuration: {:?}", config);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(
        &config.database_url,
        config.db_max_connections,
        config.db_acquire_timeout,
    )
    .await?;

    db::run_migrations(&pool).await?;

    let repo = Arc::new(PgAuthRepository::new(pool));
    let auth = build_auth_service(&config, repo, Arc::new(SystemClock));

    if auth
        .bootstrap_admin(&config.admin_username, &config.admin_password)
        .await?
    {
        tracing::info!("Admin credentials applied from environment");
    }

    let state = AppState {
        auth,
        cleanup: config.cleanup.clone(),
        forwarded_for: ForwardedForPolicy {
            trusted: config.trust_forwarded_for,
        },
    };
    let app = create_router(state);

    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Store auth is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
