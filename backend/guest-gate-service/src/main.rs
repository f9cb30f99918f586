/// Guest Gate Service Main Entry Point
///
/// Starts the HTTP server with:
/// - PostgreSQL connection pool (VIP directory, OTP attempts)
/// - Redis connection manager (OTP code store, request throttles)
/// - OTP channel (Unifonic SMS or the mock channel)
/// - JWT signer for guest sessions
use anyhow::{Context, Result};
use guest_gate_service::{
    config::Settings,
    db::{PgOtpAttemptRepository, PgVipDirectory},
    http::{start_http_server, HttpServerState},
    services::{
        build_channel, BookingStatusUpdater, CodeStore, DirectoryGate, OtpPolicy, OtpService,
        RedisCodeStore, RedisThrottle, SessionIssuer, WebhookAuthenticator,
    },
};
use redis_utils::RedisPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guest_gate_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Guest Gate Service");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    // Run database migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    // Initialize Redis connection pool
    let redis_pool = RedisPool::connect(
        &settings.redis.url,
        Duration::from_millis(settings.redis.command_timeout_ms),
    )
    .await
    .context("Failed to connect to Redis")?;
    info!("Redis connection manager initialized");

    // OTP channel, picked once for the lifetime of the process
    let codes: Arc<dyn CodeStore> = Arc::new(RedisCodeStore::new(redis_pool.clone()));
    let channel = build_channel(&settings.otp, &settings.sms, codes)
        .context("Failed to initialize OTP channel")?;
    info!(channel = channel.name(), "OTP channel initialized");

    let signer = settings.jwt.build_signer()?;
    info!(algorithm = ?signer.algorithm(), "JWT signer initialized");
    let sessions = SessionIssuer::new(signer);

    let vip_directory = Arc::new(PgVipDirectory::new(db_pool.clone()));

    let otp = OtpService::new(
        DirectoryGate::new(vip_directory.clone()),
        Arc::new(PgOtpAttemptRepository::new(db_pool.clone())),
        channel,
        Arc::new(RedisThrottle::new(redis_pool)),
        sessions.clone(),
        OtpPolicy::from_settings(&settings.otp),
    );

    let state = HttpServerState {
        otp,
        sessions,
        booking: BookingStatusUpdater::new(vip_directory),
        webhook_auth: WebhookAuthenticator::from_settings(&settings.webhook),
    };

    start_http_server(
        state,
        &settings.server.host,
        settings.server.port,
        &settings.server.cors_allowed_origins,
        shutdown_signal(),
    )
    .await
    .context("HTTP server error")?;

    info!("Guest gate service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
