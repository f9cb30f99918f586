/// HTTP API for the guest login flow
///
/// - `POST /api/auth/request-otp`, `POST /api/auth/verify-otp`
/// - `POST /api/auth/token/refresh`, `GET /api/auth/me`
/// - `POST /api/booking/webhook` for the scheduling provider
///
/// Every failure body is one of the fixed `GateError` shapes.
mod auth;
mod booking;

pub use auth::{
    MeResponse, RefreshRequest, RequestOtpRequest, RequestOtpResponse, SessionResponse,
    VerifyOtpRequest,
};
pub use booking::{WebhookPayload, WebhookResponse};

use crate::services::{BookingStatusUpdater, OtpService, SessionIssuer, WebhookAuthenticator};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared HTTP server state
#[derive(Clone)]
pub struct HttpServerState {
    pub otp: OtpService,
    pub sessions: SessionIssuer,
    pub booking: BookingStatusUpdater,
    pub webhook_auth: WebhookAuthenticator,
}

/// Build the HTTP router with all public endpoints
pub fn build_router(state: HttpServerState, cors_allowed_origins: &[String]) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/request-otp", post(auth::request_otp))
        .route("/api/auth/verify-otp", post(auth::verify_otp))
        .route("/api/auth/token/refresh", post(auth::refresh_token))
        .route("/api/auth/me", get(auth::me))
        .route("/api/booking/webhook", post(booking::booking_webhook))
        .layer(cors_layer(cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Serve until `shutdown` resolves.
pub async fn start_http_server(
    state: HttpServerState,
    host: &str,
    port: u16,
    cors_allowed_origins: &[String],
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state, cors_allowed_origins);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Starting guest gate HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
