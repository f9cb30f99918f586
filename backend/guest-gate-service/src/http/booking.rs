/// Booking provider webhook
use super::HttpServerState;
use crate::error::GateError;
use crate::services::{BookingEvent, BookingOutcome};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const SECRET_HEADER: &str = "x-webhook-secret";
const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub event: BookingEvent,
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookings_count: Option<i32>,
}

impl From<BookingOutcome> for WebhookResponse {
    fn from(outcome: BookingOutcome) -> Self {
        let (outcome, bookings_count) = match outcome {
            BookingOutcome::Recorded { bookings_count } => ("recorded", Some(bookings_count)),
            BookingOutcome::Released { bookings_count } => ("released", Some(bookings_count)),
            BookingOutcome::Ignored => ("ignored", None),
        };
        Self {
            received: true,
            outcome,
            bookings_count,
        }
    }
}

/// POST /api/booking/webhook
///
/// The raw body is kept for signature verification before it is parsed.
pub async fn booking_webhook(
    State(state): State<Arc<HttpServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, GateError> {
    if !state.webhook_auth.verify(
        header_value(&headers, SECRET_HEADER),
        header_value(&headers, SIGNATURE_HEADER),
        &body,
        Utc::now().timestamp(),
    ) {
        warn!("Rejected booking webhook: authentication failed");
        return Err(GateError::WebhookForbidden);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| GateError::BadRequest(format!("Invalid webhook payload: {e}")))?;

    let outcome = state.booking.apply(payload.event, &payload.phone).await?;
    Ok(Json(outcome.into()))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
