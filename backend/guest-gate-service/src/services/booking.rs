/// Booking status updates pushed by the scheduling provider
///
/// The OTP flow never calls into this module. It only keeps `booked` and
/// `bookings_count` on the VIP directory in step with confirmed bookings, which
/// is what the directory gate reads at send time.
use crate::config::WebhookSettings;
use crate::db::VipDirectory;
use crate::error::{GateError, Result};
use crate::models::BookingChange;
use crate::phone::PhoneNumber;
use crypto_core::signature::{constant_time_eq, verify_hex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum clock skew accepted on signed webhooks
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    #[serde(rename = "booking.created")]
    Created,
    #[serde(rename = "booking.canceled", alias = "booking.cancelled")]
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingOutcome {
    Recorded { bookings_count: i32 },
    Released { bookings_count: i32 },
    /// Phone is not on the VIP list; acknowledged without changes
    Ignored,
}

#[derive(Clone)]
pub struct BookingStatusUpdater {
    directory: Arc<dyn VipDirectory>,
}

impl BookingStatusUpdater {
    pub fn new(directory: Arc<dyn VipDirectory>) -> Self {
        Self { directory }
    }

    pub async fn apply(&self, event: BookingEvent, raw_phone: &str) -> Result<BookingOutcome> {
        let phone = PhoneNumber::parse(raw_phone)
            .ok_or_else(|| GateError::BadRequest("Invalid phone number".to_string()))?;

        let change = match event {
            BookingEvent::Created => self.directory.record_booking(phone.as_str()).await?,
            BookingEvent::Canceled => self.directory.release_booking(phone.as_str()).await?,
        };

        match (event, change) {
            (BookingEvent::Created, BookingChange::Applied(vip)) => {
                info!(phone = %phone.masked(), bookings_count = vip.bookings_count, "Booking recorded");
                Ok(BookingOutcome::Recorded {
                    bookings_count: vip.bookings_count,
                })
            }
            (BookingEvent::Canceled, BookingChange::Applied(vip)) => {
                info!(
                    phone = %phone.masked(),
                    bookings_count = vip.bookings_count,
                    booked = vip.booked,
                    "Booking released"
                );
                Ok(BookingOutcome::Released {
                    bookings_count: vip.bookings_count,
                })
            }
            (BookingEvent::Created, BookingChange::AlreadyBooked) => {
                warn!(phone = %phone.masked(), "Booking rejected: guest already booked");
                Err(GateError::AlreadyBooked)
            }
            (_, BookingChange::AlreadyBooked) | (_, BookingChange::UnknownPhone) => {
                info!(phone = %phone.masked(), event = ?event, "Booking event for non-VIP phone ignored");
                Ok(BookingOutcome::Ignored)
            }
        }
    }
}

/// Checks that a webhook call really comes from the booking provider.
///
/// Accepts either the shared secret in `X-Webhook-Secret` or an HMAC-SHA256
/// signature `t=<unix>,v1=<hex>` over `"{t}.{body}"` in `X-Webhook-Signature`.
#[derive(Clone)]
pub struct WebhookAuthenticator {
    shared_secret: Option<String>,
    signing_key: Option<String>,
    allow_unauthenticated: bool,
}

impl WebhookAuthenticator {
    pub fn from_settings(settings: &WebhookSettings) -> Self {
        Self {
            shared_secret: settings.shared_secret.clone(),
            signing_key: settings.signing_key.clone(),
            allow_unauthenticated: settings.allow_unauthenticated,
        }
    }

    pub fn verify(
        &self,
        secret_header: Option<&str>,
        signature_header: Option<&str>,
        body: &[u8],
        now_ts: i64,
    ) -> bool {
        if self.shared_secret.is_none() && self.signing_key.is_none() {
            return self.allow_unauthenticated;
        }

        if let (Some(expected), Some(presented)) = (&self.shared_secret, secret_header) {
            if constant_time_eq(expected.as_bytes(), presented.trim().as_bytes()) {
                return true;
            }
        }

        if let (Some(key), Some(header)) = (&self.signing_key, signature_header) {
            if let Some((timestamp, signature)) = parse_signature_header(header) {
                if (now_ts - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
                    warn!(timestamp, now_ts, "Webhook signature outside tolerance window");
                    return false;
                }
                let mut signed = format!("{timestamp}.").into_bytes();
                signed.extend_from_slice(body);
                return verify_hex(key.as_bytes(), &signed, signature);
            }
        }

        false
    }
}

/// Split `t=<unix>,v1=<hex>` into its parts.
fn parse_signature_header(header: &str) -> Option<(i64, &str)> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.trim().parse::<i64>().ok(),
            Some(("v1", value)) => signature = Some(value.trim()),
            _ => {}
        }
    }

    Some((timestamp?, signature?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crypto_core::signature::sign_hex;

    fn authenticator(secret: Option<&str>, key: Option<&str>, open: bool) -> WebhookAuthenticator {
        WebhookAuthenticator::from_settings(&WebhookSettings {
            shared_secret: secret.map(String::from),
            signing_key: key.map(String::from),
            allow_unauthenticated: open,
        })
    }

    fn signature(key: &str, ts: i64, body: &[u8]) -> String {
        let mut signed = format!("{ts}.").into_bytes();
        signed.extend_from_slice(body);
        format!("t={ts},v1={}", sign_hex(key.as_bytes(), &signed))
    }

    #[test]
    fn test_event_names() {
        let created: BookingEvent = serde_json::from_str("\"booking.created\"").unwrap();
        let canceled: BookingEvent = serde_json::from_str("\"booking.canceled\"").unwrap();
        let cancelled: BookingEvent = serde_json::from_str("\"booking.cancelled\"").unwrap();
        assert_eq!(created, BookingEvent::Created);
        assert_eq!(canceled, BookingEvent::Canceled);
        assert_eq!(cancelled, BookingEvent::Canceled);
        assert!(serde_json::from_str::<BookingEvent>("\"booking.updated\"").is_err());
    }

    #[test]
    fn test_shared_secret() {
        let auth = authenticator(Some("s3cret"), None, false);
        assert!(auth.verify(Some("s3cret"), None, b"{}", 0));
        assert!(!auth.verify(Some("wrong"), None, b"{}", 0));
        assert!(!auth.verify(None, None, b"{}", 0));
    }

    #[test]
    fn test_signed_body() {
        let auth = authenticator(None, Some("signing-key"), false);
        let body = br#"{"event":"booking.created","phone":"0512345678"}"#;
        let now = 1_760_000_000;

        assert!(auth.verify(None, Some(&signature("signing-key", now, body)), body, now));
        assert!(!auth.verify(None, Some(&signature("other-key", now, body)), body, now));
        assert!(!auth.verify(
            None,
            Some(&signature("signing-key", now, body)),
            b"{\"tampered\":true}",
            now
        ));
        assert!(!auth.verify(
            None,
            Some(&signature("signing-key", now - 301, body)),
            body,
            now
        ));
        assert!(!auth.verify(None, Some("v1=deadbeef"), body, now));
    }

    #[test]
    fn test_unconfigured() {
        assert!(authenticator(None, None, true).verify(None, None, b"{}", 0));
        assert!(!authenticator(None, None, false).verify(None, None, b"{}", 0));
    }

    #[test]
    fn test_parse_signature_header() {
        assert_eq!(
            parse_signature_header("t=123, v1=abcd"),
            Some((123, "abcd"))
        );
        assert_eq!(parse_signature_header("t=abc,v1=abcd"), None);
        assert_eq!(parse_signature_header("t=123"), None);
    }
}
