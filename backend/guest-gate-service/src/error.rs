use crate::services::otp_channel::ChannelError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use crypto_core::jwt::JwtError;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GateError>;

/// Shown for malformed, unknown and already-booked phones alike.
pub const GENERIC_DENIED_MESSAGE: &str =
    "عذراً، لا يمكننا معالجة طلبك حالياً. تأكد من رقم الجوال وحاول مجدداً.";
pub const INVALID_CODE_MESSAGE: &str = "رمز التحقق غير صحيح أو انتهت صلاحيته.";
const WRONG_CODE_MESSAGE: &str = "رمز التحقق غير صحيح.";
const DELIVERY_MESSAGE: &str = "تعذر إرسال رمز التحقق. حاول مجدداً.";
const THROTTLED_MESSAGE: &str = "عدد كبير من المحاولات. حاول لاحقاً.";
const INVALID_CREDENTIAL_MESSAGE: &str = "Token is invalid or expired.";
const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum GateError {
    /// Malformed phone, unknown phone and booked phone share this variant.
    #[error("Request denied")]
    Denied,

    #[error("Resend cooldown active, {remaining_secs}s remaining")]
    Cooldown { remaining_secs: i64 },

    #[error("Too many requests, retry after {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    #[error("Invalid or expired code")]
    InvalidCode { attempts_remaining: Option<i32> },

    #[error("Verification attempts exhausted")]
    AttemptsExhausted,

    #[error("OTP delivery failed")]
    Delivery,

    #[error("Invalid or expired token")]
    InvalidCredential,

    #[error("Webhook authentication failed")]
    WebhookForbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Guest already has an active booking")]
    AlreadyBooked,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureBody {
    ok: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cooldown_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts_remaining: Option<i32>,
}

impl FailureBody {
    fn new(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            cooldown_remaining: None,
            retry_after: None,
            attempts_remaining: None,
        }
    }
}

impl GateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::Denied | GateError::WebhookForbidden => StatusCode::FORBIDDEN,
            GateError::Cooldown { .. }
            | GateError::Throttled { .. }
            | GateError::AttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
            GateError::InvalidCode { .. } | GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GateError::Delivery => StatusCode::BAD_GATEWAY,
            GateError::InvalidCredential => StatusCode::UNAUTHORIZED,
            GateError::AlreadyBooked => StatusCode::CONFLICT,
            GateError::Database(_) | GateError::Redis(_) | GateError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> FailureBody {
        match self {
            GateError::Denied => FailureBody::new(GENERIC_DENIED_MESSAGE),
            GateError::Cooldown { remaining_secs } => FailureBody {
                cooldown_remaining: Some(*remaining_secs),
                ..FailureBody::new(format!(
                    "يرجى الانتظار {remaining_secs} ثانية قبل إعادة الإرسال."
                ))
            },
            GateError::Throttled { retry_after_secs } => FailureBody {
                retry_after: Some(*retry_after_secs),
                ..FailureBody::new(THROTTLED_MESSAGE)
            },
            GateError::InvalidCode {
                attempts_remaining: Some(remaining),
            } => FailureBody {
                attempts_remaining: Some(*remaining),
                ..FailureBody::new(WRONG_CODE_MESSAGE)
            },
            GateError::InvalidCode {
                attempts_remaining: None,
            } => FailureBody::new(INVALID_CODE_MESSAGE),
            GateError::AttemptsExhausted => FailureBody {
                attempts_remaining: Some(0),
                ..FailureBody::new(INVALID_CODE_MESSAGE)
            },
            GateError::Delivery => FailureBody::new(DELIVERY_MESSAGE),
            GateError::InvalidCredential => FailureBody::new(INVALID_CREDENTIAL_MESSAGE),
            GateError::WebhookForbidden => FailureBody::new("Forbidden"),
            GateError::BadRequest(msg) => FailureBody::new(msg.clone()),
            GateError::AlreadyBooked => FailureBody::new("User already has an active booking"),
            // Don't leak internal details
            GateError::Database(_) | GateError::Redis(_) | GateError::Internal(_) => {
                FailureBody::new(INTERNAL_MESSAGE)
            }
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.body())).into_response();

        if let GateError::Throttled { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

// Conversions from external error types
impl From<sqlx::Error> for GateError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        GateError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for GateError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        GateError::Redis(err.to_string())
    }
}

impl From<ChannelError> for GateError {
    fn from(err: ChannelError) -> Self {
        tracing::error!(error = %err, diagnostics = ?err, "OTP channel failure");
        GateError::Delivery
    }
}

impl From<JwtError> for GateError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::InvalidKey(_) | JwtError::Encoding(_) => {
                tracing::error!("JWT error: {}", err);
                GateError::Internal(err.to_string())
            }
            JwtError::Expired | JwtError::Validation(_) | JwtError::WrongTokenType { .. } => {
                tracing::debug!("Rejected token: {}", err);
                GateError::InvalidCredential
            }
        }
    }
}
