use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// OTP attempt status matching database otp_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "otp_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OtpStatus {
    Pending,
    Verified,
    Failed,
    Expired,
}

impl OtpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpStatus::Pending => "pending",
            OtpStatus::Verified => "verified",
            OtpStatus::Failed => "failed",
            OtpStatus::Expired => "expired",
        }
    }

    /// Verified, failed and expired rows are never rewritten.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OtpStatus::Pending)
    }
}

/// One "send OTP" action. Kept forever as an audit trail.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OtpAttempt {
    pub id: Uuid,
    pub phone: String,
    /// Delivery reference handed back to the caller as `requestId`
    pub reference_id: String,
    pub status: OtpStatus,
    pub attempts_count: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_sent_at: DateTime<Utc>,
}

impl OtpAttempt {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn since_last_sent(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_sent_at
    }
}

/// Input for issuing a fresh pending attempt
#[derive(Debug, Clone)]
pub struct NewOtpAttempt {
    pub phone: String,
    pub reference_id: String,
    pub ttl: Duration,
}

impl NewOtpAttempt {
    /// Materialize the row as it is stored at `now`.
    pub fn into_attempt(self, now: DateTime<Utc>) -> OtpAttempt {
        OtpAttempt {
            id: Uuid::new_v4(),
            phone: self.phone,
            reference_id: self.reference_id,
            status: OtpStatus::Pending,
            attempts_count: 0,
            created_at: now,
            expires_at: now + self.ttl,
            last_sent_at: now,
        }
    }
}
