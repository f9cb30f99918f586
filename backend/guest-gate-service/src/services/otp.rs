/// OTP state machine
///
/// Per phone the latest attempt moves `pending -> verified | failed | expired`
/// and never leaves a terminal state. Sending is gated by the VIP directory,
/// the resend cooldown and the per-phone throttles; verifying only needs the
/// attempt record, so a guest who books between send and verify still logs in.
///
/// Every failure leaves here as one of a handful of `GateError` shapes. A
/// malformed, unknown or booked phone all produce `GateError::Denied`.
use crate::config::OtpSettings;
use crate::db::OtpAttemptRepository;
use crate::error::{GateError, Result};
use crate::models::{NewOtpAttempt, OtpStatus};
use crate::phone::PhoneNumber;
use crate::services::directory::DirectoryGate;
use crate::services::otp_channel::OtpChannel;
use crate::services::session::SessionIssuer;
use crate::services::throttle::{RequestThrottle, ThrottleDecision, ThrottleRule, ThrottleScope};
use crate::validators::{validate_otp_code, validate_request_id};
use chrono::{Duration, Utc};
use crypto_core::jwt::TokenPair;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Timing and budget knobs of the state machine
#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub expiry: Duration,
    pub max_attempts: i32,
    pub resend_cooldown: Duration,
    pub request_limit: ThrottleRule,
    pub verify_limit: ThrottleRule,
}

impl OtpPolicy {
    pub fn from_settings(settings: &OtpSettings) -> Self {
        Self {
            expiry: Duration::seconds(settings.expiry_seconds),
            max_attempts: settings.max_attempts,
            resend_cooldown: Duration::seconds(settings.resend_cooldown_seconds),
            request_limit: settings.request_limit,
            verify_limit: settings.verify_limit,
        }
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            expiry: Duration::minutes(5),
            max_attempts: 5,
            resend_cooldown: Duration::seconds(60),
            request_limit: ThrottleRule::new(3, 600),
            verify_limit: ThrottleRule::new(10, 600),
        }
    }
}

/// Handle returned to the caller after a successful send. Never carries the code.
#[derive(Debug, Clone)]
pub struct OtpRequested {
    pub request_id: String,
    /// Seconds until the attempt expires
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct OtpVerified {
    pub phone: PhoneNumber,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct OtpService {
    directory: DirectoryGate,
    attempts: Arc<dyn OtpAttemptRepository>,
    channel: Arc<dyn OtpChannel>,
    throttle: Arc<dyn RequestThrottle>,
    sessions: SessionIssuer,
    policy: OtpPolicy,
}

impl OtpService {
    pub fn new(
        directory: DirectoryGate,
        attempts: Arc<dyn OtpAttemptRepository>,
        channel: Arc<dyn OtpChannel>,
        throttle: Arc<dyn RequestThrottle>,
        sessions: SessionIssuer,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            directory,
            attempts,
            channel,
            throttle,
            sessions,
            policy,
        }
    }

    /// Send a code to an eligible phone and open a new pending attempt.
    pub async fn request_otp(&self, raw_phone: &str) -> Result<OtpRequested> {
        let Some(phone) = PhoneNumber::parse(raw_phone) else {
            info!("OTP request denied: unparseable phone");
            return Err(GateError::Denied);
        };

        // Throttle before the directory lookup so a 429 says nothing about membership.
        self.enforce(ThrottleScope::RequestOtp, &phone, self.policy.request_limit)
            .await?;

        if !self.directory.is_eligible(&phone).await? {
            info!(phone = %phone.masked(), "OTP request denied: not eligible");
            return Err(GateError::Denied);
        }

        if let Some(pending) = self.attempts.latest_pending(phone.as_str()).await? {
            let elapsed = pending.since_last_sent(Utc::now());
            if elapsed < self.policy.resend_cooldown {
                let remaining_secs = (self.policy.resend_cooldown - elapsed).num_seconds().max(0);
                info!(phone = %phone.masked(), remaining_secs, "OTP resend within cooldown");
                return Err(GateError::Cooldown { remaining_secs });
            }
        }

        // Nothing is written when the provider fails.
        let reference_id = self.channel.dispatch(&phone).await?;

        let attempt = self
            .attempts
            .issue(NewOtpAttempt {
                phone: phone.as_str().to_string(),
                reference_id,
                ttl: self.policy.expiry,
            })
            .await?;

        info!(
            phone = %phone.masked(),
            attempt_id = %attempt.id,
            channel = self.channel.name(),
            "OTP issued"
        );

        Ok(OtpRequested {
            request_id: attempt.reference_id,
            expires_in: self.policy.expiry.num_seconds(),
        })
    }

    /// Check a submitted code against the attempt opened under `request_id`
    /// and mint a session on success.
    pub async fn verify_otp(
        &self,
        raw_phone: &str,
        request_id: &str,
        code: &str,
    ) -> Result<OtpVerified> {
        let invalid = GateError::InvalidCode {
            attempts_remaining: None,
        };

        let Some(phone) = PhoneNumber::parse(raw_phone) else {
            return Err(invalid);
        };

        self.enforce(ThrottleScope::VerifyOtp, &phone, self.policy.verify_limit)
            .await?;

        if !validate_otp_code(code) || !validate_request_id(request_id) {
            return Err(invalid);
        }

        let Some(attempt) = self
            .attempts
            .find_by_reference(phone.as_str(), request_id)
            .await?
        else {
            warn!(phone = %phone.masked(), "OTP verify for unknown request");
            return Err(invalid);
        };

        if attempt.status.is_terminal() {
            if attempt.status == OtpStatus::Failed {
                return Err(GateError::AttemptsExhausted);
            }
            warn!(
                phone = %phone.masked(),
                attempt_id = %attempt.id,
                status = attempt.status.as_str(),
                "OTP verify against closed attempt"
            );
            return Err(invalid);
        }

        if attempt.is_expired_at(Utc::now()) {
            self.attempts
                .transition(attempt.id, OtpStatus::Expired)
                .await?;
            info!(phone = %phone.masked(), attempt_id = %attempt.id, "OTP attempt expired");
            return Err(invalid);
        }

        // Claimed before the channel sees the code; concurrent guesses share one budget.
        let Some(count) = self
            .attempts
            .reserve_attempt(attempt.id, self.policy.max_attempts)
            .await?
        else {
            return Err(self.close_exhausted(&phone, attempt.id).await?);
        };

        let matched = match self.channel.confirm(&attempt.reference_id, code).await {
            Ok(matched) => matched,
            Err(err) => {
                self.attempts.release_attempt(attempt.id).await?;
                return Err(err.into());
            }
        };

        if !matched {
            let attempts_remaining = (self.policy.max_attempts - count).max(0);
            warn!(
                phone = %phone.masked(),
                attempt_id = %attempt.id,
                attempts_remaining,
                "Invalid OTP code"
            );
            return Err(GateError::InvalidCode {
                attempts_remaining: Some(attempts_remaining),
            });
        }

        // Another request may have closed the attempt while the code was checked.
        if !self.attempts.mark_verified(attempt.id).await? {
            warn!(phone = %phone.masked(), attempt_id = %attempt.id, "OTP attempt closed concurrently");
            return Err(invalid);
        }

        let tokens = self.sessions.issue(&phone)?;
        info!(phone = %phone.masked(), attempt_id = %attempt.id, "Phone verified");

        Ok(OtpVerified { phone, tokens })
    }

    /// Lock an attempt whose guess budget is spent. When a concurrent request
    /// closed it first, answer according to the status it left behind.
    async fn close_exhausted(&self, phone: &PhoneNumber, id: Uuid) -> Result<GateError> {
        if self.attempts.transition(id, OtpStatus::Failed).await? {
            warn!(phone = %phone.masked(), attempt_id = %id, "OTP attempts exhausted");
            return Ok(GateError::AttemptsExhausted);
        }

        let status = self.attempts.get(id).await?.map(|attempt| attempt.status);
        Ok(match status {
            Some(OtpStatus::Failed) => GateError::AttemptsExhausted,
            _ => GateError::InvalidCode {
                attempts_remaining: None,
            },
        })
    }

    async fn enforce(
        &self,
        scope: ThrottleScope,
        phone: &PhoneNumber,
        rule: ThrottleRule,
    ) -> Result<()> {
        match self.throttle.hit(scope, phone, rule).await? {
            ThrottleDecision::Allowed => Ok(()),
            ThrottleDecision::Limited { retry_after_secs } => {
                Err(GateError::Throttled { retry_after_secs })
            }
        }
    }
}
