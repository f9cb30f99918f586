//! Configuration management for the guest gate service
//!
//! Loads settings from environment variables, with a `.env` file picked up in
//! debug builds.
//!
//! # Example
//!
//! ```no_run
//! use guest_gate_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("OTP expiry: {}s", settings.otp.expiry_seconds);
//!     Ok(())
//! }
//! ```

use crate::services::throttle::ThrottleRule;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use crypto_core::jwt::{JwtSigner, TokenLifetimes};
use std::env;
use std::str::FromStr;
use tracing::{info, warn};

const DEFAULT_UNIFONIC_URL: &str = "https://el.cloud.unifonic.com/rest/SMS/messages";

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub otp: OtpSettings,
    pub sms: SmsSettings,
    pub webhook: WebhookSettings,
    pub server: ServerSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            if let Ok(path) = dotenvy::dotenv() {
                info!(path = %path.display(), "Loaded .env file for development");
            }
        }

        let sms = SmsSettings::from_env()?;
        let otp = OtpSettings::from_env(&sms, cfg!(debug_assertions))?;

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            otp,
            sms,
            webhook: WebhookSettings::from_env(cfg!(debug_assertions)),
            server: ServerSettings::from_env()?,
        })
    }
}

/// Read `key`, falling back to `default`, and parse it.
fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {key}: {e}"))
}

fn env_flag(key: &str) -> bool {
    matches!(
        env::var(key)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", "10")?,
            acquire_timeout: env_or("DATABASE_ACQUIRE_TIMEOUT", "5")?,
        })
    }
}

/// Redis settings
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub command_timeout_ms: u64,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
            command_timeout_ms: env_or("REDIS_COMMAND_TIMEOUT_MS", "2000")?,
        })
    }
}

#[derive(Clone)]
pub enum JwtKey {
    Rsa {
        private_pem: String,
        public_pem: String,
    },
    Secret(String),
}

impl std::fmt::Debug for JwtKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtKey::Rsa { .. } => f.write_str("JwtKey::Rsa(<redacted>)"),
            JwtKey::Secret(_) => f.write_str("JwtKey::Secret(<redacted>)"),
        }
    }
}

/// Session token settings
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub key: JwtKey,
    pub issuer: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        // PEM pairs are preferred; the shared secret is the single-service fallback.
        let key = match env_non_empty("JWT_PRIVATE_KEY") {
            Some(private_pem) => {
                let public_pem = env_non_empty("JWT_PUBLIC_KEY")
                    .context("JWT_PUBLIC_KEY must be set when JWT_PRIVATE_KEY is configured")?;
                JwtKey::Rsa {
                    private_pem: unescape_pem(&private_pem),
                    public_pem: unescape_pem(&public_pem),
                }
            }
            None => JwtKey::Secret(
                env_non_empty("JWT_SECRET")
                    .context("JWT_SECRET must be set when no PEM keys are configured")?,
            ),
        };

        let settings = Self {
            key,
            issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "guest-gate".to_string()),
            access_ttl_seconds: env_or("JWT_ACCESS_TTL_SECONDS", "900")?,
            refresh_ttl_seconds: env_or("JWT_REFRESH_TTL_SECONDS", "604800")?,
        };

        if settings.access_ttl_seconds <= 0 || settings.refresh_ttl_seconds <= 0 {
            bail!("JWT token lifetimes must be positive");
        }
        if settings.refresh_ttl_seconds <= settings.access_ttl_seconds {
            warn!("JWT_REFRESH_TTL_SECONDS is not longer than JWT_ACCESS_TTL_SECONDS");
        }

        Ok(settings)
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: Duration::seconds(self.access_ttl_seconds),
            refresh: Duration::seconds(self.refresh_ttl_seconds),
        }
    }

    pub fn build_signer(&self) -> Result<JwtSigner> {
        let signer = match &self.key {
            JwtKey::Rsa {
                private_pem,
                public_pem,
            } => JwtSigner::rs256(private_pem, public_pem, &self.issuer, self.lifetimes()),
            JwtKey::Secret(secret) => {
                JwtSigner::hs256(secret.as_bytes(), &self.issuer, self.lifetimes())
            }
        };
        signer.context("Failed to initialize JWT signer")
    }
}

/// Secrets managers often store PEM bodies with literal `\n` sequences.
fn unescape_pem(value: &str) -> String {
    value.replace("\\n", "\n")
}

/// OTP policy
#[derive(Debug, Clone)]
pub struct OtpSettings {
    pub code_length: usize,
    pub expiry_seconds: i64,
    pub max_attempts: i32,
    pub resend_cooldown_seconds: i64,
    /// Lifetime of the reference -> code association held by the channel
    pub code_ttl_seconds: u64,
    pub mock_mode: bool,
    pub request_limit: ThrottleRule,
    pub verify_limit: ThrottleRule,
}

impl OtpSettings {
    fn from_env(sms: &SmsSettings, debug_build: bool) -> Result<Self> {
        let code_length: usize = env_or("OTP_CODE_LENGTH", "6")?;
        if !(4..=8).contains(&code_length) {
            bail!("OTP_CODE_LENGTH must be between 4 and 8, got {code_length}");
        }

        let max_attempts: i32 = env_or("OTP_MAX_ATTEMPTS", "5")?;
        if max_attempts < 1 {
            bail!("OTP_MAX_ATTEMPTS must be at least 1");
        }

        let mock_mode = resolve_mock_mode(
            env_flag("OTP_MOCK_MODE"),
            sms.app_sid.as_deref(),
            debug_build,
        )?;

        Ok(Self {
            code_length,
            expiry_seconds: env_or("OTP_EXPIRY_SECONDS", "300")?,
            max_attempts,
            resend_cooldown_seconds: env_or("OTP_RESEND_COOLDOWN_SECONDS", "60")?,
            code_ttl_seconds: env_or("OTP_CODE_TTL_SECONDS", "600")?,
            mock_mode,
            request_limit: env_or("OTP_REQUEST_LIMIT", "3/600")?,
            verify_limit: env_or("OTP_VERIFY_LIMIT", "10/600")?,
        })
    }
}

fn is_placeholder_app_sid(app_sid: Option<&str>) -> bool {
    match app_sid.map(str::trim) {
        None | Some("") => true,
        Some(sid) => sid.starts_with("YOUR_") || sid.eq_ignore_ascii_case("changeme"),
    }
}

/// Decide once, at startup, whether the deterministic channel replaces the SMS provider.
///
/// Debug builds fall back to mock mode when no real app SID is configured;
/// release builds refuse to start in that situation.
pub fn resolve_mock_mode(explicit: bool, app_sid: Option<&str>, debug_build: bool) -> Result<bool> {
    if explicit {
        return Ok(true);
    }
    if !is_placeholder_app_sid(app_sid) {
        return Ok(false);
    }
    if debug_build {
        warn!("UNIFONIC_APP_SID missing or placeholder - using mock OTP channel");
        return Ok(true);
    }
    bail!("UNIFONIC_APP_SID must be set (or OTP_MOCK_MODE=true) in release builds")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientFormat {
    /// `9665XXXXXXXX`
    Plain,
    /// `+9665XXXXXXXX`
    Plus,
}

impl FromStr for RecipientFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(RecipientFormat::Plain),
            "plus" => Ok(RecipientFormat::Plus),
            other => Err(format!("expected 'plain' or 'plus', got '{other}'")),
        }
    }
}

/// SMS provider (Unifonic) settings
#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub app_sid: Option<String>,
    pub sender_id: String,
    pub base_url: String,
    pub recipient_format: RecipientFormat,
    pub timeout_seconds: u64,
}

impl SmsSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            app_sid: env_non_empty("UNIFONIC_APP_SID"),
            sender_id: env::var("UNIFONIC_SENDER_ID").unwrap_or_else(|_| "lodore".to_string()),
            base_url: env::var("UNIFONIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_UNIFONIC_URL.to_string()),
            recipient_format: env_or("UNIFONIC_RECIPIENT_PREFIX", "plain")?,
            timeout_seconds: env_or("UNIFONIC_TIMEOUT_SECONDS", "15")?,
        })
    }
}

/// Booking webhook authentication
#[derive(Debug, Clone, Default)]
pub struct WebhookSettings {
    pub shared_secret: Option<String>,
    pub signing_key: Option<String>,
    /// Only ever true in debug builds with no secret configured
    pub allow_unauthenticated: bool,
}

impl WebhookSettings {
    fn from_env(debug_build: bool) -> Self {
        let shared_secret = env_non_empty("BOOKING_WEBHOOK_SECRET");
        let signing_key = env_non_empty("BOOKING_WEBHOOK_SIGNING_KEY");
        let unconfigured = shared_secret.is_none() && signing_key.is_none();

        if unconfigured {
            if debug_build {
                warn!("Booking webhook secret not configured - accepting unauthenticated webhooks");
            } else {
                warn!("Booking webhook secret not configured - all webhooks will be rejected");
            }
        }

        Self {
            shared_secret,
            signing_key,
            allow_unauthenticated: unconfigured && debug_build,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("SERVER_PORT", "8080")?,
            cors_allowed_origins,
        })
    }
}
