/// OTP delivery channels
///
/// Two implementations of one contract, picked once at startup:
///
/// - `UnifonicChannel` generates a random code and sends it through the
///   Unifonic SMS REST API
/// - `MockOtpChannel` never touches the network and always "sends" `123456`
///
/// Both keep the reference -> code association in the shared `CodeStore`, so
/// confirmation behaves identically whichever channel is active.
use super::code_store::CodeStore;
use crate::config::{OtpSettings, RecipientFormat, SmsSettings};
use crate::phone::PhoneNumber;
use async_trait::async_trait;
use rand::{rngs::OsRng, Rng};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fixed code accepted in mock mode
pub const MOCK_OTP_CODE: &str = "123456";

const PREVIEW_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("SMS provider returned status {status}")]
    HttpStatus {
        status: u16,
        content_type: String,
        preview: String,
    },

    #[error("SMS provider returned non-JSON response (status {status})")]
    NotJson {
        status: u16,
        content_type: String,
        preview: String,
    },

    #[error("SMS provider error: {message}")]
    Rejected { status: u16, message: String },

    #[error("SMS provider timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u128 },

    #[error("Network error contacting SMS provider: {0}")]
    Network(String),

    #[error("OTP code store unavailable: {0}")]
    Store(String),
}

#[async_trait]
pub trait OtpChannel: Send + Sync {
    /// Deliver a fresh code to `phone` and return its delivery reference.
    async fn dispatch(&self, phone: &PhoneNumber) -> Result<String, ChannelError>;

    /// Check a submitted code. A match consumes the reference; a wrong code is
    /// `Ok(false)`, never an error.
    async fn confirm(&self, reference: &str, code: &str) -> Result<bool, ChannelError>;

    fn name(&self) -> &'static str;
}

/// Pick the channel for this process.
pub fn build_channel(
    otp: &OtpSettings,
    sms: &SmsSettings,
    codes: Arc<dyn CodeStore>,
) -> anyhow::Result<Arc<dyn OtpChannel>> {
    let code_ttl = Duration::from_secs(otp.code_ttl_seconds);

    if otp.mock_mode {
        warn!("OTP mock mode enabled - SMS will not be sent, code is {MOCK_OTP_CODE}");
        return Ok(Arc::new(MockOtpChannel::new(codes, code_ttl)));
    }

    let channel = UnifonicChannel::new(sms, codes, otp.code_length, code_ttl)?;
    info!(sender = %sms.sender_id, "Unifonic SMS channel initialized");
    Ok(Arc::new(channel))
}

// ========== Live channel ==========

/// Unifonic SMS REST API channel
pub struct UnifonicChannel {
    http: reqwest::Client,
    endpoint: String,
    app_sid: String,
    sender_id: String,
    recipient_format: RecipientFormat,
    codes: Arc<dyn CodeStore>,
    code_length: usize,
    code_ttl: Duration,
}

impl UnifonicChannel {
    pub fn new(
        sms: &SmsSettings,
        codes: Arc<dyn CodeStore>,
        code_length: usize,
        code_ttl: Duration,
    ) -> anyhow::Result<Self> {
        let app_sid = sms
            .app_sid
            .clone()
            .ok_or_else(|| anyhow::anyhow!("UNIFONIC_APP_SID is required for live SMS delivery"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(sms.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            endpoint: sms.base_url.clone(),
            app_sid,
            sender_id: sms.sender_id.clone(),
            recipient_format: sms.recipient_format,
            codes,
            code_length,
            code_ttl,
        })
    }

    async fn send_sms(&self, trace_id: &str, recipient: &str, body: &str) -> Result<(), ChannelError> {
        let form = [
            ("AppSid", self.app_sid.as_str()),
            ("SenderID", self.sender_id.as_str()),
            ("Recipient", recipient),
            ("Body", body),
            ("responseType", "json"),
        ];

        let started = Instant::now();
        let response = self
            .http
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                let elapsed_ms = started.elapsed().as_millis();
                if e.is_timeout() {
                    error!(trace_id, elapsed_ms = elapsed_ms as u64, "Unifonic request timeout");
                    ChannelError::Timeout { elapsed_ms }
                } else {
                    error!(trace_id, elapsed_ms = elapsed_ms as u64, error = %e, "Unifonic network error");
                    ChannelError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ChannelError::Timeout {
                    elapsed_ms: started.elapsed().as_millis(),
                }
            } else {
                ChannelError::Network(e.to_string())
            }
        })?;

        info!(
            trace_id,
            status,
            content_type = %content_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Unifonic response"
        );

        parse_provider_response(status, &content_type, &text)
    }
}

#[async_trait]
impl OtpChannel for UnifonicChannel {
    async fn dispatch(&self, phone: &PhoneNumber) -> Result<String, ChannelError> {
        let trace_id = trace_id();
        let code = generate_code(self.code_length);
        let reference = new_reference("OTP");
        let recipient = format_recipient(phone, self.recipient_format);

        info!(
            trace_id = %trace_id,
            phone = %phone.masked(),
            reference = %reference,
            sender = %self.sender_id,
            "Sending OTP SMS"
        );

        self.send_sms(&trace_id, &recipient, &sms_body(&code)).await?;

        // Stored only once the provider accepted the message.
        self.codes
            .put(&reference, phone.as_str(), &code, self.code_ttl)
            .await?;

        info!(trace_id = %trace_id, reference = %reference, phone = %phone.masked(), "OTP SMS sent");
        Ok(reference)
    }

    async fn confirm(&self, reference: &str, code: &str) -> Result<bool, ChannelError> {
        let matched = self.codes.consume(reference, code).await?;
        info!(reference, matched, "OTP confirmation");
        Ok(matched)
    }

    fn name(&self) -> &'static str {
        "unifonic"
    }
}

// ========== Mock channel ==========

/// Network-free channel for development and tests.
pub struct MockOtpChannel {
    codes: Arc<dyn CodeStore>,
    code_ttl: Duration,
}

impl MockOtpChannel {
    pub fn new(codes: Arc<dyn CodeStore>, code_ttl: Duration) -> Self {
        Self { codes, code_ttl }
    }
}

#[async_trait]
impl OtpChannel for MockOtpChannel {
    async fn dispatch(&self, phone: &PhoneNumber) -> Result<String, ChannelError> {
        let reference = new_reference("MOCK");
        self.codes
            .put(&reference, phone.as_str(), MOCK_OTP_CODE, self.code_ttl)
            .await?;

        warn!(
            trace_id = %trace_id(),
            phone = %phone.masked(),
            reference = %reference,
            code = MOCK_OTP_CODE,
            "MOCK MODE - OTP not sent via SMS"
        );
        Ok(reference)
    }

    async fn confirm(&self, reference: &str, code: &str) -> Result<bool, ChannelError> {
        let matched = self.codes.consume(reference, code).await?;
        warn!(reference, matched, "MOCK MODE - OTP confirmation");
        Ok(matched)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ========== Helpers ==========

/// Interpret a Unifonic HTTP response.
///
/// Accepts 200/201 with a JSON body whose `success` flag is true (boolean or
/// the string "true"). Everything else becomes a `ChannelError` carrying the
/// status, content type and a bounded preview of the body.
pub fn parse_provider_response(
    status: u16,
    content_type: &str,
    body: &str,
) -> Result<(), ChannelError> {
    if status != 200 && status != 201 {
        return Err(ChannelError::HttpStatus {
            status,
            content_type: content_type.to_string(),
            preview: truncate_preview(body),
        });
    }

    let data: Value = serde_json::from_str(body).map_err(|_| ChannelError::NotJson {
        status,
        content_type: content_type.to_string(),
        preview: truncate_preview(body),
    })?;

    let success = match data.get("success") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
        _ => false,
    };

    if success {
        return Ok(());
    }

    let message = ["message", "errorMessage"]
        .iter()
        .find_map(|field| data.get(*field).and_then(Value::as_str))
        .filter(|m| !m.is_empty())
        .unwrap_or("Unknown error")
        .to_string();

    Err(ChannelError::Rejected { status, message })
}

/// International form expected by the provider.
pub fn format_recipient(phone: &PhoneNumber, format: RecipientFormat) -> String {
    let local = phone.as_str();
    let subscriber = local.strip_prefix('0').unwrap_or(local);
    match format {
        RecipientFormat::Plain => format!("966{subscriber}"),
        RecipientFormat::Plus => format!("+966{subscriber}"),
    }
}

fn sms_body(code: &str) -> String {
    format!("رمز التحقق الخاص بك: {code}\nلودور فيلا - Lodore Villa")
}

fn generate_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// `PREFIX-` followed by 12 uppercase hex characters.
fn new_reference(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{prefix}-{}", &hex[..12])
}

fn trace_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

fn truncate_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}
