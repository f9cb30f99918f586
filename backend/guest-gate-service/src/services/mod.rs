/// Service layer for the guest gate
///
/// - Directory gate (VIP eligibility at send time)
/// - OTP channels (Unifonic SMS and the deterministic mock) over a shared code store
/// - Per-phone request throttles (Redis fixed windows)
/// - Session issuer (phone-subject JWT pairs)
/// - OTP state machine tying the above together
/// - Booking status updater driven by the scheduling webhook
pub mod booking;
pub mod code_store;
pub mod directory;
pub mod otp;
pub mod otp_channel;
pub mod session;
pub mod throttle;

pub use booking::{BookingEvent, BookingOutcome, BookingStatusUpdater, WebhookAuthenticator};
pub use code_store::{CodeStore, RedisCodeStore};
pub use directory::DirectoryGate;
pub use otp::{OtpPolicy, OtpRequested, OtpService, OtpVerified};
pub use otp_channel::{
    build_channel, ChannelError, MockOtpChannel, OtpChannel, UnifonicChannel, MOCK_OTP_CODE,
};
pub use session::SessionIssuer;
pub use throttle::{RedisThrottle, RequestThrottle, ThrottleDecision, ThrottleRule, ThrottleScope};
