/// Data models for the guest gate
pub mod otp_attempt;
pub mod vip;

pub use otp_attempt::{NewOtpAttempt, OtpAttempt, OtpStatus};
pub use vip::{BookingChange, VipPhone};
