/// Persistence seams for the guest gate
///
/// The state machine and the booking webhook only see these traits; the
/// Postgres implementations live next to them and tests substitute in-memory
/// doubles.
pub mod otp_attempts;
pub mod vip_phones;

use crate::error::Result;
use crate::models::{BookingChange, NewOtpAttempt, OtpAttempt, OtpStatus, VipPhone};
use async_trait::async_trait;
use uuid::Uuid;

pub use otp_attempts::PgOtpAttemptRepository;
pub use vip_phones::PgVipDirectory;

/// Read access to the VIP list plus the booking counters the webhook maintains.
#[async_trait]
pub trait VipDirectory: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<VipPhone>>;

    /// Mark a confirmed booking: `booked = true`, `bookings_count + 1`.
    /// Rejected when the guest is already booked.
    async fn record_booking(&self, phone: &str) -> Result<BookingChange>;

    /// Undo one booking: counter decremented with a floor of zero, `booked`
    /// cleared once the counter reaches zero.
    async fn release_booking(&self, phone: &str) -> Result<BookingChange>;
}

/// Durable OTP attempt records.
///
/// Status changes only ever move a `pending` row forward; every mutating call
/// is conditional on the row still being pending.
#[async_trait]
pub trait OtpAttemptRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<OtpAttempt>>;

    /// Most recent pending attempt for the phone.
    async fn latest_pending(&self, phone: &str) -> Result<Option<OtpAttempt>>;

    /// Attempt issued to `phone` under `reference_id`, whatever its status.
    async fn find_by_reference(&self, phone: &str, reference_id: &str)
        -> Result<Option<OtpAttempt>>;

    /// Atomically expire every pending attempt for the phone and insert the new
    /// pending one. Concurrent calls for the same phone leave exactly one pending row.
    async fn issue(&self, attempt: NewOtpAttempt) -> Result<OtpAttempt>;

    /// Move a pending attempt to `status`. Returns false when the row was no
    /// longer pending.
    async fn transition(&self, id: Uuid, status: OtpStatus) -> Result<bool>;

    /// Claim one guess from the budget of a pending attempt before the code is
    /// checked, returning the new count. `None` when the row is no longer
    /// pending or already holds `max_attempts` guesses; concurrent callers can
    /// never push the counter past `max_attempts`.
    async fn reserve_attempt(&self, id: Uuid, max_attempts: i32) -> Result<Option<i32>>;

    /// Hand back a guess claimed by `reserve_attempt` that was never checked.
    async fn release_attempt(&self, id: Uuid) -> Result<()>;

    /// Move a pending attempt to `verified`, returning the claimed guess in the
    /// same write so a correct code does not count against the budget.
    async fn mark_verified(&self, id: Uuid) -> Result<bool>;
}
