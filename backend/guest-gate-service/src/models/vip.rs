use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Pre-approved guest phone. Rows come from the import/admin tooling; the
/// gate only reads them and the booking webhook only touches the booking fields.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VipPhone {
    pub id: i64,
    pub phone: String,
    pub full_name: String,
    pub email: String,
    pub booked: bool,
    pub bookings_count: i32,
    pub created_at: DateTime<Utc>,
}

impl VipPhone {
    pub fn is_eligible(&self) -> bool {
        !self.booked
    }
}

/// Result of applying a booking event to the directory
#[derive(Debug, Clone)]
pub enum BookingChange {
    Applied(VipPhone),
    AlreadyBooked,
    UnknownPhone,
}
