/// VIP directory database operations
use super::VipDirectory;
use crate::error::Result;
use crate::models::{BookingChange, VipPhone};
use async_trait::async_trait;
use sqlx::PgPool;

const VIP_COLUMNS: &str = "id, phone, full_name, email, booked, bookings_count, created_at";

#[derive(Clone)]
pub struct PgVipDirectory {
    pool: PgPool,
}

impl PgVipDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VipDirectory for PgVipDirectory {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<VipPhone>> {
        let vip = sqlx::query_as::<_, VipPhone>(&format!(
            "SELECT {VIP_COLUMNS} FROM vip_phones WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vip)
    }

    async fn record_booking(&self, phone: &str) -> Result<BookingChange> {
        let updated = sqlx::query_as::<_, VipPhone>(&format!(
            r#"
            UPDATE vip_phones
            SET booked = TRUE, bookings_count = bookings_count + 1
            WHERE phone = $1 AND booked = FALSE
            RETURNING {VIP_COLUMNS}
            "#
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(vip) = updated {
            return Ok(BookingChange::Applied(vip));
        }

        // Nothing updated: either the guest is already booked or unknown.
        match self.find_by_phone(phone).await? {
            Some(_) => Ok(BookingChange::AlreadyBooked),
            None => Ok(BookingChange::UnknownPhone),
        }
    }

    async fn release_booking(&self, phone: &str) -> Result<BookingChange> {
        // Both SET expressions read the pre-update bookings_count.
        let updated = sqlx::query_as::<_, VipPhone>(&format!(
            r#"
            UPDATE vip_phones
            SET bookings_count = GREATEST(bookings_count - 1, 0),
                booked = GREATEST(bookings_count - 1, 0) > 0
            WHERE phone = $1
            RETURNING {VIP_COLUMNS}
            "#
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match updated {
            Some(vip) => BookingChange::Applied(vip),
            None => BookingChange::UnknownPhone,
        })
    }
}
