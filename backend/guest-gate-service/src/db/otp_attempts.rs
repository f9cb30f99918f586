/// OTP attempt database operations
use super::OtpAttemptRepository;
use crate::error::Result;
use crate::models::{NewOtpAttempt, OtpAttempt, OtpStatus};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

const ATTEMPT_COLUMNS: &str =
    "id, phone, reference_id, status, attempts_count, created_at, expires_at, last_sent_at";

#[derive(Clone)]
pub struct PgOtpAttemptRepository {
    pool: PgPool,
}

impl PgOtpAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpAttemptRepository for PgOtpAttemptRepository {
    async fn get(&self, id: Uuid) -> Result<Option<OtpAttempt>> {
        let attempt = sqlx::query_as::<_, OtpAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM otp_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn latest_pending(&self, phone: &str) -> Result<Option<OtpAttempt>> {
        let attempt = sqlx::query_as::<_, OtpAttempt>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS} FROM otp_attempts
            WHERE phone = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn find_by_reference(
        &self,
        phone: &str,
        reference_id: &str,
    ) -> Result<Option<OtpAttempt>> {
        let attempt = sqlx::query_as::<_, OtpAttempt>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS} FROM otp_attempts
            WHERE phone = $1 AND reference_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(phone)
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(attempt)
    }

    async fn issue(&self, new_attempt: NewOtpAttempt) -> Result<OtpAttempt> {
        let attempt = new_attempt.into_attempt(Utc::now());
        let mut tx = self.pool.begin().await?;

        // Serializes issuers for the same phone until commit; the partial unique
        // index on pending rows backs this up.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&attempt.phone)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE otp_attempts SET status = 'expired' WHERE phone = $1 AND status = 'pending'",
        )
        .bind(&attempt.phone)
        .execute(&mut *tx)
        .await?;

        let stored = sqlx::query_as::<_, OtpAttempt>(&format!(
            r#"
            INSERT INTO otp_attempts (
                id, phone, reference_id, status, attempts_count,
                created_at, expires_at, last_sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(attempt.id)
        .bind(&attempt.phone)
        .bind(&attempt.reference_id)
        .bind(attempt.status)
        .bind(attempt.attempts_count)
        .bind(attempt.created_at)
        .bind(attempt.expires_at)
        .bind(attempt.last_sent_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(stored)
    }

    async fn transition(&self, id: Uuid, status: OtpStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE otp_attempts SET status = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reserve_attempt(&self, id: Uuid, max_attempts: i32) -> Result<Option<i32>> {
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE otp_attempts
            SET attempts_count = attempts_count + 1
            WHERE id = $1 AND status = 'pending' AND attempts_count < $2
            RETURNING attempts_count
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }

    async fn release_attempt(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE otp_attempts
            SET attempts_count = attempts_count - 1
            WHERE id = $1 AND status = 'pending' AND attempts_count > 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE otp_attempts
            SET status = 'verified', attempts_count = GREATEST(attempts_count - 1, 0)
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
