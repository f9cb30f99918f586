/// Reference -> (phone, code) associations held by the OTP channels.
///
/// Lives in Redis so every worker sees the same state. The association has
/// its own TTL, independent of the attempt record's expiry, and is deleted the
/// moment a matching code is presented.
use super::otp_channel::ChannelError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::Script;
use redis_utils::RedisPool;
use std::time::Duration;
use tracing::error;

const REDIS_CODE_PREFIX: &str = "otp_code:";

// Compare and delete in one step so only one caller can ever see a match.
static CONSUME_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local stored = redis.call('HGET', KEYS[1], 'code')
        if not stored then
            return 0
        end
        if stored == ARGV[1] then
            redis.call('DEL', KEYS[1])
            return 1
        end
        return 0
        "#,
    )
});

#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn put(
        &self,
        reference: &str,
        phone: &str,
        code: &str,
        ttl: Duration,
    ) -> Result<(), ChannelError>;

    /// True exactly once per stored code; wrong codes leave the entry in place.
    async fn consume(&self, reference: &str, code: &str) -> Result<bool, ChannelError>;
}

#[derive(Clone)]
pub struct RedisCodeStore {
    redis: RedisPool,
}

impl RedisCodeStore {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn key(reference: &str) -> String {
        format!("{REDIS_CODE_PREFIX}{reference}")
    }
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn put(
        &self,
        reference: &str,
        phone: &str,
        code: &str,
        ttl: Duration,
    ) -> Result<(), ChannelError> {
        let key = Self::key(reference);
        let mut conn = self.redis.connection().await;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(&key)
            .arg("phone")
            .arg(phone)
            .arg("code")
            .arg(code)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl.as_secs().max(1))
            .ignore();

        self.redis
            .run(pipe.query_async::<_, ()>(&mut conn))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to store OTP code in Redis");
                ChannelError::Store(e.to_string())
            })
    }

    async fn consume(&self, reference: &str, code: &str) -> Result<bool, ChannelError> {
        let key = Self::key(reference);
        let mut conn = self.redis.connection().await;

        let mut invocation = CONSUME_SCRIPT.key(&key);
        invocation.arg(code);

        let matched: i32 = self
            .redis
            .run(invocation.invoke_async(&mut conn))
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to check OTP code in Redis");
                ChannelError::Store(e.to_string())
            })?;

        Ok(matched == 1)
    }
}
