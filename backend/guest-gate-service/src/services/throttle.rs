/// Per-phone fixed-window request throttles backed by Redis.
///
/// Counters live in Redis so every worker process shares them. Keys are built
/// from the canonical phone, never from raw input.
use crate::error::Result;
use crate::phone::PhoneNumber;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::Script;
use redis_utils::RedisPool;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const REDIS_THROTTLE_PREFIX: &str = "otp_throttle:";

// INCR and EXPIRE must not be split, otherwise a crash in between leaves a
// counter that never resets.
static HIT_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
        local current = redis.call('INCR', KEYS[1])
        if current == 1 then
            redis.call('EXPIRE', KEYS[1], ARGV[1])
        end
        local ttl = redis.call('TTL', KEYS[1])
        if ttl < 0 then
            redis.call('EXPIRE', KEYS[1], ARGV[1])
            ttl = tonumber(ARGV[1])
        end
        return {current, ttl}
        "#,
    )
});

/// `max_requests` per `window_seconds`, written `N/SECONDS` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRule {
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl ThrottleRule {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }
}

impl FromStr for ThrottleRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (count, window) = s
            .split_once('/')
            .ok_or_else(|| format!("expected N/SECONDS, got '{s}'"))?;

        let max_requests: u32 = count
            .trim()
            .parse()
            .map_err(|_| format!("invalid request count in '{s}'"))?;
        let window_seconds: u64 = window
            .trim()
            .parse()
            .map_err(|_| format!("invalid window in '{s}'"))?;

        if max_requests == 0 || window_seconds == 0 {
            return Err(format!("request count and window must be positive in '{s}'"));
        }

        Ok(Self::new(max_requests, window_seconds))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleScope {
    RequestOtp,
    VerifyOtp,
}

impl ThrottleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleScope::RequestOtp => "request_otp",
            ThrottleScope::VerifyOtp => "verify_otp",
        }
    }
}

impl fmt::Display for ThrottleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

impl ThrottleDecision {
    /// Decision for the `count`-th hit inside a window with `ttl_secs` left.
    pub fn for_count(count: u64, ttl_secs: u64, rule: ThrottleRule) -> Self {
        if count > u64::from(rule.max_requests) {
            ThrottleDecision::Limited {
                retry_after_secs: ttl_secs.max(1),
            }
        } else {
            ThrottleDecision::Allowed
        }
    }
}

#[async_trait]
pub trait RequestThrottle: Send + Sync {
    /// Count one request and report whether it is within `rule`.
    async fn hit(
        &self,
        scope: ThrottleScope,
        phone: &PhoneNumber,
        rule: ThrottleRule,
    ) -> Result<ThrottleDecision>;
}

#[derive(Clone)]
pub struct RedisThrottle {
    redis: RedisPool,
}

impl RedisThrottle {
    pub fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn key(scope: ThrottleScope, phone: &PhoneNumber) -> String {
        format!("{REDIS_THROTTLE_PREFIX}{}:{}", scope.as_str(), phone.as_str())
    }
}

#[async_trait]
impl RequestThrottle for RedisThrottle {
    async fn hit(
        &self,
        scope: ThrottleScope,
        phone: &PhoneNumber,
        rule: ThrottleRule,
    ) -> Result<ThrottleDecision> {
        let key = Self::key(scope, phone);
        let mut conn = self.redis.connection().await;

        let mut invocation = HIT_SCRIPT.key(&key);
        invocation.arg(rule.window_seconds);

        let (count, ttl): (i64, i64) = self.redis.run(invocation.invoke_async(&mut conn)).await?;

        let decision =
            ThrottleDecision::for_count(count.max(0) as u64, ttl.max(0) as u64, rule);

        if let ThrottleDecision::Limited { retry_after_secs } = decision {
            warn!(
                scope = %scope,
                phone = %phone.masked(),
                count,
                retry_after_secs,
                "Rate limit exceeded for phone"
            );
        }

        Ok(decision)
    }
}
