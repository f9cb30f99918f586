//! In-memory doubles for the store, channel and throttle seams.
#![allow(dead_code)]

pub mod containers;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use crypto_core::jwt::{JwtSigner, TokenLifetimes};
use guest_gate_service::db::{OtpAttemptRepository, VipDirectory};
use guest_gate_service::http::HttpServerState;
use guest_gate_service::models::{BookingChange, NewOtpAttempt, OtpAttempt, OtpStatus, VipPhone};
use guest_gate_service::phone::PhoneNumber;
use guest_gate_service::services::{
    BookingStatusUpdater, ChannelError, CodeStore, DirectoryGate, MockOtpChannel, OtpChannel,
    OtpPolicy, OtpService, RequestThrottle, SessionIssuer, ThrottleDecision, ThrottleRule,
    ThrottleScope, WebhookAuthenticator,
};
use guest_gate_service::config::WebhookSettings;
use guest_gate_service::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &[u8] = b"integration-test-secret";
pub const TEST_WEBHOOK_SECRET: &str = "webhook-test-secret";

// ========== VIP directory ==========

#[derive(Default)]
pub struct InMemoryDirectory {
    rows: Mutex<HashMap<String, VipPhone>>,
}

impl InMemoryDirectory {
    pub fn with_vip(self, phone: &str, booked: bool) -> Self {
        {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.len() as i64 + 1;
            rows.insert(
                phone.to_string(),
                VipPhone {
                    id,
                    phone: phone.to_string(),
                    full_name: format!("Guest {id}"),
                    email: format!("guest{id}@example.com"),
                    booked,
                    bookings_count: i32::from(booked),
                    created_at: Utc::now(),
                },
            );
        }
        self
    }

    pub fn get(&self, phone: &str) -> Option<VipPhone> {
        self.rows.lock().unwrap().get(phone).cloned()
    }
}

#[async_trait]
impl VipDirectory for InMemoryDirectory {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<VipPhone>> {
        Ok(self.get(phone))
    }

    async fn record_booking(&self, phone: &str) -> Result<BookingChange> {
        let mut rows = self.rows.lock().unwrap();
        let Some(vip) = rows.get_mut(phone) else {
            return Ok(BookingChange::UnknownPhone);
        };
        if vip.booked {
            return Ok(BookingChange::AlreadyBooked);
        }
        vip.booked = true;
        vip.bookings_count += 1;
        Ok(BookingChange::Applied(vip.clone()))
    }

    async fn release_booking(&self, phone: &str) -> Result<BookingChange> {
        let mut rows = self.rows.lock().unwrap();
        let Some(vip) = rows.get_mut(phone) else {
            return Ok(BookingChange::UnknownPhone);
        };
        vip.bookings_count = (vip.bookings_count - 1).max(0);
        vip.booked = vip.bookings_count > 0;
        Ok(BookingChange::Applied(vip.clone()))
    }
}

// ========== OTP attempts ==========

#[derive(Default)]
pub struct InMemoryAttempts {
    rows: Mutex<Vec<OtpAttempt>>,
}

impl InMemoryAttempts {
    /// Shift every timestamp of the phone's attempts into the past.
    pub fn rewind(&self, phone: &str, by: Duration) {
        for row in self.rows.lock().unwrap().iter_mut() {
            if row.phone == phone {
                row.created_at = row.created_at - by;
                row.expires_at = row.expires_at - by;
                row.last_sent_at = row.last_sent_at - by;
            }
        }
    }

    pub fn all_for(&self, phone: &str) -> Vec<OtpAttempt> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.phone == phone)
            .cloned()
            .collect()
    }

    pub fn by_reference(&self, reference_id: &str) -> Option<OtpAttempt> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.reference_id == reference_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl OtpAttemptRepository for InMemoryAttempts {
    async fn get(&self, id: Uuid) -> Result<Option<OtpAttempt>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == id)
            .cloned())
    }

    async fn latest_pending(&self, phone: &str) -> Result<Option<OtpAttempt>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.phone == phone && row.status == OtpStatus::Pending)
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    async fn find_by_reference(
        &self,
        phone: &str,
        reference_id: &str,
    ) -> Result<Option<OtpAttempt>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.phone == phone && row.reference_id == reference_id)
            .max_by_key(|row| row.created_at)
            .cloned())
    }

    async fn issue(&self, attempt: NewOtpAttempt) -> Result<OtpAttempt> {
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut() {
            if row.phone == attempt.phone && row.status == OtpStatus::Pending {
                row.status = OtpStatus::Expired;
            }
        }
        let created = attempt.into_attempt(Utc::now());
        rows.push(created.clone());
        Ok(created)
    }

    async fn transition(&self, id: Uuid, status: OtpStatus) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|row| row.id == id && row.status == OtpStatus::Pending)
        {
            Some(row) => {
                row.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reserve_attempt(&self, id: Uuid, max_attempts: i32) -> Result<Option<i32>> {
        let mut rows = self.rows.lock().unwrap();
        Ok(rows
            .iter_mut()
            .find(|row| {
                row.id == id && row.status == OtpStatus::Pending && row.attempts_count < max_attempts
            })
            .map(|row| {
                row.attempts_count += 1;
                row.attempts_count
            }))
    }

    async fn release_attempt(&self, id: Uuid) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.id == id && row.status == OtpStatus::Pending && row.attempts_count > 0)
        {
            row.attempts_count -= 1;
        }
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|row| row.id == id && row.status == OtpStatus::Pending)
        {
            Some(row) => {
                row.status = OtpStatus::Verified;
                row.attempts_count = (row.attempts_count - 1).max(0);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ========== Code store ==========

#[derive(Default)]
pub struct InMemoryCodeStore {
    entries: Mutex<HashMap<String, (String, String)>>,
}

impl InMemoryCodeStore {
    pub fn code_for(&self, reference: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(reference)
            .map(|(_, code)| code.clone())
    }

    pub fn phone_for(&self, reference: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(reference)
            .map(|(phone, _)| phone.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn put(
        &self,
        reference: &str,
        phone: &str,
        code: &str,
        _ttl: std::time::Duration,
    ) -> std::result::Result<(), ChannelError> {
        self.entries.lock().unwrap().insert(
            reference.to_string(),
            (phone.to_string(), code.to_string()),
        );
        Ok(())
    }

    async fn consume(&self, reference: &str, code: &str) -> std::result::Result<bool, ChannelError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(reference) {
            Some((_, stored)) if stored == code => {
                entries.remove(reference);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ========== Throttle ==========

/// Fixed-window counters kept in process; windows never roll over in tests.
#[derive(Default)]
pub struct InMemoryThrottle {
    counters: Mutex<HashMap<(ThrottleScope, String), u64>>,
}

impl InMemoryThrottle {
    pub fn reset(&self) {
        self.counters.lock().unwrap().clear();
    }
}

#[async_trait]
impl RequestThrottle for InMemoryThrottle {
    async fn hit(
        &self,
        scope: ThrottleScope,
        phone: &PhoneNumber,
        rule: ThrottleRule,
    ) -> Result<ThrottleDecision> {
        let mut counters = self.counters.lock().unwrap();
        let count = counters
            .entry((scope, phone.as_str().to_string()))
            .or_insert(0);
        *count += 1;
        Ok(ThrottleDecision::for_count(*count, rule.window_seconds, rule))
    }
}

// ========== Channels ==========

/// Provider that is always down. Counts how often it was called.
#[derive(Default)]
pub struct FailingChannel {
    pub dispatches: AtomicUsize,
}

#[async_trait]
impl OtpChannel for FailingChannel {
    async fn dispatch(&self, _phone: &PhoneNumber) -> std::result::Result<String, ChannelError> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        Err(ChannelError::Timeout { elapsed_ms: 15_000 })
    }

    async fn confirm(&self, _reference: &str, _code: &str) -> std::result::Result<bool, ChannelError> {
        Err(ChannelError::Network("connection refused".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Mock channel whose `confirm` yields before answering, the way a Redis round
/// trip would. Counts how many codes reached it.
pub struct YieldingChannel {
    inner: MockOtpChannel,
    pub confirms: AtomicUsize,
}

impl YieldingChannel {
    pub fn new(codes: Arc<dyn CodeStore>) -> Self {
        Self {
            inner: MockOtpChannel::new(codes, std::time::Duration::from_secs(600)),
            confirms: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OtpChannel for YieldingChannel {
    async fn dispatch(&self, phone: &PhoneNumber) -> std::result::Result<String, ChannelError> {
        self.inner.dispatch(phone).await
    }

    async fn confirm(&self, reference: &str, code: &str) -> std::result::Result<bool, ChannelError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.confirm(reference, code).await
    }

    fn name(&self) -> &'static str {
        "yielding"
    }
}

// ========== Harness ==========

pub struct TestGate {
    pub otp: OtpService,
    pub sessions: SessionIssuer,
    pub directory: Arc<InMemoryDirectory>,
    pub attempts: Arc<InMemoryAttempts>,
    pub codes: Arc<InMemoryCodeStore>,
    pub throttle: Arc<InMemoryThrottle>,
}

pub fn sessions() -> SessionIssuer {
    SessionIssuer::new(
        JwtSigner::hs256(TEST_JWT_SECRET, "guest-gate", TokenLifetimes::default())
            .expect("test signer"),
    )
}

/// Permissive throttles so flow tests are never cut short by them.
pub fn relaxed_policy() -> OtpPolicy {
    OtpPolicy {
        request_limit: ThrottleRule::new(1_000, 600),
        verify_limit: ThrottleRule::new(1_000, 600),
        ..OtpPolicy::default()
    }
}

impl TestGate {
    pub fn new(directory: InMemoryDirectory) -> Self {
        Self::with_policy(directory, relaxed_policy())
    }

    pub fn with_policy(directory: InMemoryDirectory, policy: OtpPolicy) -> Self {
        let codes = Arc::new(InMemoryCodeStore::default());
        let channel = Arc::new(MockOtpChannel::new(
            codes.clone(),
            std::time::Duration::from_secs(600),
        ));
        Self::assemble(directory, policy, codes, channel)
    }

    pub fn with_channel(directory: InMemoryDirectory, channel: Arc<dyn OtpChannel>) -> Self {
        let codes = Arc::new(InMemoryCodeStore::default());
        Self::assemble(directory, relaxed_policy(), codes, channel)
    }

    fn assemble(
        directory: InMemoryDirectory,
        policy: OtpPolicy,
        codes: Arc<InMemoryCodeStore>,
        channel: Arc<dyn OtpChannel>,
    ) -> Self {
        let directory = Arc::new(directory);
        let attempts = Arc::new(InMemoryAttempts::default());
        let throttle = Arc::new(InMemoryThrottle::default());
        let sessions = sessions();

        let otp = OtpService::new(
            DirectoryGate::new(directory.clone()),
            attempts.clone(),
            channel,
            throttle.clone(),
            sessions.clone(),
            policy,
        );

        Self {
            otp,
            sessions,
            directory,
            attempts,
            codes,
            throttle,
        }
    }

    pub fn http_state(&self) -> HttpServerState {
        HttpServerState {
            otp: self.otp.clone(),
            sessions: self.sessions.clone(),
            booking: BookingStatusUpdater::new(self.directory.clone()),
            webhook_auth: WebhookAuthenticator::from_settings(&WebhookSettings {
                shared_secret: Some(TEST_WEBHOOK_SECRET.to_string()),
                signing_key: None,
                allow_unauthenticated: false,
            }),
        }
    }
}
