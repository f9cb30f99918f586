use crate::db::VipDirectory;
use crate::error::Result;
use crate::phone::PhoneNumber;
use std::sync::Arc;
use tracing::debug;

/// Answers whether a phone may start a login.
///
/// Consulted only when an OTP is requested. Verification relies on the attempt
/// record alone, so a guest who books between send and verify still completes login.
#[derive(Clone)]
pub struct DirectoryGate {
    directory: Arc<dyn VipDirectory>,
}

impl DirectoryGate {
    pub fn new(directory: Arc<dyn VipDirectory>) -> Self {
        Self { directory }
    }

    /// True iff the phone is on the VIP list and not already booked.
    pub async fn is_eligible(&self, phone: &PhoneNumber) -> Result<bool> {
        let eligible = self
            .directory
            .find_by_phone(phone.as_str())
            .await?
            .is_some_and(|vip| vip.is_eligible());

        debug!(phone = %phone.masked(), eligible, "Directory lookup");
        Ok(eligible)
    }
}
