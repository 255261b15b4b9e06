use anyhow::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::{NotificationRecord, NotificationStatus, TargetRule};
use crate::domain::token::{DeviceInfo, Platform, PushToken, TokenStats};

/// Persistence seam for the token registry. A token string is unique across
/// the whole store; every mutation touches at most one row and must be atomic
/// so that concurrent dispatches reporting on the same token cannot lose
/// counter updates.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn find_by_token(&self, token: &str) -> Result<Option<PushToken>>;

    async fn create(&self, record: &PushToken) -> Result<()>;

    /// Re-registration of an existing token string: moves ownership to
    /// `recipient_id` (a device can change accounts), refreshes metadata,
    /// reactivates and clears the failure state.
    async fn refresh_registration(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        platform: Platform,
        device_info: &DeviceInfo,
        now: OffsetDateTime,
    ) -> Result<()>;

    /// Active tokens for one recipient, newest-first by last_used.
    async fn list_active(&self, recipient_id: Uuid) -> Result<Vec<PushToken>>;

    /// Marks the (recipient, token) pair inactive. Returns false if the pair
    /// does not exist.
    async fn deactivate_pair(&self, recipient_id: Uuid, token: &str) -> Result<bool>;

    /// Delivery succeeded: failure counter back to 0, active, last_used
    /// touched. Returns false for an unknown token.
    async fn record_success(&self, token: &str, now: OffsetDateTime) -> Result<bool>;

    /// Delivery failed: increments the counter and stamps last_failure;
    /// deactivates when the counter reaches `threshold`, or immediately when
    /// `force_deactivate` is set (invalid-token signal from the gateway).
    async fn record_failure(
        &self,
        token: &str,
        now: OffsetDateTime,
        threshold: i32,
        force_deactivate: bool,
    ) -> Result<bool>;

    /// Deactivates every active token at or past the failure threshold.
    /// Returns the number of tokens affected; a second run with no
    /// intervening failures affects none.
    async fn sweep_invalid(&self, threshold: i32) -> Result<u64>;

    async fn stats(&self) -> Result<TokenStats>;
}

/// Persistence for notification records. The record is created before the
/// gateway is called and finalized exactly once with the outcome.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, record: &NotificationRecord) -> Result<()>;

    async fn finalize(
        &self,
        id: Uuid,
        status: NotificationStatus,
        delivered_count: i32,
        sent_at: Option<OffsetDateTime>,
    ) -> Result<bool>;

    /// Most recent records first.
    async fn list(&self, limit: i64) -> Result<Vec<NotificationRecord>>;

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// External recipient directory. Herald does not own recipient records; it
/// only asks which ones exist and which are eligible to be notified
/// (approved and push-enabled).
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn recipient_exists(&self, id: Uuid) -> Result<bool>;

    /// Recipient ids matching the targeting rule, already filtered by the
    /// eligibility predicate.
    async fn find_eligible(&self, rule: &TargetRule) -> Result<Vec<Uuid>>;
}
