use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::error::SendError;
use crate::domain::token::{DeviceInfo, Platform, PushToken, TokenStats};
use crate::infra::store::{RecipientDirectory, TokenStore};

/// Single source of truth for which tokens are eligible for delivery to
/// which recipient. Other components go through this service; nothing else
/// writes token state.
#[derive(Clone)]
pub struct TokenRegistry {
    store: Arc<dyn TokenStore>,
    directory: Arc<dyn RecipientDirectory>,
    failure_threshold: i32,
}

impl TokenRegistry {
    pub fn new(
        store: Arc<dyn TokenStore>,
        directory: Arc<dyn RecipientDirectory>,
        failure_threshold: i32,
    ) -> Self {
        Self {
            store,
            directory,
            failure_threshold,
        }
    }

    /// Upserts a token registration. Re-registering a known token string
    /// refreshes its metadata and clears its failure state; if the string was
    /// owned by a different recipient, ownership moves (the device changed
    /// accounts). A new token is created active alongside the recipient's
    /// other tokens — registration is additive, multi-device.
    pub async fn register(
        &self,
        recipient_id: Uuid,
        token: &str,
        platform: Platform,
        device_info: DeviceInfo,
    ) -> Result<PushToken, SendError> {
        if token.trim().is_empty() {
            return Err(SendError::validation("token is required"));
        }
        if recipient_id.is_nil() {
            return Err(SendError::validation("recipient_id is required"));
        }

        if !self.directory.recipient_exists(recipient_id).await? {
            return Err(SendError::not_found("recipient not found"));
        }

        let now = OffsetDateTime::now_utc();

        if let Some(existing) = self.store.find_by_token(token).await? {
            self.store
                .refresh_registration(existing.id, recipient_id, platform, &device_info, now)
                .await?;
            tracing::info!(token_id = %existing.id, %recipient_id, "refreshed token registration");
            return Ok(PushToken {
                recipient_id,
                platform,
                device_info,
                is_active: true,
                last_used: now,
                failure_count: 0,
                last_failure: None,
                ..existing
            });
        }

        let record = PushToken {
            id: Uuid::new_v4(),
            recipient_id,
            token: token.to_string(),
            platform,
            device_info,
            is_active: true,
            last_used: now,
            failure_count: 0,
            last_failure: None,
            created_at: now,
        };
        self.store.create(&record).await?;
        tracing::info!(token_id = %record.id, %recipient_id, platform = platform.as_str(), "registered new token");

        Ok(record)
    }

    /// Active tokens for one recipient, newest-first by last_used.
    pub async fn list_active(&self, recipient_id: Uuid) -> Result<Vec<PushToken>, SendError> {
        Ok(self.store.list_active(recipient_id).await?)
    }

    /// Marks a specific (recipient, token) pair inactive, e.g. on logout.
    pub async fn deactivate(&self, recipient_id: Uuid, token: &str) -> Result<(), SendError> {
        if token.trim().is_empty() {
            return Err(SendError::validation("token is required"));
        }

        if !self.store.deactivate_pair(recipient_id, token).await? {
            return Err(SendError::not_found("token not found"));
        }
        tracing::info!(%recipient_id, "deactivated token");

        Ok(())
    }

    /// Delivery succeeded for this token: counter reset, reactivated,
    /// last_used touched.
    pub async fn record_success(&self, token: &str) -> Result<(), SendError> {
        self.store
            .record_success(token, OffsetDateTime::now_utc())
            .await?;
        Ok(())
    }

    /// Delivery failed for this token. Deactivates at the configured
    /// threshold, or immediately when `force_deactivate` is set.
    pub async fn record_failure(
        &self,
        token: &str,
        force_deactivate: bool,
    ) -> Result<(), SendError> {
        self.store
            .record_failure(
                token,
                OffsetDateTime::now_utc(),
                self.failure_threshold,
                force_deactivate,
            )
            .await?;
        Ok(())
    }

    /// Deactivates every active token at or past the failure threshold.
    /// Idempotent; returns the number of tokens affected.
    pub async fn sweep_invalid(&self) -> Result<u64, SendError> {
        let affected = self.store.sweep_invalid(self.failure_threshold).await?;
        if affected > 0 {
            tracing::info!(affected, "swept invalid tokens");
        }
        Ok(affected)
    }

    pub async fn stats(&self) -> Result<TokenStats, SendError> {
        Ok(self.store.stats().await?)
    }
}
