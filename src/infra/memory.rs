//! In-memory store implementations. Behavior mirrors the Postgres stores;
//! the integration tests run against these so no database is required.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::notification::{
    NotificationRecord, NotificationStatus, RecipientAttribute, TargetRule,
};
use crate::domain::token::{DeviceInfo, Platform, PushToken, TokenStats};
use crate::infra::store::{RecipientDirectory, RecordStore, TokenStore};

/// Token registry keyed by token string. Mutations run under the write
/// guard, so each read-modify-write is atomic per call.
#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<RwLock<HashMap<String, PushToken>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read-back for assertions in tests.
    pub async fn get(&self, token: &str) -> Option<PushToken> {
        self.tokens.read().await.get(token).cloned()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PushToken>> {
        Ok(self.tokens.read().await.get(token).cloned())
    }

    async fn create(&self, record: &PushToken) -> Result<()> {
        self.tokens
            .write()
            .await
            .insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn refresh_registration(
        &self,
        id: Uuid,
        recipient_id: Uuid,
        platform: Platform,
        device_info: &DeviceInfo,
        now: OffsetDateTime,
    ) -> Result<()> {
        let mut tokens = self.tokens.write().await;
        if let Some(record) = tokens.values_mut().find(|record| record.id == id) {
            record.recipient_id = recipient_id;
            record.platform = platform;
            record.device_info = device_info.clone();
            record.is_active = true;
            record.last_used = now;
            record.failure_count = 0;
            record.last_failure = None;
        }
        Ok(())
    }

    async fn list_active(&self, recipient_id: Uuid) -> Result<Vec<PushToken>> {
        let tokens = self.tokens.read().await;
        let mut active: Vec<PushToken> = tokens
            .values()
            .filter(|record| record.recipient_id == recipient_id && record.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(active)
    }

    async fn deactivate_pair(&self, recipient_id: Uuid, token: &str) -> Result<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(token) {
            Some(record) if record.recipient_id == recipient_id => {
                record.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_success(&self, token: &str, now: OffsetDateTime) -> Result<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(token) {
            Some(record) => {
                record.failure_count = 0;
                record.last_failure = None;
                record.is_active = true;
                record.last_used = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failure(
        &self,
        token: &str,
        now: OffsetDateTime,
        threshold: i32,
        force_deactivate: bool,
    ) -> Result<bool> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(token) {
            Some(record) => {
                record.failure_count += 1;
                record.last_failure = Some(now);
                if force_deactivate || record.failure_count >= threshold {
                    record.is_active = false;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn sweep_invalid(&self, threshold: i32) -> Result<u64> {
        let mut tokens = self.tokens.write().await;
        let mut affected = 0;
        for record in tokens.values_mut() {
            if record.is_active && record.failure_count >= threshold {
                record.is_active = false;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn stats(&self) -> Result<TokenStats> {
        let tokens = self.tokens.read().await;
        let total = tokens.len() as i64;
        let active = tokens.values().filter(|record| record.is_active).count() as i64;
        let mut by_platform: HashMap<&'static str, (Platform, i64)> = HashMap::new();
        for record in tokens.values().filter(|record| record.is_active) {
            by_platform
                .entry(record.platform.as_str())
                .or_insert((record.platform, 0))
                .1 += 1;
        }
        let mut active_by_platform: Vec<(Platform, i64)> =
            by_platform.into_values().collect();
        active_by_platform.sort_by_key(|(platform, _)| platform.as_str());

        Ok(TokenStats {
            total,
            active,
            inactive: total - active,
            active_by_platform,
        })
    }
}

/// Records kept in insertion order for newest-first listing.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<Vec<NotificationRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: &NotificationRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: NotificationStatus,
        delivered_count: i32,
        sent_at: Option<OffsetDateTime>,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|record| {
            record.id == id
                && matches!(
                    record.status,
                    NotificationStatus::Draft | NotificationStatus::Scheduled
                )
        }) {
            Some(record) => {
                record.status = status;
                record.delivered_count = delivered_count;
                record.sent_at = sent_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self, limit: i64) -> Result<Vec<NotificationRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|record| record.id == id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| record.id != id);
        Ok(records.len() < before)
    }
}

/// One recipient as the directory sees it.
#[derive(Debug, Clone)]
pub struct RecipientProfile {
    pub id: Uuid,
    pub city: Option<String>,
    pub category: Option<String>,
    pub approved: bool,
    pub push_enabled: bool,
}

impl RecipientProfile {
    pub fn eligible(id: Uuid) -> Self {
        Self {
            id,
            city: None,
            category: None,
            approved: true,
            push_enabled: true,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryRecipientDirectory {
    recipients: Arc<RwLock<HashMap<Uuid, RecipientProfile>>>,
}

impl MemoryRecipientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, profile: RecipientProfile) {
        self.recipients.write().await.insert(profile.id, profile);
    }
}

fn matches_rule(profile: &RecipientProfile, rule: &TargetRule) -> bool {
    match rule {
        TargetRule::All => true,
        TargetRule::Attribute { attribute, values } => {
            let value = match attribute {
                RecipientAttribute::City => profile.city.as_deref(),
                RecipientAttribute::Category => profile.category.as_deref(),
            };
            value.is_some_and(|value| values.iter().any(|candidate| candidate == value))
        }
        TargetRule::Recipients { ids } => ids.contains(&profile.id),
    }
}

#[async_trait]
impl RecipientDirectory for MemoryRecipientDirectory {
    async fn recipient_exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.recipients.read().await.contains_key(&id))
    }

    async fn find_eligible(&self, rule: &TargetRule) -> Result<Vec<Uuid>> {
        let recipients = self.recipients.read().await;
        Ok(recipients
            .values()
            .filter(|profile| profile.approved && profile.push_enabled)
            .filter(|profile| matches_rule(profile, rule))
            .map(|profile| profile.id)
            .collect())
    }
}
