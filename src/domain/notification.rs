use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which recipients a notification is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetRule {
    All,
    Attribute {
        attribute: RecipientAttribute,
        values: Vec<String>,
    },
    Recipients {
        ids: Vec<Uuid>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientAttribute {
    City,
    Category,
}

/// One submitted send request. Ephemeral: only its target snapshot and final
/// counts are persisted, on the NotificationRecord.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub data: BTreeMap<String, Value>,
    pub target: TargetRule,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Draft,
    Scheduled,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Draft => "draft",
            NotificationStatus::Scheduled => "scheduled",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "draft" => NotificationStatus::Draft,
            "scheduled" => NotificationStatus::Scheduled,
            "sent" => NotificationStatus::Sent,
            _ => NotificationStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub target: Value,
    pub total_recipients: i32,
    pub delivered_count: i32,
    pub status: NotificationStatus,
    pub sent_at: Option<OffsetDateTime>,
    pub created_by: Option<String>,
    pub created_at: OffsetDateTime,
}

/// How the gateway classified a per-token failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The provider no longer recognizes the token. Authoritative; the token
    /// is deactivated without waiting for the failure threshold.
    InvalidToken,
    Transient,
    Unknown,
}

/// Result of one delivery attempt for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub token: String,
    pub success: bool,
    pub error: Option<ErrorClass>,
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryResult {
    pub success_count: u32,
    pub failure_count: u32,
    pub per_token: Vec<DeliveryOutcome>,
}
