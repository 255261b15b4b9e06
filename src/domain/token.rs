use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Web,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "android" => Platform::Android,
            "ios" => Platform::Ios,
            "web" => Platform::Web,
            _ => Platform::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
}

/// One registered delivery address: a provider-issued token string bound to
/// exactly one recipient. A recipient may hold several active tokens at once
/// (one per device).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushToken {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub token: String,
    pub platform: Platform,
    pub device_info: DeviceInfo,
    pub is_active: bool,
    pub last_used: OffsetDateTime,
    pub failure_count: i32,
    pub last_failure: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Aggregate token counts for the admin stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub active_by_platform: Vec<(Platform, i64)>,
}
