use anyhow::Result;
use async_trait::async_trait;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::{
    NotificationRecord, NotificationStatus, RecipientAttribute, TargetRule,
};
use crate::domain::token::{DeviceInfo, Platform, PushToken, TokenStats};
use crate::infra::db::Db;
use crate::infra::store::{RecipientDirectory, RecordStore, TokenStore};

#[derive(Clone)]
pub struct PgTokenStore {
    db: Db,
}

impl PgTokenStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn token_from_row(row: &sqlx::postgres::PgRow) -> Result<PushToken> {
    let device_info: serde_json::Value = row.get("device_info");
    Ok(PushToken {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        token: row.get("token"),
        platform: Platform::parse(row.get::<String, _>("platform").as_str()),
        device_info: serde_json::from_value(device_info).unwrap_or_default(),
        is_active: row.get("is_active"),
        last_used: row.get("last_used"),
        failure_count: row.get("failure_count"),
        last_failure: row.get("last_failure"),
        created_at: row.get("created_at"),
    })
}

const TOKEN_COLUMNS: &str = "id, recipient_id, token, platform, device_info, is_active, \
                             last_used, failure_count, last_failure, created_at";

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<PushToken>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM push_tokens WHERE token = $1",
            TOKEN_COLUMNS
        ))
        .bind(token)
        .fetch_optional(self.db.pool())
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn create(&self, record: &PushToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO push_tokens \
             (id, recipient_id, token, platform, device_info, is_active, \
              last_used, failure_count, last_failure, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id)
        .bind(record.recipient_id)
        .bind(&record.token)
        .bind(record.platform.as_str())
        .bind(serde_json::to_value(&record.device_info)?)
        .bind(record.is_active)
        .bind(record.last_used)
        .bind(record.failure_count)
        .bind(record.last_failure)
        .bind(record.created_at)
        .execute(self.db.pool())
        .await?;

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
        sqlx::query(
            "UPDATE push_tokens \
             SET recipient_id = $2, platform = $3, device_info = $4, \
                 is_active = true, last_used = $5, failure_count = 0, last_failure = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(recipient_id)
        .bind(platform.as_str())
        .bind(serde_json::to_value(device_info)?)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn list_active(&self, recipient_id: Uuid) -> Result<Vec<PushToken>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM push_tokens \
             WHERE recipient_id = $1 AND is_active \
             ORDER BY last_used DESC",
            TOKEN_COLUMNS
        ))
        .bind(recipient_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(token_from_row).collect()
    }

    async fn deactivate_pair(&self, recipient_id: Uuid, token: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE push_tokens SET is_active = false \
             WHERE recipient_id = $1 AND token = $2",
        )
        .bind(recipient_id)
        .bind(token)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_success(&self, token: &str, now: OffsetDateTime) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE push_tokens \
             SET failure_count = 0, last_failure = NULL, is_active = true, last_used = $2 \
             WHERE token = $1",
        )
        .bind(token)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(
        &self,
        token: &str,
        now: OffsetDateTime,
        threshold: i32,
        force_deactivate: bool,
    ) -> Result<bool> {
        // Single statement so two concurrent failure reports cannot
        // under-count or race the threshold check.
        let result = sqlx::query(
            "UPDATE push_tokens \
             SET failure_count = failure_count + 1, \
                 last_failure = $2, \
                 is_active = CASE \
                     WHEN $4 OR failure_count + 1 >= $3 THEN false \
                     ELSE is_active \
                 END \
             WHERE token = $1",
        )
        .bind(token)
        .bind(now)
        .bind(threshold)
        .bind(force_deactivate)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn sweep_invalid(&self, threshold: i32) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE push_tokens SET is_active = false \
             WHERE is_active AND failure_count >= $1",
        )
        .bind(threshold)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<TokenStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE is_active) AS active \
             FROM push_tokens",
        )
        .fetch_one(self.db.pool())
        .await?;
        let total: i64 = row.get("total");
        let active: i64 = row.get("active");

        let rows = sqlx::query(
            "SELECT platform, COUNT(*) AS count FROM push_tokens \
             WHERE is_active GROUP BY platform ORDER BY platform",
        )
        .fetch_all(self.db.pool())
        .await?;

        let active_by_platform = rows
            .iter()
            .map(|row| {
                (
                    Platform::parse(row.get::<String, _>("platform").as_str()),
                    row.get::<i64, _>("count"),
                )
            })
            .collect();

        Ok(TokenStats {
            total,
            active,
            inactive: total - active,
            active_by_platform,
        })
    }
}

#[derive(Clone)]
pub struct PgRecordStore {
    db: Db,
}

impl PgRecordStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> NotificationRecord {
    NotificationRecord {
        id: row.get("id"),
        title: row.get("title"),
        message: row.get("message"),
        notification_type: row.get("notification_type"),
        target: row.get("target"),
        total_recipients: row.get("total_recipients"),
        delivered_count: row.get("delivered_count"),
        status: NotificationStatus::parse(row.get::<String, _>("status").as_str()),
        sent_at: row.get("sent_at"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
    }
}

const RECORD_COLUMNS: &str = "id, title, message, notification_type, target, total_recipients, \
                              delivered_count, status, sent_at, created_by, created_at";

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn create(&self, record: &NotificationRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO notification_records \
             (id, title, message, notification_type, target, total_recipients, \
              delivered_count, status, sent_at, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id)
        .bind(&record.title)
        .bind(&record.message)
        .bind(&record.notification_type)
        .bind(&record.target)
        .bind(record.total_recipients)
        .bind(record.delivered_count)
        .bind(record.status.as_str())
        .bind(record.sent_at)
        .bind(&record.created_by)
        .bind(record.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: NotificationStatus,
        delivered_count: i32,
        sent_at: Option<OffsetDateTime>,
    ) -> Result<bool> {
        // Sent and Failed are terminal; a record is only finalized out of a
        // non-terminal status.
        let result = sqlx::query(
            "UPDATE notification_records \
             SET status = $2, delivered_count = $3, sent_at = $4 \
             WHERE id = $1 AND status IN ('draft', 'scheduled')",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(delivered_count)
        .bind(sent_at)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, limit: i64) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM notification_records \
             ORDER BY created_at DESC, id DESC LIMIT $1",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notification_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notification_records WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Directory backed by the recipients table. The eligibility predicate is
/// approved status plus push opt-in.
#[derive(Clone)]
pub struct PgRecipientDirectory {
    db: Db,
}

impl PgRecipientDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecipientDirectory for PgRecipientDirectory {
    async fn recipient_exists(&self, id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM recipients WHERE id = $1)")
                .bind(id)
                .fetch_one(self.db.pool())
                .await?;

        Ok(exists)
    }

    async fn find_eligible(&self, rule: &TargetRule) -> Result<Vec<Uuid>> {
        const ELIGIBLE: &str = "status = 'approved' AND push_enabled";

        let rows = match rule {
            TargetRule::All => {
                sqlx::query(&format!("SELECT id FROM recipients WHERE {}", ELIGIBLE))
                    .fetch_all(self.db.pool())
                    .await?
            }
            TargetRule::Attribute { attribute, values } => {
                let column = match attribute {
                    RecipientAttribute::City => "city",
                    RecipientAttribute::Category => "category",
                };
                sqlx::query(&format!(
                    "SELECT id FROM recipients WHERE {} AND {} = ANY($1)",
                    ELIGIBLE, column
                ))
                .bind(values)
                .fetch_all(self.db.pool())
                .await?
            }
            TargetRule::Recipients { ids } => {
                sqlx::query(&format!(
                    "SELECT id FROM recipients WHERE {} AND id = ANY($1)",
                    ELIGIBLE
                ))
                .bind(ids)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}
