use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::audience::AudienceResolver;
use crate::app::delivery::DeliveryEngine;
use crate::app::error::SendError;
use crate::domain::notification::{
    NotificationJob, NotificationRecord, NotificationStatus,
};
use crate::infra::gateway::PushEnvelope;
use crate::infra::store::RecordStore;

#[derive(Debug, Clone)]
pub struct SendSummary {
    pub id: Uuid,
    pub total_recipients: i32,
    pub delivered_count: i32,
}

/// Orchestrates one send: validate, resolve the audience, persist the record,
/// dispatch, finalize the record with the outcome. A request never vanishes
/// silently — even a gateway outage leaves a record with status Failed.
#[derive(Clone)]
pub struct NotificationService {
    resolver: AudienceResolver,
    engine: DeliveryEngine,
    records: Arc<dyn RecordStore>,
}

impl NotificationService {
    pub fn new(
        resolver: AudienceResolver,
        engine: DeliveryEngine,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            resolver,
            engine,
            records,
        }
    }

    pub async fn send(&self, job: NotificationJob) -> Result<SendSummary, SendError> {
        if job.title.trim().is_empty() || job.body.trim().is_empty() {
            return Err(SendError::validation("title and body are required"));
        }

        let pairs = self.resolver.resolve(&job.target).await?;
        let tokens: Vec<String> = pairs.into_iter().map(|(_, token)| token).collect();

        let record = NotificationRecord {
            id: Uuid::new_v4(),
            title: job.title.clone(),
            message: job.body.clone(),
            notification_type: "push".to_string(),
            target: serde_json::to_value(&job.target).map_err(anyhow::Error::from)?,
            total_recipients: tokens.len() as i32,
            delivered_count: 0,
            status: NotificationStatus::Scheduled,
            sent_at: None,
            created_by: job.created_by.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.records.create(&record).await?;

        if tokens.is_empty() {
            self.records
                .finalize(
                    record.id,
                    NotificationStatus::Sent,
                    0,
                    Some(OffsetDateTime::now_utc()),
                )
                .await?;
            tracing::info!(record_id = %record.id, "no recipients to notify");
            return Ok(SendSummary {
                id: record.id,
                total_recipients: 0,
                delivered_count: 0,
            });
        }

        let mut data = job.data.clone();
        data.insert(
            "notification_id".to_string(),
            serde_json::Value::String(record.id.to_string()),
        );

        let envelope = PushEnvelope {
            title: job.title.clone(),
            body: job.body.clone(),
            image_url: job.image_url.clone(),
        };

        match self.engine.dispatch(&envelope, &data, &tokens).await {
            Ok(result) => {
                self.records
                    .finalize(
                        record.id,
                        NotificationStatus::Sent,
                        result.success_count as i32,
                        Some(OffsetDateTime::now_utc()),
                    )
                    .await?;
                Ok(SendSummary {
                    id: record.id,
                    total_recipients: tokens.len() as i32,
                    delivered_count: result.success_count as i32,
                })
            }
            Err(err) => {
                tracing::error!(record_id = %record.id, error = %err, "dispatch failed");
                if let Err(finalize_err) = self
                    .records
                    .finalize(record.id, NotificationStatus::Failed, 0, None)
                    .await
                {
                    tracing::error!(record_id = %record.id, error = ?finalize_err, "failed to mark record failed");
                }
                Err(err)
            }
        }
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<NotificationRecord>, SendError> {
        Ok(self.records.list(limit).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<NotificationRecord, SendError> {
        self.records
            .get(id)
            .await?
            .ok_or_else(|| SendError::not_found("notification not found"))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), SendError> {
        if !self.records.delete(id).await? {
            return Err(SendError::not_found("notification not found"));
        }
        Ok(())
    }
}
