use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::audience::AudienceResolver;
use crate::app::delivery::DeliveryEngine;
use crate::app::lifecycle::TokenLifecycle;
use crate::app::notifications::NotificationService;
use crate::app::tokens::TokenRegistry;
use crate::domain::notification::{NotificationJob, NotificationRecord, TargetRule};
use crate::domain::token::{DeviceInfo, Platform};
use crate::http::{AdminToken, AppError};
use crate::AppState;

fn registry(state: &AppState) -> TokenRegistry {
    TokenRegistry::new(
        state.tokens.clone(),
        state.directory.clone(),
        state.failure_threshold,
    )
}

fn notification_service(state: &AppState) -> NotificationService {
    let registry = registry(state);
    let resolver = AudienceResolver::new(state.directory.clone(), registry.clone());
    let engine = DeliveryEngine::new(state.gateway.clone(), TokenLifecycle::new(registry));
    NotificationService::new(resolver, engine, state.records.clone())
}

fn rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.to_string())
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.tokens.ping().await.is_ok() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterTokenRequest {
    pub recipient_id: Uuid,
    pub token: String,
    pub platform: Option<String>,
    pub device_info: Option<DeviceInfo>,
}

#[derive(Serialize)]
pub struct RegisterTokenResponse {
    pub token_id: Uuid,
    pub platform: Platform,
    pub is_active: bool,
}

pub async fn register_token(
    State(state): State<AppState>,
    Json(payload): Json<RegisterTokenRequest>,
) -> Result<Json<RegisterTokenResponse>, AppError> {
    let platform = payload
        .platform
        .as_deref()
        .map(Platform::parse)
        .unwrap_or(Platform::Unknown);

    let token = registry(&state)
        .register(
            payload.recipient_id,
            &payload.token,
            platform,
            payload.device_info.unwrap_or_default(),
        )
        .await?;

    Ok(Json(RegisterTokenResponse {
        token_id: token.id,
        platform: token.platform,
        is_active: token.is_active,
    }))
}

#[derive(Deserialize)]
pub struct DeactivateTokenRequest {
    pub recipient_id: Uuid,
    pub token: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub async fn deactivate_token(
    State(state): State<AppState>,
    Json(payload): Json<DeactivateTokenRequest>,
) -> Result<Json<OkResponse>, AppError> {
    registry(&state)
        .deactivate(payload.recipient_id, &payload.token)
        .await?;

    Ok(Json(OkResponse { ok: true }))
}

#[derive(Serialize)]
pub struct TokenView {
    pub token: String,
    pub platform: Platform,
    pub is_active: bool,
    pub last_used: String,
}

#[derive(Serialize)]
pub struct TokenListResponse {
    pub count: usize,
    pub items: Vec<TokenView>,
}

pub async fn list_recipient_tokens(
    State(state): State<AppState>,
    Path(recipient_id): Path<Uuid>,
) -> Result<Json<TokenListResponse>, AppError> {
    let tokens = registry(&state).list_active(recipient_id).await?;

    let items: Vec<TokenView> = tokens
        .into_iter()
        .map(|token| TokenView {
            token: token.token,
            platform: token.platform,
            is_active: token.is_active,
            last_used: rfc3339(token.last_used),
        })
        .collect();

    Ok(Json(TokenListResponse {
        count: items.len(),
        items,
    }))
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub deactivated_count: u64,
}

pub async fn sweep_tokens(
    State(state): State<AppState>,
    _admin: AdminToken,
) -> Result<Json<SweepResponse>, AppError> {
    let deactivated_count = registry(&state).sweep_invalid().await?;

    Ok(Json(SweepResponse { deactivated_count }))
}

#[derive(Serialize)]
pub struct PlatformCount {
    pub platform: Platform,
    pub count: i64,
}

#[derive(Serialize)]
pub struct TokenStatsResponse {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub active_by_platform: Vec<PlatformCount>,
}

pub async fn token_stats(
    State(state): State<AppState>,
    _admin: AdminToken,
) -> Result<Json<TokenStatsResponse>, AppError> {
    let stats = registry(&state).stats().await?;

    Ok(Json(TokenStatsResponse {
        total: stats.total,
        active: stats.active,
        inactive: stats.inactive,
        active_by_platform: stats
            .active_by_platform
            .into_iter()
            .map(|(platform, count)| PlatformCount { platform, count })
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SendNotificationRequest {
    pub title: String,
    pub body: String,
    pub target: Option<TargetRule>,
    pub data: Option<BTreeMap<String, Value>>,
    pub image_url: Option<String>,
}

#[derive(Serialize)]
pub struct SendNotificationResponse {
    pub id: Uuid,
    pub total_recipients: i32,
    pub delivered_count: i32,
}

pub async fn send_notification(
    State(state): State<AppState>,
    _admin: AdminToken,
    Json(payload): Json<SendNotificationRequest>,
) -> Result<Json<SendNotificationResponse>, AppError> {
    let job = NotificationJob {
        title: payload.title,
        body: payload.body,
        image_url: payload.image_url,
        data: payload.data.unwrap_or_default(),
        target: payload.target.unwrap_or(TargetRule::All),
        created_by: None,
    };

    let summary = notification_service(&state).send(job).await?;

    Ok(Json(SendNotificationResponse {
        id: summary.id,
        total_recipients: summary.total_recipients,
        delivered_count: summary.delivered_count,
    }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct RecordView {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub target: Value,
    pub total_recipients: i32,
    pub delivered_count: i32,
    pub status: crate::domain::notification::NotificationStatus,
    pub sent_at: Option<String>,
    pub created_at: String,
}

impl From<NotificationRecord> for RecordView {
    fn from(record: NotificationRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            message: record.message,
            notification_type: record.notification_type,
            target: record.target,
            total_recipients: record.total_recipients,
            delivered_count: record.delivered_count,
            status: record.status,
            sent_at: record.sent_at.map(rfc3339),
            created_at: rfc3339(record.created_at),
        }
    }
}

#[derive(Serialize)]
pub struct RecordListResponse {
    pub count: usize,
    pub items: Vec<RecordView>,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    _admin: AdminToken,
    Query(query): Query<ListQuery>,
) -> Result<Json<RecordListResponse>, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let records = notification_service(&state).list(limit).await?;

    let items: Vec<RecordView> = records.into_iter().map(RecordView::from).collect();

    Ok(Json(RecordListResponse {
        count: items.len(),
        items,
    }))
}

pub async fn get_notification(
    State(state): State<AppState>,
    _admin: AdminToken,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordView>, AppError> {
    let record = notification_service(&state).get(id).await?;

    Ok(Json(RecordView::from(record)))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    _admin: AdminToken,
    Path(id): Path<Uuid>,
) -> Result<Json<OkResponse>, AppError> {
    notification_service(&state).delete(id).await?;

    Ok(Json(OkResponse { ok: true }))
}
