use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::notification::ErrorClass;

/// Human-readable part of a push message, carried separately from the data
/// map per the downstream protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEnvelope {
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
}

/// Per-token result reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOutcome {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<ErrorClass>,
}

impl TokenOutcome {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: ErrorClass) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error),
        }
    }
}

/// Batch result; `outcomes` is ordered to match the input token slice.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub success_count: u32,
    pub failure_count: u32,
    pub outcomes: Vec<TokenOutcome>,
}

/// The transport itself failed before any per-token outcome was produced.
/// Distinct from a per-token delivery failure, which is data in the report.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("push gateway timed out")]
    Timeout,
    #[error("push gateway unreachable: {0}")]
    Transport(String),
    #[error("push gateway rejected the request: {0}")]
    Rejected(String),
}

/// External push-delivery transport. Values in `data` are already coerced to
/// strings by the delivery engine.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_one(
        &self,
        token: &str,
        envelope: &PushEnvelope,
        data: &BTreeMap<String, String>,
    ) -> Result<TokenOutcome, GatewayError>;

    /// Dispatches to many tokens; the report's outcomes are index-aligned
    /// with `tokens`.
    async fn send_batch(
        &self,
        tokens: &[String],
        envelope: &PushEnvelope,
        data: &BTreeMap<String, String>,
    ) -> Result<BatchReport, GatewayError>;
}
