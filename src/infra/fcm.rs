//! FCM over its HTTP API. Single sends use `to`, multicast uses
//! `registration_ids`; the response carries a results array parallel to the
//! request tokens.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::AppConfig;
use crate::domain::notification::ErrorClass;
use crate::infra::gateway::{BatchReport, GatewayError, PushEnvelope, PushGateway, TokenOutcome};

/// Hard protocol limit on registration_ids per multicast request.
const MAX_TOKENS_PER_REQUEST: usize = 500;

#[derive(Clone)]
pub struct FcmGateway {
    client: reqwest::Client,
    endpoint: String,
    server_key: String,
    batch_concurrency: usize,
}

#[derive(Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Serialize)]
struct FcmMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_ids: Option<&'a [String]>,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
    priority: &'a str,
}

#[derive(Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Deserialize)]
struct FcmResult {
    #[serde(default)]
    message_id: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

fn classify(error: &str) -> ErrorClass {
    match error {
        "NotRegistered" | "InvalidRegistration" | "MismatchSenderId" => ErrorClass::InvalidToken,
        "Unavailable" | "InternalServerError" | "DeviceMessageRateExceeded" => {
            ErrorClass::Transient
        }
        _ => ErrorClass::Unknown,
    }
}

impl FcmGateway {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.fcm_endpoint.clone(),
            server_key: config.fcm_server_key.clone(),
            batch_concurrency: config.gateway_batch_concurrency,
        })
    }

    async fn post(&self, message: &FcmMessage<'_>) -> Result<FcmResponse, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(message)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("status {}", status)));
        }

        response
            .json::<FcmResponse>()
            .await
            .map_err(|err| GatewayError::Transport(err.to_string()))
    }

    async fn send_chunk(
        &self,
        tokens: &[String],
        envelope: &PushEnvelope,
        data: &BTreeMap<String, String>,
    ) -> Result<Vec<TokenOutcome>, GatewayError> {
        let message = FcmMessage {
            to: None,
            registration_ids: Some(tokens),
            notification: FcmNotification {
                title: &envelope.title,
                body: &envelope.body,
                image: envelope.image_url.as_deref(),
            },
            data,
            priority: "high",
        };

        let response = self.post(&message).await?;
        if response.results.len() != tokens.len() {
            return Err(GatewayError::Transport(format!(
                "gateway returned {} results for {} tokens",
                response.results.len(),
                tokens.len()
            )));
        }

        Ok(response.results.iter().map(outcome_from_result).collect())
    }
}

fn outcome_from_result(result: &FcmResult) -> TokenOutcome {
    match &result.error {
        Some(error) => TokenOutcome::failed(classify(error)),
        None => TokenOutcome {
            success: true,
            message_id: result.message_id.as_ref().map(|id| match id {
                Value::String(id) => id.clone(),
                other => other.to_string(),
            }),
            error: None,
        },
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send_one(
        &self,
        token: &str,
        envelope: &PushEnvelope,
        data: &BTreeMap<String, String>,
    ) -> Result<TokenOutcome, GatewayError> {
        let message = FcmMessage {
            to: Some(token),
            registration_ids: None,
            notification: FcmNotification {
                title: &envelope.title,
                body: &envelope.body,
                image: envelope.image_url.as_deref(),
            },
            data,
            priority: "high",
        };

        let response = self.post(&message).await?;
        let result = response
            .results
            .first()
            .ok_or_else(|| GatewayError::Transport("gateway returned no result".into()))?;

        Ok(outcome_from_result(result))
    }

    async fn send_batch(
        &self,
        tokens: &[String],
        envelope: &PushEnvelope,
        data: &BTreeMap<String, String>,
    ) -> Result<BatchReport, GatewayError> {
        // Chunked multicast requests, issued with bounded concurrency;
        // `buffered` keeps chunk order so outcomes stay index-aligned.
        let chunk_requests: Vec<_> = tokens
            .chunks(MAX_TOKENS_PER_REQUEST)
            .map(|chunk| self.send_chunk(chunk, envelope, data))
            .collect();
        let chunk_outcomes: Vec<Vec<TokenOutcome>> = stream::iter(chunk_requests)
            .buffered(self.batch_concurrency.max(1))
            .try_collect()
            .await?;

        let mut report = BatchReport::default();
        for outcome in chunk_outcomes.into_iter().flatten() {
            if outcome.success {
                report.success_count += 1;
            } else {
                report.failure_count += 1;
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }
}
