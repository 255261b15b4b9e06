use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::app::error::SendError;
use crate::app::lifecycle::TokenLifecycle;
use crate::domain::notification::{DeliveryOutcome, DeliveryResult};
use crate::infra::gateway::{PushEnvelope, PushGateway, TokenOutcome};

/// Dispatches one payload to a token set via the gateway and reports the
/// aggregate. One code path for any cardinality: zero tokens short-circuits,
/// one token uses the single-send operation, more use the batch operation.
#[derive(Clone)]
pub struct DeliveryEngine {
    gateway: Arc<dyn PushGateway>,
    lifecycle: TokenLifecycle,
}

impl DeliveryEngine {
    pub fn new(gateway: Arc<dyn PushGateway>, lifecycle: TokenLifecycle) -> Self {
        Self { gateway, lifecycle }
    }

    pub async fn dispatch(
        &self,
        envelope: &PushEnvelope,
        data: &BTreeMap<String, Value>,
        tokens: &[String],
    ) -> Result<DeliveryResult, SendError> {
        if tokens.is_empty() {
            // Nobody to notify; not an error and no gateway call.
            return Ok(DeliveryResult::default());
        }

        let data = coerce_data(data);

        let outcomes: Vec<TokenOutcome> = if tokens.len() == 1 {
            vec![self.gateway.send_one(&tokens[0], envelope, &data).await?]
        } else {
            let report = self.gateway.send_batch(tokens, envelope, &data).await?;
            if report.outcomes.len() != tokens.len() {
                return Err(SendError::Internal(anyhow::anyhow!(
                    "gateway reported {} outcomes for {} tokens",
                    report.outcomes.len(),
                    tokens.len()
                )));
            }
            report.outcomes
        };

        // Outcomes are zipped back to tokens by index; the gateway contract
        // keeps them in request order.
        let mut result = DeliveryResult::default();
        for (token, outcome) in tokens.iter().zip(outcomes) {
            if outcome.success {
                result.success_count += 1;
            } else {
                result.failure_count += 1;
            }
            result.per_token.push(DeliveryOutcome {
                token: token.clone(),
                success: outcome.success,
                error: outcome.error,
            });
        }

        for outcome in &result.per_token {
            if let Err(err) = self.lifecycle.on_outcome(outcome).await {
                tracing::warn!(error = ?err, "failed to update token health");
            }
        }

        tracing::info!(
            delivered = result.success_count,
            failed = result.failure_count,
            "dispatch complete"
        );

        Ok(result)
    }
}

/// The downstream protocol requires every data value to be a string;
/// non-string values silently corrupt delivery on some platforms. Nested
/// values are stringified as JSON.
fn coerce_data(data: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    data.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(value) => value.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_every_data_value_to_string() {
        let mut data = BTreeMap::new();
        data.insert("plain".to_string(), json!("text"));
        data.insert("count".to_string(), json!(7));
        data.insert("flag".to_string(), json!(true));
        data.insert("nested".to_string(), json!({"a": 1}));
        data.insert("missing".to_string(), Value::Null);

        let coerced = coerce_data(&data);

        assert_eq!(coerced["plain"], "text");
        assert_eq!(coerced["count"], "7");
        assert_eq!(coerced["flag"], "true");
        assert_eq!(coerced["nested"], r#"{"a":1}"#);
        assert_eq!(coerced["missing"], "null");
    }

    #[test]
    fn string_values_are_not_requoted() {
        let mut data = BTreeMap::new();
        data.insert("id".to_string(), json!("abc-123"));

        let coerced = coerce_data(&data);

        assert_eq!(coerced["id"], "abc-123");
    }
}
