use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::error::SendError;
use crate::app::tokens::TokenRegistry;
use crate::domain::notification::TargetRule;
use crate::infra::store::RecipientDirectory;

/// Expands a targeting rule into the concrete set of (recipient, token)
/// pairs to deliver to.
#[derive(Clone)]
pub struct AudienceResolver {
    directory: Arc<dyn RecipientDirectory>,
    registry: TokenRegistry,
}

impl AudienceResolver {
    pub fn new(directory: Arc<dyn RecipientDirectory>, registry: TokenRegistry) -> Self {
        Self {
            directory,
            registry,
        }
    }

    /// Eligible recipients for the rule, expanded to their active tokens and
    /// deduplicated by token string. Explicit recipient lists are still
    /// intersected with the eligibility predicate, so an unapproved or
    /// opted-out recipient never receives a push. Empty is a valid result.
    pub async fn resolve(&self, rule: &TargetRule) -> Result<Vec<(Uuid, String)>, SendError> {
        let recipient_ids = self.directory.find_eligible(rule).await?;

        let mut seen = HashSet::new();
        let mut pairs = Vec::new();
        for recipient_id in recipient_ids {
            for token in self.registry.list_active(recipient_id).await? {
                if seen.insert(token.token.clone()) {
                    pairs.push((recipient_id, token.token));
                }
            }
        }

        tracing::debug!(recipients = pairs.len(), "resolved audience");
        Ok(pairs)
    }
}
