use crate::app::error::SendError;
use crate::app::tokens::TokenRegistry;
use crate::domain::notification::{DeliveryOutcome, ErrorClass};

/// Keeps token health consistent with observed delivery reality. Stateless
/// policy layer over the registry's mutation primitives, invoked
/// synchronously as outcomes arrive.
#[derive(Clone)]
pub struct TokenLifecycle {
    registry: TokenRegistry,
}

impl TokenLifecycle {
    pub fn new(registry: TokenRegistry) -> Self {
        Self { registry }
    }

    pub async fn on_outcome(&self, outcome: &DeliveryOutcome) -> Result<(), SendError> {
        if outcome.success {
            return self.registry.record_success(&outcome.token).await;
        }

        match outcome.error {
            // The gateway saying the token is no longer registered is
            // authoritative; don't wait for the failure threshold.
            Some(ErrorClass::InvalidToken) => {
                tracing::info!("gateway reported token invalid, deactivating");
                self.registry.record_failure(&outcome.token, true).await
            }
            Some(ErrorClass::Transient) | Some(ErrorClass::Unknown) | None => {
                self.registry.record_failure(&outcome.token, false).await
            }
        }
    }
}
