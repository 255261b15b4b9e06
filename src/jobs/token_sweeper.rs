//! Background cleanup: periodically deactivates tokens that have crossed the
//! failure threshold. The delivery path already deactivates eagerly; this
//! catches tokens whose failures were recorded without a deactivation (e.g.
//! a threshold lowered by config after the fact).

use anyhow::Result;
use std::time::Duration;

use crate::app::tokens::TokenRegistry;

pub async fn run(registry: TokenRegistry, interval: Duration) -> Result<()> {
    tracing::info!(interval_seconds = interval.as_secs(), "token sweeper started");
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; sweep once at startup, then on the interval.
    loop {
        ticker.tick().await;
        match registry.sweep_invalid().await {
            Ok(0) => tracing::debug!("sweep found nothing to deactivate"),
            Ok(deactivated) => tracing::info!(deactivated, "sweep deactivated tokens"),
            Err(err) => tracing::warn!(error = ?err, "sweep failed"),
        }
    }
}
