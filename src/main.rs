use anyhow::anyhow;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald::app::tokens::TokenRegistry;
use herald::config::AppConfig;
use herald::infra::db::Db;
use herald::infra::fcm::FcmGateway;
use herald::infra::pg::{PgRecipientDirectory, PgRecordStore, PgTokenStore};
use herald::{http, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let gateway = FcmGateway::new(&config)?;

    let state = AppState {
        tokens: Arc::new(PgTokenStore::new(db.clone())),
        records: Arc::new(PgRecordStore::new(db.clone())),
        directory: Arc::new(PgRecipientDirectory::new(db.clone())),
        gateway: Arc::new(gateway),
        admin_token: config.admin_token.clone(),
        failure_threshold: config.failure_threshold,
    };

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "sweeper" => {
            tracing::info!("starting sweeper mode");
            let registry = TokenRegistry::new(
                state.tokens.clone(),
                state.directory.clone(),
                state.failure_threshold,
            );
            tokio::select! {
                result = jobs::token_sweeper::run(
                    registry,
                    Duration::from_secs(config.sweep_interval_seconds),
                ) => {
                    result?;
                }
                _ = shutdown_signal() => {}
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
