use axum::{routing::delete, routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn tokens() -> Router<AppState> {
    Router::new()
        .route("/tokens/register", post(handlers::register_token))
        .route("/tokens/deactivate", post(handlers::deactivate_token))
        .route("/tokens/sweep", post(handlers::sweep_tokens))
        .route("/tokens/stats", get(handlers::token_stats))
        .route("/tokens/:recipient_id", get(handlers::list_recipient_tokens))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications/send", post(handlers::send_notification))
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/:id", get(handlers::get_notification))
        .route("/notifications/:id", delete(handlers::delete_notification))
}
