//! Token registry tests
//!
//! Covers registration, deactivation, failure-driven lifecycle, and the
//! administrative sweep and stats surface.

mod common;

use axum::http::StatusCode;
use common::{app, FAILURE_THRESHOLD, TEST_ADMIN_TOKEN};
use serde_json::json;
use uuid::Uuid;

// ===========================================================================
// Registration
// ===========================================================================

#[tokio::test]
async fn register_creates_active_token() {
    let app = app().await;
    let recipient = app.create_recipient().await;

    let resp = app
        .post_json(
            "/tokens/register",
            json!({
                "recipient_id": recipient,
                "token": "tok-new",
                "platform": "android",
                "device_info": {"model": "Pixel 8", "os_version": "14"}
            }),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert!(body["token_id"].is_string());
    assert_eq!(body["platform"].as_str().unwrap(), "android");
    assert_eq!(body["is_active"].as_bool().unwrap(), true);

    let token = app.token("tok-new").await;
    assert_eq!(token.recipient_id, recipient);
    assert_eq!(token.failure_count, 0);
}

#[tokio::test]
async fn register_rejects_empty_token() {
    let app = app().await;
    let recipient = app.create_recipient().await;

    let resp = app
        .post_json(
            "/tokens/register",
            json!({"recipient_id": recipient, "token": "  "}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "token is required");
}

#[tokio::test]
async fn register_unknown_recipient_is_not_found() {
    let app = app().await;

    let resp = app
        .post_json(
            "/tokens/register",
            json!({"recipient_id": Uuid::new_v4(), "token": "tok-orphan"}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reregistration_is_idempotent_and_resets_failures() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    app.register_token(recipient, "tok-again").await;

    // Accumulate some failures, then register the same pair again.
    let registry = app.registry();
    registry.record_failure("tok-again", false).await.unwrap();
    registry.record_failure("tok-again", false).await.unwrap();
    assert_eq!(app.token("tok-again").await.failure_count, 2);

    app.register_token(recipient, "tok-again").await;

    let token = app.token("tok-again").await;
    assert_eq!(token.failure_count, 0);
    assert!(token.is_active);

    // No duplicate row: still exactly one active token for the recipient.
    let resp = app.get(&format!("/tokens/{}", recipient)).await;
    assert_eq!(resp.json()["count"].as_i64().unwrap(), 1);
}

#[tokio::test]
async fn registration_is_additive_across_devices() {
    let app = app().await;
    let recipient = app.create_recipient().await;

    app.register_token(recipient, "tok-phone").await;
    app.register_token(recipient, "tok-tablet").await;

    let resp = app.get(&format!("/tokens/{}", recipient)).await;
    assert_eq!(resp.status, StatusCode::OK);
    // Registering a second device leaves the first active.
    assert_eq!(resp.json()["count"].as_i64().unwrap(), 2);
}

#[tokio::test]
async fn registering_anothers_token_moves_ownership() {
    let app = app().await;
    let first = app.create_recipient().await;
    let second = app.create_recipient().await;

    app.register_token(first, "tok-shared-device").await;
    app.register_token(second, "tok-shared-device").await;

    let token = app.token("tok-shared-device").await;
    assert_eq!(token.recipient_id, second);

    let resp = app.get(&format!("/tokens/{}", first)).await;
    assert_eq!(resp.json()["count"].as_i64().unwrap(), 0);
}

// ===========================================================================
// Deactivation
// ===========================================================================

#[tokio::test]
async fn deactivate_marks_token_inactive() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    app.register_token(recipient, "tok-logout").await;

    let resp = app
        .post_json(
            "/tokens/deactivate",
            json!({"recipient_id": recipient, "token": "tok-logout"}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert!(!app.token("tok-logout").await.is_active);
}

#[tokio::test]
async fn deactivate_unknown_pair_is_not_found() {
    let app = app().await;
    let recipient = app.create_recipient().await;

    let resp = app
        .post_json(
            "/tokens/deactivate",
            json!({"recipient_id": recipient, "token": "tok-missing"}),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Failure-driven lifecycle
// ===========================================================================

#[tokio::test]
async fn three_consecutive_failures_deactivate_a_token() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    app.register_token(recipient, "tok-flaky").await;

    let registry = app.registry();
    for _ in 0..FAILURE_THRESHOLD {
        registry.record_failure("tok-flaky", false).await.unwrap();
    }

    let token = app.token("tok-flaky").await;
    assert_eq!(token.failure_count, FAILURE_THRESHOLD);
    assert!(!token.is_active);
}

#[tokio::test]
async fn success_resets_counter_regardless_of_prior_value() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    app.register_token(recipient, "tok-recovers").await;

    let registry = app.registry();
    registry.record_failure("tok-recovers", false).await.unwrap();
    registry.record_failure("tok-recovers", false).await.unwrap();
    registry.record_success("tok-recovers").await.unwrap();

    let token = app.token("tok-recovers").await;
    assert_eq!(token.failure_count, 0);
    assert!(token.is_active);
    assert!(token.last_failure.is_none());
}

#[tokio::test]
async fn failures_below_threshold_keep_token_active() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    app.register_token(recipient, "tok-wobbly").await;

    let registry = app.registry();
    registry.record_failure("tok-wobbly", false).await.unwrap();
    registry.record_failure("tok-wobbly", false).await.unwrap();

    let token = app.token("tok-wobbly").await;
    assert_eq!(token.failure_count, 2);
    assert!(token.is_active);
    assert!(token.last_failure.is_some());
}

// ===========================================================================
// Sweep
// ===========================================================================

#[tokio::test]
async fn sweep_deactivates_tokens_past_threshold_and_is_idempotent() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    // Seeded directly: failure count already past the threshold but still
    // active, as if failures were recorded under a higher threshold.
    app.seed_token(recipient, "tok-stale", FAILURE_THRESHOLD).await;
    app.seed_token(recipient, "tok-healthy", 0).await;

    let resp = app
        .post_admin("/tokens/sweep", json!({}), Some(TEST_ADMIN_TOKEN))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["deactivated_count"].as_u64().unwrap(), 1);
    assert!(!app.token("tok-stale").await.is_active);
    assert!(app.token("tok-healthy").await.is_active);

    // Second run with no intervening failures affects nothing.
    let resp = app
        .post_admin("/tokens/sweep", json!({}), Some(TEST_ADMIN_TOKEN))
        .await;
    assert_eq!(resp.json()["deactivated_count"].as_u64().unwrap(), 0);
}

#[tokio::test]
async fn sweep_requires_admin_token() {
    let app = app().await;

    let resp = app.post_admin("/tokens/sweep", json!({}), None).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .post_admin("/tokens/sweep", json!({}), Some("wrong-token"))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

// ===========================================================================
// Listing and stats
// ===========================================================================

#[tokio::test]
async fn list_returns_only_active_tokens() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    app.register_token(recipient, "tok-a").await;
    app.register_token(recipient, "tok-b").await;
    app.post_json(
        "/tokens/deactivate",
        json!({"recipient_id": recipient, "token": "tok-a"}),
    )
    .await;

    let resp = app.get(&format!("/tokens/{}", recipient)).await;
    let body = resp.json();
    assert_eq!(body["count"].as_i64().unwrap(), 1);
    assert_eq!(body["items"][0]["token"].as_str().unwrap(), "tok-b");
}

#[tokio::test]
async fn list_for_unknown_recipient_is_empty_not_an_error() {
    let app = app().await;

    let resp = app.get(&format!("/tokens/{}", Uuid::new_v4())).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["count"].as_i64().unwrap(), 0);
}

#[tokio::test]
async fn stats_reports_totals_and_platform_breakdown() {
    let app = app().await;
    let recipient = app.create_recipient().await;
    app.register_token(recipient, "tok-one").await;
    app.register_token(recipient, "tok-two").await;
    app.post_json(
        "/tokens/deactivate",
        json!({"recipient_id": recipient, "token": "tok-two"}),
    )
    .await;

    let resp = app.get_admin("/tokens/stats", Some(TEST_ADMIN_TOKEN)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["total"].as_i64().unwrap(), 2);
    assert_eq!(body["active"].as_i64().unwrap(), 1);
    assert_eq!(body["inactive"].as_i64().unwrap(), 1);
    assert_eq!(
        body["active_by_platform"][0]["platform"].as_str().unwrap(),
        "android"
    );
    assert_eq!(body["active_by_platform"][0]["count"].as_i64().unwrap(), 1);
}
