#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use herald::app::audience::AudienceResolver;
use herald::app::delivery::DeliveryEngine;
use herald::app::lifecycle::TokenLifecycle;
use herald::app::notifications::NotificationService;
use herald::app::tokens::TokenRegistry;
use herald::domain::notification::ErrorClass;
use herald::domain::token::{DeviceInfo, Platform, PushToken};
use herald::infra::gateway::{
    BatchReport, GatewayError, PushEnvelope, PushGateway, TokenOutcome,
};
use herald::infra::memory::{
    MemoryRecipientDirectory, MemoryRecordStore, MemoryTokenStore, RecipientProfile,
};
use herald::infra::store::TokenStore;
use herald::AppState;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";
pub const FAILURE_THRESHOLD: i32 = 3;

// ---------------------------------------------------------------------------
// Mock gateway — scriptable per-token failures or a whole-dispatch outage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockGatewayInner {
    fail_tokens: Mutex<HashMap<String, ErrorClass>>,
    down: Mutex<bool>,
    calls: AtomicUsize,
    dispatched: Mutex<Vec<Vec<String>>>,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    inner: Arc<MockGatewayInner>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deliveries to this token fail with the given classification.
    pub fn fail_token(&self, token: &str, error: ErrorClass) {
        self.inner
            .fail_tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), error);
    }

    /// Make every dispatch fail before producing per-token outcomes.
    pub fn set_down(&self, down: bool) {
        *self.inner.down.lock().unwrap() = down;
    }

    /// Number of gateway calls made (single or batch).
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Token lists of every dispatch that reached the gateway, in order.
    pub fn dispatched(&self) -> Vec<Vec<String>> {
        self.inner.dispatched.lock().unwrap().clone()
    }

    fn outcome_for(&self, token: &str) -> TokenOutcome {
        match self.inner.fail_tokens.lock().unwrap().get(token) {
            Some(error) => TokenOutcome::failed(*error),
            None => TokenOutcome::delivered(format!("msg-{}", token)),
        }
    }

    fn check_up(&self) -> Result<(), GatewayError> {
        if *self.inner.down.lock().unwrap() {
            Err(GatewayError::Transport("gateway down".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PushGateway for MockGateway {
    async fn send_one(
        &self,
        token: &str,
        _envelope: &PushEnvelope,
        _data: &BTreeMap<String, String>,
    ) -> Result<TokenOutcome, GatewayError> {
        self.check_up()?;
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .dispatched
            .lock()
            .unwrap()
            .push(vec![token.to_string()]);
        Ok(self.outcome_for(token))
    }

    async fn send_batch(
        &self,
        tokens: &[String],
        _envelope: &PushEnvelope,
        _data: &BTreeMap<String, String>,
    ) -> Result<BatchReport, GatewayError> {
        self.check_up()?;
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.dispatched.lock().unwrap().push(tokens.to_vec());

        let mut report = BatchReport::default();
        for token in tokens {
            let outcome = self.outcome_for(token);
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

// ---------------------------------------------------------------------------
// TestApp — fresh in-memory state per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub tokens: MemoryTokenStore,
    pub records: MemoryRecordStore,
    pub directory: MemoryRecipientDirectory,
    pub gateway: MockGateway,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

pub async fn app() -> TestApp {
    let tokens = MemoryTokenStore::new();
    let records = MemoryRecordStore::new();
    let directory = MemoryRecipientDirectory::new();
    let gateway = MockGateway::new();

    let state = AppState {
        tokens: Arc::new(tokens.clone()),
        records: Arc::new(records.clone()),
        directory: Arc::new(directory.clone()),
        gateway: Arc::new(gateway.clone()),
        admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
        failure_threshold: FAILURE_THRESHOLD,
    };

    let router = herald::http::router(state.clone());

    TestApp {
        router,
        state,
        tokens,
        records,
        directory,
        gateway,
    }
}

impl TestApp {
    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None, &[]).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.request(Method::POST, path, Some(body), &[]).await
    }

    /// POST with the admin token in the x-admin-token header.
    pub async fn post_admin(
        &self,
        path: &str,
        body: Value,
        admin_token: Option<&str>,
    ) -> TestResponse {
        let mut headers = vec![];
        if let Some(token) = admin_token {
            headers.push(("x-admin-token", token));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    /// GET with the admin token in the x-admin-token header.
    pub async fn get_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(token) = admin_token {
            headers.push(("x-admin-token", token));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn delete_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(token) = admin_token {
            headers.push(("x-admin-token", token));
        }
        self.request(Method::DELETE, path, None, &headers).await
    }

    pub fn admin_token(&self) -> &str {
        TEST_ADMIN_TOKEN
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// A registry built the same way the handlers build theirs.
    pub fn registry(&self) -> TokenRegistry {
        TokenRegistry::new(
            self.state.tokens.clone(),
            self.state.directory.clone(),
            FAILURE_THRESHOLD,
        )
    }

    pub fn notification_service(&self) -> NotificationService {
        let registry = self.registry();
        let resolver = AudienceResolver::new(self.state.directory.clone(), registry.clone());
        let engine = DeliveryEngine::new(
            self.state.gateway.clone(),
            TokenLifecycle::new(registry),
        );
        NotificationService::new(resolver, engine, self.state.records.clone())
    }

    /// Insert an approved, push-enabled recipient. Returns its id.
    pub async fn create_recipient(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.directory.insert(RecipientProfile::eligible(id)).await;
        id
    }

    pub async fn create_recipient_with(
        &self,
        city: Option<&str>,
        category: Option<&str>,
        approved: bool,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.directory
            .insert(RecipientProfile {
                id,
                city: city.map(str::to_string),
                category: category.map(str::to_string),
                approved,
                push_enabled: true,
            })
            .await;
        id
    }

    /// Register a token through the API; panics on a non-200 response.
    pub async fn register_token(&self, recipient_id: Uuid, token: &str) {
        let resp = self
            .post_json(
                "/tokens/register",
                serde_json::json!({
                    "recipient_id": recipient_id,
                    "token": token,
                    "platform": "android"
                }),
            )
            .await;
        assert_eq!(resp.status, StatusCode::OK, "register failed: {}", resp.error_message());
    }

    /// Insert a token row directly into the store, bypassing registration.
    pub async fn seed_token(&self, recipient_id: Uuid, token: &str, failure_count: i32) {
        let now = OffsetDateTime::now_utc();
        self.tokens
            .create(&PushToken {
                id: Uuid::new_v4(),
                recipient_id,
                token: token.to_string(),
                platform: Platform::Android,
                device_info: DeviceInfo::default(),
                is_active: true,
                last_used: now,
                failure_count,
                last_failure: None,
                created_at: now,
            })
            .await
            .expect("seed token failed");
    }

    /// Direct token read-back for assertions.
    pub async fn token(&self, token: &str) -> PushToken {
        self.tokens.get(token).await.expect("token not found")
    }
}
