//! Common test utilities for in-process API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock dependencies injected, so the full HTTP stack can be tested
//! without a ticketing account or an LLM provider.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use helpdesk_core::{
    load_config_from_str,
    testing::{MockLlmClient, MockTicketApi},
    ChatService, Config, SqliteTicketStore, SyncService, TicketFetcher, TicketStore,
};
use helpdesk_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use helpdesk_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process server with fully controllable mocks for:
/// - The ticketing API (MockTicketApi)
/// - The LLM provider (MockLlmClient), unless built without chat
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_sync() {
///     let fixture = TestFixture::new();
///     fixture.api.add_tickets((1..=3).map(fixtures::ticket));
///
///     let response = fixture.post("/sync/last-7-days", json!({})).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock ticketing API - configure tickets, children and failures
    pub api: Arc<MockTicketApi>,
    /// Mock LLM - queue replies for chat, solution guides and summaries
    pub llm: Arc<MockLlmClient>,
    /// Store behind the router, for seeding and assertions
    pub store: Arc<SqliteTicketStore>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

/// Config with no pacing delays, so syncs finish immediately.
pub fn test_config() -> Config {
    let mut config = load_config_from_str(
        r#"
[server]
host = "127.0.0.1"
port = 8800

[upstream]
zone_url = "http://127.0.0.1:9"
username = "api@example.com"
secret = "secret"
integration_code = "CODE"

[sync]
politeness_delay_ms = 0
sub_request_delay_ms = 0
batch_pause_ms = 0
backoff_base_ms = 1
"#,
    )
    .expect("test config parses");
    config.llm = None;
    config
}

impl TestFixture {
    /// Create a new test fixture with chat enabled.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Create a test fixture without an LLM, as when none is configured.
    pub fn without_llm() -> Self {
        Self::build(false)
    }

    fn build(with_llm: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = test_config();
        config.database.path = db_path.clone();

        // Create mocks
        let api = Arc::new(MockTicketApi::new());
        let llm = Arc::new(MockLlmClient::new());

        // Create store
        let store =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));
        let dyn_store: Arc<dyn TicketStore> = store.clone();

        let fetcher = TicketFetcher::new(api.clone(), &config.sync);
        let sync = Arc::new(SyncService::new(fetcher, Arc::clone(&dyn_store)));

        let chat = with_llm.then(|| {
            Arc::new(ChatService::new(
                llm.clone(),
                llm.clone(),
                Arc::clone(&dyn_store),
            ))
        });

        let mut state = AppState::new(config, dyn_store, sync, chat);
        if with_llm {
            state = state.with_insights(llm.clone());
        }
        let state = Arc::new(state);
        let router = create_router(state);

        Self {
            router,
            api,
            llm,
            store,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
