//! Common test utilities for campused integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

use campused_core::{ChatMessage, CreditBalance, PricingTable, UserId};
use campused_service::auth::JwtClaims;
use campused_service::{create_router, AppState, Completion, LanguageModel, LlmError, ServiceConfig};
use campused_store::{CreditLedger, MemoryStore};

pub const ADMIN_KEY: &str = "test-admin-key";

/// A language model that answers every call with a fixed completion.
pub struct FakeLlm {
    pub chat: Completion,
    pub vision: Completion,
    pub structured: Completion,
    /// Fail chat calls after this many successful ones.
    pub chat_failures_after: Option<usize>,
    calls: AtomicUsize,
    chat_calls: AtomicUsize,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self {
            chat: completion("Newton's second law is F = ma.", 200, 100),
            vision: completion("A diagram of a convex lens.", 40, 10),
            structured: completion(
                r#"{"questions":[{"question":"2 + 2?","options":{"1":"3","2":"4","3":"5","4":"6"},"correct_options":2}]}"#,
                120,
                80,
            ),
            chat_failures_after: None,
            calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_structured(mut self, text: &str, input: u64, output: u64) -> Self {
        self.structured = completion(text, input, output);
        self
    }

    pub fn failing_chat(mut self) -> Self {
        self.chat_failures_after = Some(0);
        self
    }

    /// Number of model calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeLlm {
    fn default() -> Self {
        Self::new()
    }
}

pub fn completion(text: &str, input_tokens: u64, output_tokens: u64) -> Completion {
    Completion {
        text: text.to_string(),
        input_tokens,
        output_tokens,
    }
}

#[async_trait]
impl LanguageModel for FakeLlm {
    async fn generate_text(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if self.chat_failures_after.is_some_and(|limit| n >= limit) {
            return Err(LlmError::Api {
                status: 500,
                message: "upstream exploded".into(),
            });
        }
        Ok(self.chat.clone())
    }

    async fn analyze_image(
        &self,
        _model: &str,
        _image: &[u8],
        _content_type: &str,
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vision.clone())
    }

    async fn generate_structured(
        &self,
        _model: &str,
        _system_prompt: &str,
        _user_prompt: &str,
        _schema_name: &str,
        _schema: &serde_json::Value,
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.structured.clone())
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server.
    pub store: Arc<MemoryStore>,
    /// Ledger over the same store.
    pub ledger: CreditLedger,
    /// The scripted model.
    pub llm: Arc<FakeLlm>,
    /// Configuration the server runs with.
    pub config: ServiceConfig,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh store and the default model.
    pub fn new() -> Self {
        Self::with_llm(FakeLlm::new())
    }

    pub fn with_llm(llm: FakeLlm) -> Self {
        Self::build(test_config(), llm)
    }

    pub fn build(config: ServiceConfig, llm: FakeLlm) -> Self {
        let store = Arc::new(MemoryStore::new());
        let ledger = CreditLedger::new(store.clone());
        let llm = Arc::new(llm);

        let state = AppState::with_llm(
            store.clone(),
            config.clone(),
            PricingTable::default(),
            llm.clone(),
        );
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            ledger,
            llm,
            config,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        self.auth_header_for(&self.test_user_id)
    }

    /// Get a different user's auth header (for testing isolation).
    pub fn other_user_auth_header(&self) -> String {
        self.auth_header_for(&UserId::generate())
    }

    pub fn auth_header_for(&self, user_id: &UserId) -> String {
        let claims = JwtClaims {
            sub: user_id.to_string(),
            aud: self.config.auth_audience.clone(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.auth_jwt_secret.as_bytes()),
        )
        .expect("Failed to sign test token");
        format!("Bearer {token}")
    }

    /// Give the test user tokens.
    pub async fn grant(&self, tokens: i64) {
        self.ledger
            .credit(&self.test_user_id, tokens)
            .await
            .expect("Failed to grant tokens");
    }

    /// The test user's balance.
    pub async fn balance(&self) -> CreditBalance {
        self.ledger
            .get_or_create_balance(&self.test_user_id)
            .await
            .expect("Failed to read balance")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        auth_jwt_secret: "test-secret".into(),
        admin_api_key: Some(ADMIN_KEY.into()),
        max_body_bytes: 4 * 1024 * 1024,
        max_upload_file_bytes: 1024 * 1024,
        request_timeout_seconds: 30,
        ..ServiceConfig::default()
    }
}
