//! Mock LLM client for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::chat::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};

#[derive(Default)]
struct MockState {
    responses: VecDeque<Result<String, LlmError>>,
    requests: Vec<CompletionRequest>,
}

/// Mock implementation of the [`LlmClient`] trait.
///
/// Replies are queued and returned in order. When the queue is empty every
/// call fails with [`LlmError::NotConfigured`]. Every request is recorded.
///
/// # Example
///
/// ```rust,ignore
/// use helpdesk_core::testing::MockLlmClient;
///
/// let llm = MockLlmClient::new();
/// llm.push_response(r#"{"action": "count_tickets", "params": {"is_open": true}}"#);
/// llm.push_response("Most tickets are about printers.");
/// ```
pub struct MockLlmClient {
    model: String,
    state: Mutex<MockState>,
}

impl std::fmt::Debug for MockLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmClient")
            .field("model", &self.model)
            .field("state", &"<state>")
            .finish()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a successful reply.
    pub fn push_response(&self, text: impl Into<String>) {
        self.state().responses.push_back(Ok(text.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: LlmError) {
        self.state().responses.push_back(Err(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state().requests.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut state = self.state();
        state.requests.push(request);
        let text = state
            .responses
            .pop_front()
            .unwrap_or(Err(LlmError::NotConfigured))?;
        Ok(CompletionResponse {
            usage: LlmUsage {
                input_tokens: 10,
                output_tokens: text.len() as u32,
            },
            text,
            model: self.model.clone(),
        })
    }
}
