use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::models::tool::ToolSpec;
use crate::providers::base::{ModelClient, ModelResponse};
use crate::providers::utils::validate_messages;
use crate::token_counter::TokenCounter;

/// A mock provider that returns pre-configured responses and records every conversation it
/// was sent
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<AgentResult<ModelResponse>>>,
    received: Arc<Mutex<Vec<Vec<Message>>>>,
    token_counter: TokenCounter,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Like `new`, but individual calls may fail
    pub fn with_results(results: Vec<AgentResult<ModelResponse>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            ..Default::default()
        }
    }

    /// Handle onto the recorded conversations, usable after the provider is moved into an agent
    pub fn received(&self) -> Arc<Mutex<Vec<Vec<Message>>>> {
        Arc::clone(&self.received)
    }
}

#[async_trait]
impl ModelClient for MockProvider {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
        _max_output_tokens: u32,
    ) -> AgentResult<ModelResponse> {
        validate_messages(messages)?;
        lock(&self.received).push(messages.to_vec());
        // An exhausted script answers with empty text
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(ModelResponse::text("")))
    }

    fn token_counter(&self) -> &TokenCounter {
        &self.token_counter
    }
}
