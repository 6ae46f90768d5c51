use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolSpec};
use crate::token_counter::TokenCounter;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// The decoded reply of one chat completion: either plain content, or tool calls the model
/// wants executed (possibly with content alongside)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl ModelResponse {
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Base trait for chat completion endpoints
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send the conversation and tool catalog, returning the model's reply.
    ///
    /// Messages are validated before anything is sent. Transport, auth and decoding failures
    /// are all reported as `AgentError::Provider`. Nothing is retried.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        max_output_tokens: u32,
    ) -> AgentResult<ModelResponse>;

    fn token_counter(&self) -> &TokenCounter;

    fn count_tokens(&self, text: &str) -> usize {
        self.token_counter().count_tokens(text)
    }
}
