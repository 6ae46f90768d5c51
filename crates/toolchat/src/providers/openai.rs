use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{ModelClient, ModelResponse};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    messages_to_openai_spec, openai_response_to_model_response, send_chat_request,
    tools_to_openai_spec, validate_messages,
};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::ToolSpec;
use crate::token_counter::TokenCounter;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
    token_counter: TokenCounter,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig, token_counter: TokenCounter) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            config,
            token_counter,
        })
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload);
        send_chat_request(request).await
    }
}

#[async_trait]
impl ModelClient for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        max_output_tokens: u32,
    ) -> AgentResult<ModelResponse> {
        validate_messages(messages)?;

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(messages),
            "max_tokens": max_output_tokens,
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(tools).map_err(AgentError::provider)?);
        }
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = json!(temperature);
        }

        debug!(model = %self.config.model, messages = messages.len(), "Requesting chat completion");
        let response = self.post(payload).await.map_err(AgentError::provider)?;
        let decoded =
            openai_response_to_model_response(&response).map_err(AgentError::provider)?;
        debug!(usage = ?decoded.usage, tool_calls = decoded.tool_calls.len(), "Chat completion received");
        Ok(decoded)
    }

    fn token_counter(&self) -> &TokenCounter {
        &self.token_counter
    }
}
