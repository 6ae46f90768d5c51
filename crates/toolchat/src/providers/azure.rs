use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{ModelClient, ModelResponse};
use super::configs::AzureOpenAiProviderConfig;
use super::utils::{
    messages_to_openai_spec, openai_response_to_model_response, send_chat_request,
    tools_to_openai_spec, validate_messages,
};
use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::models::tool::ToolSpec;
use crate::token_counter::TokenCounter;

/// Chat completions served from an Azure OpenAI deployment
pub struct AzureOpenAiProvider {
    client: Client,
    config: AzureOpenAiProviderConfig,
    token_counter: TokenCounter,
}

impl AzureOpenAiProvider {
    pub fn new(config: AzureOpenAiProviderConfig, token_counter: TokenCounter) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            config,
            token_counter,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.config.deployment)
        )
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let request = self
            .client
            .post(self.url())
            .query(&[("api-version", &self.config.api_version)])
            .header("api-key", &self.config.api_key)
            .json(&payload);
        send_chat_request(request).await
    }
}

#[async_trait]
impl ModelClient for AzureOpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        max_output_tokens: u32,
    ) -> AgentResult<ModelResponse> {
        validate_messages(messages)?;

        let mut payload = json!({
            "model": self.config.deployment,
            "messages": messages_to_openai_spec(messages),
            "max_completion_tokens": max_output_tokens,
        });
        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(tools).map_err(AgentError::provider)?);
        }
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = json!(temperature);
        }

        debug!(deployment = %self.config.deployment, messages = messages.len(), "Generating chat completion");
        let response = self.post(payload).await.map_err(AgentError::provider)?;
        let decoded =
            openai_response_to_model_response(&response).map_err(AgentError::provider)?;
        debug!(usage = ?decoded.usage, tool_calls = decoded.tool_calls.len(), "Chat completion generated successfully");
        Ok(decoded)
    }

    fn token_counter(&self) -> &TokenCounter {
        &self.token_counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: &str) -> AzureOpenAiProviderConfig {
        AzureOpenAiProviderConfig {
            endpoint: endpoint.to_string(),
            api_key: "azure-key".to_string(),
            deployment: "gpt-4o-prod".to_string(),
            api_version: "2024-08-01-preview".to_string(),
            model_name: "gpt-4o".to_string(),
            temperature: None,
        }
    }

    #[tokio::test]
    async fn test_complete_uses_deployment_route() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o-prod/chat/completions"))
            .and(query_param("api-version", "2024-08-01-preview"))
            .and(header("api-key", "azure-key"))
            .and(body_partial_json(json!({ "max_completion_tokens": 10000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": "Hi there" }
                }],
                "usage": { "prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7 }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = AzureOpenAiProvider::new(config(&mock_server.uri()), TokenCounter::new())?;
        let reply = provider
            .complete(&[Message::system("s"), Message::user("Hi")], &[], 10000)
            .await?;

        assert_eq!(reply.content.as_deref(), Some("Hi there"));
        assert_eq!(reply.usage.total_tokens, Some(7));
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_a_provider_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let provider =
            AzureOpenAiProvider::new(config(&mock_server.uri()), TokenCounter::new()).unwrap();
        let err = provider
            .complete(&[Message::user("Hi")], &[], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }

    #[test]
    fn test_url() {
        let provider =
            AzureOpenAiProvider::new(config("https://res.openai.azure.com/"), TokenCounter::new())
                .unwrap();
        assert_eq!(
            provider.url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o-prod/chat/completions"
        );
    }
}
