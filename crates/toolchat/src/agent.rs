use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;
use crate::providers::base::{ModelClient, ModelResponse};
use crate::providers::factory::get_provider;
use crate::settings::{AgentSettings, Settings};
use crate::token_counter::TokenCounter;
use crate::tools::{default_providers, ToolRegistry};

/// Where the agent is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingFirstResponse,
    AwaitingToolExecution,
    AwaitingFinalResponse,
}

/// Agent owns one conversation and drives it against a model and the registered tools
pub struct Agent {
    client: Box<dyn ModelClient>,
    registry: ToolRegistry,
    settings: AgentSettings,
    conversation: Vec<Message>,
    state: TurnState,
    total_tokens: usize,
}

impl Agent {
    pub fn new(
        client: Box<dyn ModelClient>,
        registry: ToolRegistry,
        settings: AgentSettings,
    ) -> Self {
        info!(tools = registry.list_tools().len(), "Initializing agent");
        let conversation = vec![Message::system(settings.system_prompt.clone())];
        Self {
            client,
            registry,
            settings,
            conversation,
            state: TurnState::Idle,
            total_tokens: 0,
        }
    }

    /// Build the configured model client and built-in tool providers
    pub fn from_settings(settings: &Settings) -> AgentResult<Self> {
        let token_counter = TokenCounter::from_settings(settings.agent.tokenizer_path.as_deref());
        let client = get_provider(settings.provider.clone(), token_counter)?;
        let registry = ToolRegistry::new(default_providers(settings)?)?;
        info!(model = settings.provider.model(), "Model client ready");
        Ok(Self::new(client, registry, settings.agent.clone()))
    }

    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Tokens counted across every completed turn since the last reset
    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Drop everything but the system prompt
    pub fn reset(&mut self) {
        info!("Clearing conversation");
        self.conversation.truncate(1);
        self.conversation[0] = Message::system(self.settings.system_prompt.clone());
        self.total_tokens = 0;
    }

    /// Send one user message and return the assistant's reply.
    ///
    /// When the model asks for tools, each call is dispatched in order, the assistant
    /// tool-call message and one tool message per call are appended, and the model is asked
    /// again for the final reply. A failing model call or tool leaves the user message as the
    /// last entry of this turn.
    pub async fn ask(&mut self, user_text: impl Into<String>) -> AgentResult<String> {
        let user_text = user_text.into();
        self.conversation.push(Message::user(user_text.clone()));

        let result = self.run_turn().await;
        self.state = TurnState::Idle;
        let reply = result?;

        let counter = self.client.token_counter();
        let user_tokens = counter.count_message_tokens(&user_text);
        let assistant_tokens = counter.count_message_tokens(&reply);
        self.total_tokens += user_tokens + assistant_tokens;
        info!(
            "Last user message tokens: {} | Last assistant message tokens: {} | Total tokens on chat history: {}",
            user_tokens, assistant_tokens, self.total_tokens
        );

        Ok(reply)
    }

    async fn complete(&self) -> AgentResult<ModelResponse> {
        self.client
            .complete(
                &self.conversation,
                self.registry.tools_description(),
                self.settings.max_output_tokens,
            )
            .await
    }

    async fn run_turn(&mut self) -> AgentResult<String> {
        self.state = TurnState::AwaitingFirstResponse;
        let response = self.complete().await?;

        if !response.has_tool_calls() {
            let reply = response.content.unwrap_or_default();
            self.conversation.push(Message::assistant(reply.clone()));
            return Ok(reply);
        }

        self.state = TurnState::AwaitingToolExecution;
        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            debug!(id = %call.id, tool = %call.function_name, "Dispatching tool call");
            let result = self
                .registry
                .execute_tool(&call.function_name, call.arguments.clone())
                .await
                .map_err(|source| AgentError::ToolExecution {
                    name: call.function_name.clone(),
                    source,
                })?;
            results.push(Message::tool(call.id.clone(), result.to_string()));
        }
        self.conversation
            .push(Message::assistant_tool_calls(response.tool_calls));
        self.conversation.extend(results);

        self.state = TurnState::AwaitingFinalResponse;
        let response = self.complete().await?;
        let nested = response.has_tool_calls();
        let reply = match response.content {
            Some(content) => {
                if nested {
                    warn!(
                        ignored = response.tool_calls.len(),
                        "Model asked for more tools after tool results, using its text reply"
                    );
                }
                content
            }
            None if nested => {
                return Err(AgentError::provider(anyhow!("unexpected nested tool call")))
            }
            None => String::new(),
        };

        self.conversation.push(Message::assistant(reply.clone()));
        Ok(reply)
    }
}
