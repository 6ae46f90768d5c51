use anyhow::Result;
use tracing::error;

use crate::prompt::{InputType, Prompt};
use toolchat::agent::Agent;

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
}

impl<'a> Session<'a> {
    pub fn new(agent: Agent, prompt: Box<dyn Prompt + 'a>) -> Self {
        Session { agent, prompt }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = input.content {
                        self.agent_ask(content).await;
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => continue,
                InputType::Reset => {
                    self.agent.reset();
                    self.prompt.render_notice("Conversation reset.");
                }
                InputType::Print => {
                    let dump = serde_json::to_string_pretty(self.agent.conversation())?;
                    self.prompt.render_notice(&dump);
                }
                InputType::History => self.prompt.render_history(self.agent.conversation()),
                InputType::Tokens => {
                    let notice =
                        format!("Total tokens in conversation: {}", self.agent.total_tokens());
                    self.prompt.render_notice(&notice);
                }
            }
        }
        self.prompt.close();
        Ok(())
    }

    /// Answer a single message and return, for `--text` runs
    pub async fn headless_start(&mut self, initial_message: String) -> Result<()> {
        let reply = self.agent.ask(initial_message).await?;
        self.prompt.render_reply(&reply);
        Ok(())
    }

    async fn agent_ask(&mut self, content: String) {
        self.prompt.show_busy();
        let result = self.agent.ask(content).await;
        self.prompt.hide_busy();

        match result {
            Ok(reply) => self.prompt.render_reply(&reply),
            Err(e) => {
                error!(error = ?e, "turn failed");
                self.prompt.render_error(&e.to_string());
            }
        }
    }

    #[cfg(test)]
    fn prompt(&self) -> &dyn Prompt {
        self.prompt.as_ref()
    }

    #[cfg(test)]
    fn agent(&self) -> &Agent {
        &self.agent
    }
}
