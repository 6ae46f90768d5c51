use super::{
    azure::AzureOpenAiProvider, base::ModelClient, configs::ProviderConfig,
    openai::OpenAiProvider,
};
use crate::errors::{AgentError, AgentResult};
use crate::token_counter::TokenCounter;

pub fn get_provider(
    config: ProviderConfig,
    token_counter: TokenCounter,
) -> AgentResult<Box<dyn ModelClient>> {
    let client: Box<dyn ModelClient> = match config {
        ProviderConfig::OpenAi(openai_config) => Box::new(
            OpenAiProvider::new(openai_config, token_counter).map_err(config_error)?,
        ),
        ProviderConfig::Azure(azure_config) => Box::new(
            AzureOpenAiProvider::new(azure_config, token_counter).map_err(config_error)?,
        ),
    };
    Ok(client)
}

fn config_error(e: anyhow::Error) -> AgentError {
    AgentError::Configuration(format!("could not build model client: {:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::OpenAiProviderConfig;

    #[test]
    fn test_get_openai_provider() {
        let config = ProviderConfig::OpenAi(OpenAiProviderConfig {
            host: "https://api.openai.com".to_string(),
            api_key: "k".to_string(),
            model: "gpt-4o".to_string(),
            temperature: None,
        });
        let client = get_provider(config, TokenCounter::new()).unwrap();
        assert_eq!(client.count_tokens("abcd"), 1);
    }
}
