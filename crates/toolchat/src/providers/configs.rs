use serde::Deserialize;

/// Which chat endpoint to talk to, selected by the `type` key
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Azure(AzureOpenAiProviderConfig),
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAi(config) => &config.model,
            ProviderConfig::Azure(config) => &config.model_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiProviderConfig {
    #[serde(default = "default_openai_host")]
    pub host: String,
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzureOpenAiProviderConfig {
    /// e.g. `https://my-resource.openai.azure.com`
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    #[serde(default = "default_model")]
    pub model_name: String,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}
