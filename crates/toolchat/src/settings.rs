//! Runtime configuration.
//!
//! Settings come from an optional YAML file layered with `TOOLCHAT_` environment variables,
//! where `__` separates nested keys (`TOOLCHAT_PROVIDER__API_KEY` sets `provider.api_key`).
//! Each component receives only the section it needs.

use config::{Config, Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::providers::configs::ProviderConfig;

pub const ENV_PREFIX: &str = "TOOLCHAT";
pub const DEFAULT_CONFIG_PATH: &str = "config/settings.yaml";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. You have access to several tools and can use more than one tool if the \
user request requires it. Always reason about whether one or multiple tool calls are needed before \
responding.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration value, set it in the settings file or with the {env_var} environment variable")]
    MissingField { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable that sets the given dotted key
pub fn to_env_var(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.replace('.', "__").to_uppercase())
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// A HuggingFace `tokenizer.json` used for token accounting
    #[serde(default)]
    pub tokenizer_path: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_output_tokens: default_max_output_tokens(),
            tokenizer_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalStorageSettings {
    #[serde(default = "default_local_folder")]
    pub folder: String,
}

impl Default for LocalStorageSettings {
    fn default() -> Self {
        Self {
            folder: default_local_folder(),
        }
    }
}

impl LocalStorageSettings {
    pub fn folder_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.folder).as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzureBlobSettings {
    /// Must carry a `SharedAccessSignature`
    pub connection_string: String,
    pub default_container: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurveyNotebooks {
    pub ingestion: String,
    pub categories: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabricksSettings {
    pub workspace_url: String,
    pub token: String,
    pub cluster_id: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub default_notebook_path: String,
    /// The survey tools are only offered when these are configured
    #[serde(default)]
    pub survey_notebooks: Option<SurveyNotebooks>,
    #[serde(default = "default_survey_mount")]
    pub survey_mount: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Host and port to bind. The host may be a name such as `localhost`, resolved at bind time.
    pub fn address(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentSettings,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub local_storage: LocalStorageSettings,
    #[serde(default)]
    pub azure_blob: Option<AzureBlobSettings>,
    #[serde(default)]
    pub databricks: Option<DatabricksSettings>,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Settings {
    /// Load from `path` (required to exist) or from `config/settings.yaml` when present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::new(&path.to_string_lossy(), FileFormat::Yaml).required(true),
            None => File::new(DEFAULT_CONFIG_PATH, FileFormat::Yaml).required(false),
        };
        tracing::debug!(path = ?path, "Loading settings");
        Self::build(Config::builder().add_source(file))
    }

    /// Parse settings from YAML text, with environment overrides applied on top
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.clone().try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                match missing_key(&config, &err) {
                    Some(key) => Err(ConfigError::MissingField {
                        env_var: to_env_var(&key),
                    }),
                    None => Err(ConfigError::Other(err)),
                }
            }
        }
    }
}

/// Required fields of each optional section, used to place a missing field reported without
/// its parent key
const REQUIRED_FIELDS: [(&str, &[&str]); 4] = [
    (
        "provider",
        &["type", "api_key", "endpoint", "deployment", "api_version", "model_name"],
    ),
    ("azure_blob", &["connection_string", "default_container"]),
    (
        "databricks",
        &["workspace_url", "token", "cluster_id", "default_notebook_path"],
    ),
    ("databricks.survey_notebooks", &["ingestion", "categories"]),
];

/// Recover the dotted key of a missing field, e.g. `provider.api_key`
fn missing_key(config: &Config, err: &config::ConfigError) -> Option<String> {
    if let config::ConfigError::NotFound(key) = err {
        return Some(key.clone());
    }
    let re = Regex::new(r"missing field `([^`]+)`(?: for key `([^`]+)`)?").ok()?;
    let text = err.to_string();
    let captures = re.captures(&text)?;
    let field = captures.get(1)?.as_str();
    if let Some(parent) = captures.get(2) {
        return Some(format!("{}.{}", parent.as_str(), field));
    }

    let section = REQUIRED_FIELDS.iter().find(|(section, fields)| {
        fields.contains(&field)
            && config
                .get_table(section)
                .map(|table| !table.contains_key(field))
                .unwrap_or(false)
    });
    Some(match section {
        Some((section, _)) => format!("{}.{}", section, field),
        None => field.to_string(),
    })
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_max_output_tokens() -> u32 {
    10000
}

fn default_local_folder() -> String {
    "./data".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_survey_mount() -> String {
    "/mnt/dls/".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use serial_test::serial;
    use std::env;
    use std::net::{SocketAddr, ToSocketAddrs};

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("TOOLCHAT_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults_from_minimal_yaml() {
        clean_env();
        let settings = Settings::from_yaml_str(indoc! {r#"
            provider:
              type: openai
              api_key: test-key
        "#})
        .unwrap();

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 5001);
        assert_eq!(settings.agent.max_output_tokens, 10000);
        assert_eq!(settings.agent.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(settings.local_storage.folder, "./data");
        assert_eq!(settings.log_level, "info");
        assert!(settings.azure_blob.is_none());
        assert!(settings.databricks.is_none());

        match settings.provider {
            ProviderConfig::OpenAi(config) => {
                assert_eq!(config.host, "https://api.openai.com");
                assert_eq!(config.api_key, "test-key");
                assert_eq!(config.model, "gpt-4o");
                assert_eq!(config.temperature, None);
            }
            _ => panic!("Expected OpenAI provider"),
        }
    }

    #[test]
    #[serial]
    fn test_full_yaml() {
        clean_env();
        let settings = Settings::from_yaml_str(indoc! {r#"
            provider:
              type: azure
              endpoint: https://example.openai.azure.com
              api_key: azure-key
              deployment: gpt-4o-prod
              api_version: 2024-08-01-preview
              model_name: gpt-4o
            azure_blob:
              connection_string: "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=1"
              default_container: surveys
            databricks:
              workspace_url: https://adb-1.azuredatabricks.net
              token: dapi-1
              cluster_id: 0101-abc
              default_notebook_path: /Workspace/agent/test
              survey_notebooks:
                ingestion: /Workspace/survey/data_ingestion
                categories: /Workspace/survey/creation_of_categories
        "#})
        .unwrap();

        match &settings.provider {
            ProviderConfig::Azure(config) => {
                assert_eq!(config.deployment, "gpt-4o-prod");
                assert_eq!(config.api_version, "2024-08-01-preview");
            }
            _ => panic!("Expected Azure provider"),
        }
        assert_eq!(settings.azure_blob.unwrap().default_container, "surveys");
        let databricks = settings.databricks.unwrap();
        assert_eq!(databricks.poll_interval_secs, 5);
        assert_eq!(databricks.survey_mount, "/mnt/dls/");
        assert_eq!(
            databricks.survey_notebooks.unwrap().categories,
            "/Workspace/survey/creation_of_categories"
        );
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("TOOLCHAT_SERVER__PORT", "8080");
        env::set_var("TOOLCHAT_PROVIDER__API_KEY", "env-key");
        env::set_var("TOOLCHAT_PROVIDER__TEMPERATURE", "0.2");
        env::set_var("TOOLCHAT_AGENT__MAX_OUTPUT_TOKENS", "512");

        let settings = Settings::from_yaml_str("provider:\n  type: openai\n").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.max_output_tokens, 512);
        match settings.provider {
            ProviderConfig::OpenAi(config) => {
                assert_eq!(config.api_key, "env-key");
                assert_eq!(config.temperature, Some(0.2));
            }
            _ => panic!("Expected OpenAI provider"),
        }

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_api_key_names_env_var() {
        clean_env();
        let err = Settings::from_yaml_str("provider:\n  type: openai\n").unwrap_err();
        match err {
            ConfigError::MissingField { env_var } => {
                assert_eq!(env_var, "TOOLCHAT_PROVIDER__API_KEY")
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error_when_named() {
        clean_env();
        let result = Settings::load(Some(Path::new("/definitely/not/here.yaml")));
        assert!(matches!(result, Err(ConfigError::Other(_))));
    }

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("provider.api_key"), "TOOLCHAT_PROVIDER__API_KEY");
        assert_eq!(to_env_var("provider"), "TOOLCHAT_PROVIDER");
    }

    #[test]
    fn test_server_address_accepts_hostnames() {
        let server = ServerSettings {
            host: "localhost".to_string(),
            port: 5001,
        };
        assert_eq!(server.address(), ("localhost", 5001));
        let resolved: Vec<SocketAddr> = server.address().to_socket_addrs().unwrap().collect();
        assert!(resolved.iter().all(|addr| addr.port() == 5001 && addr.ip().is_loopback()));
        assert!(!resolved.is_empty());
    }

    #[test]
    fn test_local_folder_expands_tilde() {
        let settings = LocalStorageSettings {
            folder: "~/toolchat-data".to_string(),
        };
        assert!(!settings.folder_path().starts_with("~"));
    }
}
