use thiserror::Error;

use crate::tools::ToolError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    /// Tool registry could not be assembled, detected before any conversation starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A message does not have the shape the model endpoint accepts
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network, auth or malformed-response failure from the model endpoint
    #[error("Provider error: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("Tool '{name}' failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: ToolError,
    },
}

impl AgentError {
    pub fn provider<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        AgentError::Provider(error.into())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_provider_error_keeps_cause() {
        let error = AgentError::provider(anyhow::anyhow!("connection refused"));
        assert_eq!(error.to_string(), "Provider error: connection refused");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_tool_execution_names_the_tool() {
        let error = AgentError::ToolExecution {
            name: "delete_blob".to_string(),
            source: ToolError::ExecutionError("disk full".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Tool 'delete_blob' failed: Tool execution failed: disk full"
        );
    }
}
