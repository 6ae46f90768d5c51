use thiserror::Error;

/// Failure raised by a tool callable. Expected outcomes such as a missing file are reported
/// inside the tool result instead; these are the failures the tool could not turn into one.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolError>;
