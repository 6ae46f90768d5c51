use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::error::{ToolError, ToolResult};
use crate::models::tool::{Arguments, ToolSpec};

/// The future a tool callable resolves to: the free-form result mapping or a tool failure
pub type ToolFuture = BoxFuture<'static, ToolResult<Value>>;

/// A callable tool, invoked with its keyword arguments
pub type ToolHandler = Arc<dyn Fn(Arguments) -> ToolFuture + Send + Sync>;

/// Name to callable table exposed by a provider
pub type ToolMap = HashMap<String, ToolHandler>;

/// One family of operations the model may invoke
pub trait ToolProvider: Send + Sync {
    /// Name used in logs and configuration errors
    fn name(&self) -> &str;

    /// Every callable this provider exposes, keyed by tool name
    fn get_tools(&self) -> ToolMap;

    /// The schemas for exactly the names returned by `get_tools`
    fn get_tools_description(&self) -> Vec<ToolSpec>;
}

/// Wrap an async function as a ToolHandler
pub fn tool_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult<Value>> + Send + 'static,
{
    Arc::new(move |arguments| Box::pin(f(arguments)))
}

/// Read an optional string argument. Models sometimes send `""` or `"{}"` for parameters they
/// mean to leave out, so both count as absent.
pub fn optional_str(arguments: &Arguments, key: &str) -> ToolResult<Option<String>> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() || s == "{}" => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(ToolError::InvalidParameters(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

pub fn required_str(arguments: &Arguments, key: &str) -> ToolResult<String> {
    optional_str(arguments, key)?
        .ok_or_else(|| ToolError::InvalidParameters(format!("'{}' parameter required", key)))
}

/// Read an optional object argument, treating empty strings the same as absent
pub fn optional_object(arguments: &Arguments, key: &str) -> ToolResult<Option<Arguments>> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() || s == "{}" => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => Err(ToolError::InvalidParameters(format!(
                "'{}' must be an object",
                key
            ))),
        },
        Some(other) => Err(ToolError::InvalidParameters(format!(
            "'{}' must be an object, got {}",
            key, other
        ))),
    }
}

/// Reject keyword arguments the tool does not declare, the way a keyword-only call would
pub fn reject_unknown(arguments: &Arguments, allowed: &[&str]) -> ToolResult<()> {
    match arguments.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(unknown) => Err(ToolError::InvalidParameters(format!(
            "unexpected argument '{}'",
            unknown
        ))),
        None => Ok(()),
    }
}
