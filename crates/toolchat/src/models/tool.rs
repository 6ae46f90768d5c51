use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Keyword arguments for a tool call, always a json object
pub type Arguments = Map<String, Value>;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    /// The name of the tool, unique across the registry
    pub name: String,
    /// A description of what the tool does, shown to the model
    pub description: String,
    /// JSON schema describing the accepted keyword arguments
    pub parameters: Value,
}

impl ToolSpec {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Opaque id, unique within one model response
    pub id: String,
    /// The name of the tool to execute
    pub function_name: String,
    /// The parsed keyword arguments
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new<I, N>(id: I, function_name: N, arguments: Arguments) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            function_name: function_name.into(),
            arguments,
        }
    }

    /// The arguments as the json text the endpoint originally sent
    pub fn arguments_json(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}
