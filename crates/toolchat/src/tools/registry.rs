use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::error::ToolResult;
use super::provider::{ToolHandler, ToolProvider};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Arguments, ToolSpec};

/// Aggregates every provider into one flat dispatch table and one schema list.
///
/// The table is built once and never changes afterwards. Handlers keep their providers alive
/// through the clones they capture, so the registry does not own provider state itself.
pub struct ToolRegistry {
    tools: HashMap<String, ToolHandler>,
    tools_description: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// Merge the providers in order. Fails when a provider's callables and schemas disagree, or
    /// when two providers declare the same tool name.
    pub fn new(providers: Vec<Arc<dyn ToolProvider>>) -> AgentResult<Self> {
        let mut tools: HashMap<String, ToolHandler> = HashMap::new();
        let mut tools_description = Vec::new();
        let mut owners: HashMap<String, String> = HashMap::new();

        for provider in &providers {
            let provider_tools = provider.get_tools();
            let provider_description = provider.get_tools_description();
            Self::check_conformance(provider.name(), &provider_tools, &provider_description)?;

            for spec in &provider_description {
                if let Some(owner) = owners.get(&spec.name) {
                    return Err(AgentError::Configuration(format!(
                        "tool '{}' from provider '{}' is already registered by provider '{}'",
                        spec.name,
                        provider.name(),
                        owner
                    )));
                }
                owners.insert(spec.name.clone(), provider.name().to_string());
            }

            info!(
                provider = provider.name(),
                tools = provider_tools.len(),
                "registered tool provider"
            );
            tools.extend(provider_tools);
            tools_description.extend(provider_description);
        }

        Ok(Self {
            tools,
            tools_description,
        })
    }

    /// A provider conforms when its schemas describe exactly the callables it exposes
    fn check_conformance(
        provider: &str,
        tools: &HashMap<String, ToolHandler>,
        description: &[ToolSpec],
    ) -> AgentResult<()> {
        let mut described = HashSet::new();
        for spec in description {
            if !described.insert(spec.name.as_str()) {
                return Err(AgentError::Configuration(format!(
                    "provider '{}' describes tool '{}' more than once",
                    provider, spec.name
                )));
            }
        }

        let callable: HashSet<&str> = tools.keys().map(String::as_str).collect();
        if callable != described {
            let mut undescribed: Vec<_> = callable.difference(&described).collect();
            let mut uncallable: Vec<_> = described.difference(&callable).collect();
            undescribed.sort();
            uncallable.sort();
            return Err(AgentError::Configuration(format!(
                "provider '{}' does not conform: tools without schema {:?}, schemas without tool {:?}",
                provider, undescribed, uncallable
            )));
        }
        Ok(())
    }

    /// All registered tool names
    pub fn list_tools(&self) -> BTreeSet<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolHandler> {
        self.tools.get(name)
    }

    /// Every schema, in provider order then per-provider order
    pub fn tools_description(&self) -> &[ToolSpec] {
        &self.tools_description
    }

    /// Run a tool by name. An unknown name is an ordinary outcome reported to the model as the
    /// tool's result; failures raised by the tool itself are passed to the caller untouched.
    pub async fn execute_tool(&self, name: &str, arguments: Arguments) -> ToolResult<Value> {
        let Some(tool) = self.get_tool(name) else {
            error!(tool = name, "Unknown tool");
            return Ok(json!({ "error": format!("Unknown tool '{}'", name) }));
        };

        info!(tool = name, arguments = ?arguments, "Executing tool");
        let result = tool(arguments).await;
        debug!(tool = name, ok = result.is_ok(), "tool finished");
        result
    }
}
