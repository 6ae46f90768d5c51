use anyhow::{anyhow, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use super::base::{ModelResponse, Usage};
use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolSpec};

/// Check every message before any request goes out
pub fn validate_messages(messages: &[Message]) -> AgentResult<()> {
    messages.iter().try_for_each(Message::validate)
}

/// Convert messages to OpenAI's chat message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut converted = json!({
                "role": message.role.as_str(),
                "content": message.content,
            });

            if !message.tool_calls.is_empty() {
                converted["tool_calls"] = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.function_name,
                                "arguments": call.arguments_json(),
                            }
                        })
                    })
                    .collect();
            }
            if let Some(id) = &message.tool_call_id {
                converted["tool_call_id"] = json!(id);
            }
            converted
        })
        .collect()
}

/// Convert tool specs to OpenAI's function tool specification
pub fn tools_to_openai_spec(tools: &[ToolSpec]) -> Result<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Decode the first choice of an OpenAI chat completion.
///
/// Tool call arguments arrive as JSON text; text that does not parse to an object fails the
/// whole response.
pub fn openai_response_to_model_response(response: &Value) -> Result<ModelResponse> {
    let message = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("Response carried no choices: {}", response))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call["id"]
                .as_str()
                .ok_or_else(|| anyhow!("Tool call without an id: {}", call))?;
            let function_name = call["function"]["name"]
                .as_str()
                .ok_or_else(|| anyhow!("Tool call '{}' without a function name", id))?;
            let raw_arguments = call["function"]["arguments"].as_str().unwrap_or_default();

            let arguments: Map<String, Value> = match serde_json::from_str(raw_arguments) {
                Ok(Value::Object(arguments)) => arguments,
                Ok(other) => {
                    return Err(anyhow!(
                        "Tool call '{}' arguments must be a JSON object, got {}",
                        id,
                        other
                    ))
                }
                Err(e) => {
                    return Err(anyhow!(
                        "Could not interpret tool use parameters for id {}: {}",
                        id,
                        e
                    ))
                }
            };

            tool_calls.push(ToolCall::new(id, function_name, arguments));
        }
    }

    Ok(ModelResponse {
        content,
        tool_calls,
        usage: get_usage(response),
    })
}

pub fn get_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };
    let read = |key: &str| usage.get(key).and_then(Value::as_i64).map(|v| v as i32);

    let input_tokens = read("prompt_tokens");
    let output_tokens = read("completion_tokens");
    let total_tokens = read("total_tokens").or(match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

/// Send a chat completion request and return the JSON body of a successful reply
pub async fn send_chat_request(request: RequestBuilder) -> Result<Value> {
    let response = request.send().await?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .unwrap_or_else(|_| json!({ "error": { "message": "unreadable response body" } }));

    if let Some(error) = body.get("error") {
        if let Some(err) = check_openai_context_length_error(error) {
            return Err(err.into());
        }
    }

    match status {
        StatusCode::OK => Ok(body),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
            Err(anyhow!("Server error: {}: {}", status, body))
        }
        status => Err(anyhow!("Request failed: {}: {}", status, body)),
    }
}
