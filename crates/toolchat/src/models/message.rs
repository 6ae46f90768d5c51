use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::role::Role;
use super::tool::ToolCall;
use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One turn of a conversation
pub struct Message {
    pub role: Role,
    /// Absent only on assistant messages that carry tool calls
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Links a tool result back to the request that produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: Option<String>) -> Self {
        Message {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system<S: Into<String>>(text: S) -> Self {
        Self::new(Role::System, Some(text.into()))
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Self::new(Role::User, Some(text.into()))
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Self::new(Role::Assistant, Some(text.into()))
    }

    /// An assistant message that only records which tools the model asked for
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Message {
            tool_calls,
            ..Self::new(Role::Assistant, None)
        }
    }

    /// A tool result, with the result mapping serialized verbatim as content
    pub fn tool<I: Into<String>, S: Into<String>>(tool_call_id: I, content: S) -> Self {
        Message {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, Some(content.into()))
        }
    }

    /// Parse a message from its json representation, rejecting unknown roles
    pub fn from_value(value: Value) -> AgentResult<Self> {
        let message: Message = serde_json::from_value(value)
            .map_err(|e| AgentError::Validation(format!("malformed message: {}", e)))?;
        message.validate()?;
        Ok(message)
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Check the message has the shape the chat completion endpoint accepts for its role
    pub fn validate(&self) -> AgentResult<()> {
        if self.role != Role::Assistant && !self.tool_calls.is_empty() {
            return Err(AgentError::Validation(format!(
                "only assistant messages may carry tool calls, found them on a {} message",
                self.role
            )));
        }
        if self.role != Role::Tool && self.tool_call_id.is_some() {
            return Err(AgentError::Validation(format!(
                "only tool messages may carry a tool_call_id, found one on a {} message",
                self.role
            )));
        }

        match self.role {
            Role::Assistant => {
                if self.content.is_none() && self.tool_calls.is_empty() {
                    return Err(AgentError::Validation(
                        "assistant message needs content or tool calls".to_string(),
                    ));
                }
            }
            Role::Tool => {
                if self.tool_call_id.is_none() {
                    return Err(AgentError::Validation(
                        "tool message is missing its tool_call_id".to_string(),
                    ));
                }
                if self.content.is_none() {
                    return Err(AgentError::Validation(
                        "tool message is missing its content".to_string(),
                    ));
                }
            }
            Role::System | Role::User => {
                if self.content.is_none() {
                    return Err(AgentError::Validation(format!(
                        "{} message is missing its content",
                        self.role
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Verify every tool result answers exactly one request of the assistant message right before
/// it, and every request got exactly one answer before the conversation moved on.
pub fn check_pairing(conversation: &[Message]) -> AgentResult<()> {
    let mut index = 0;
    while index < conversation.len() {
        let message = &conversation[index];
        match message.role {
            Role::Tool => {
                return Err(AgentError::Validation(format!(
                    "tool message at position {} does not follow an assistant tool call",
                    index
                )));
            }
            Role::Assistant if message.has_tool_calls() => {
                let expected: Vec<&str> = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
                let answers: Vec<&Message> = conversation[index + 1..]
                    .iter()
                    .take_while(|m| m.role == Role::Tool)
                    .collect();

                if answers.len() != expected.len() {
                    return Err(AgentError::Validation(format!(
                        "assistant message at position {} requested {} tools but got {} results",
                        index,
                        expected.len(),
                        answers.len()
                    )));
                }
                let answered: Vec<&str> = answers
                    .iter()
                    .map(|m| m.tool_call_id.as_deref().unwrap_or_default())
                    .collect();
                for (offset, id) in answered.iter().enumerate() {
                    if !expected.contains(id) {
                        return Err(AgentError::Validation(format!(
                            "tool message at position {} answers unknown tool call '{}'",
                            index + 1 + offset,
                            id
                        )));
                    }
                }
                for id in &expected {
                    let count = answered.iter().filter(|a| *a == id).count();
                    if count != 1 {
                        return Err(AgentError::Validation(format!(
                            "tool call '{}' was answered {} times",
                            id, count
                        )));
                    }
                }
                index += 1 + answers.len();
                continue;
            }
            _ => {}
        }
        index += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::Arguments;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "get_weather", Arguments::new())
    }

    #[test]
    fn test_constructors_produce_valid_messages() {
        for message in [
            Message::system("be helpful"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::assistant_tool_calls(vec![call("1")]),
            Message::tool("1", "{}"),
        ] {
            message.validate().unwrap();
        }
    }

    #[test]
    fn test_tool_message_serializes_with_id() {
        let value = serde_json::to_value(Message::tool("abc", r#"{"status":"success"}"#)).unwrap();
        assert_eq!(
            value,
            json!({"role": "tool", "content": "{\"status\":\"success\"}", "tool_call_id": "abc"})
        );
    }

    #[test]
    fn test_from_value_rejects_unknown_role() {
        let err = Message::from_value(json!({"role": "robot", "content": "beep"})).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
        assert!(err.to_string().contains("unrecognized role 'robot'"));
    }

    #[test]
    fn test_from_value_rejects_missing_role() {
        let err = Message::from_value(json!({"content": "beep"})).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_empty_assistant() {
        let message = Message {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![],
            tool_call_id: None,
        };
        assert!(matches!(message.validate(), Err(AgentError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_user_without_content() {
        let message = Message {
            role: Role::User,
            content: None,
            tool_calls: vec![],
            tool_call_id: None,
        };
        assert!(message.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tool_without_id() {
        let mut message = Message::tool("1", "{}");
        message.tool_call_id = None;
        assert!(message.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tool_calls_on_user() {
        let mut message = Message::user("hi");
        message.tool_calls.push(call("1"));
        assert!(message.validate().is_err());
    }

    #[test]
    fn test_check_pairing_accepts_complete_exchange() {
        let conversation = vec![
            Message::system("sys"),
            Message::user("weather in paris and rome?"),
            Message::assistant_tool_calls(vec![call("a"), call("b")]),
            Message::tool("a", "{}"),
            Message::tool("b", "{}"),
            Message::assistant("sunny in both"),
        ];
        check_pairing(&conversation).unwrap();
    }

    #[test]
    fn test_check_pairing_rejects_missing_result() {
        let conversation = vec![
            Message::user("weather?"),
            Message::assistant_tool_calls(vec![call("a"), call("b")]),
            Message::tool("a", "{}"),
            Message::assistant("done"),
        ];
        assert!(check_pairing(&conversation).is_err());
    }

    #[test]
    fn test_check_pairing_rejects_orphan_result() {
        let conversation = vec![Message::user("weather?"), Message::tool("a", "{}")];
        assert!(check_pairing(&conversation).is_err());
    }

    #[test]
    fn test_check_pairing_rejects_mismatched_id() {
        let conversation = vec![
            Message::assistant_tool_calls(vec![call("a")]),
            Message::tool("z", "{}"),
        ];
        assert!(check_pairing(&conversation).is_err());
    }

    #[test]
    fn test_check_pairing_rejects_answering_same_id_twice() {
        let conversation = vec![
            Message::assistant_tool_calls(vec![call("a"), call("b")]),
            Message::tool("a", "{}"),
            Message::tool("a", "{}"),
        ];
        assert!(check_pairing(&conversation).is_err());
    }
}
