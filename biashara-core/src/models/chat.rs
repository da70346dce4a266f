// biashara-core/src/models/chat.rs
use super::tools::ToolCall;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a message. `Tool` is a tool-result message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// Represents a message in the chat history sequence sent to/from the model.
///
/// `content` is `None` on an assistant message that only requests tools.
/// `name` identifies the tool that produced a tool-result message.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// The assistant turn that asked for `calls`. Content is null by protocol.
    pub fn tool_request(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(calls),
            ..Default::default()
        }
    }

    /// The answer to the tool call `call_id`, produced by `tool_name`.
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(output.into()),
            name: Some(tool_name.into()),
            tool_call_id: Some(call_id.into()),
            ..Default::default()
        }
    }

    /// True when this message asks the caller to run at least one tool.
    pub fn requests_tools(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// A user turn, or an assistant turn with text that has nothing to do with tools.
    pub fn is_plain_dialogue(&self) -> bool {
        let has_text = self
            .content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        match self.role {
            Role::User => has_text,
            Role::Assistant => has_text && self.name.is_none() && !self.requests_tools(),
            Role::System | Role::Tool => false,
        }
    }
}

/// Represents one of the choices returned by the model API.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Represents the overall structure of the model API response.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiResponse {
    pub id: String,
    pub choices: Vec<Choice>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tools::{ToolCall, ToolFunction};
    use serde_json::json;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::system("hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({ "role": "system", "content": "hi" }));
    }

    #[test]
    fn test_tool_request_serializes_null_content() {
        let msg = ChatMessage::tool_request(vec![ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: ToolFunction {
                name: "web_search".into(),
                arguments: "{}".into(),
            },
        }]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["content"], serde_json::Value::Null);
        assert_eq!(value["tool_calls"][0]["id"], "call_1");
    }

    #[test]
    fn test_plain_dialogue_filter() {
        assert!(ChatMessage::user("hello").is_plain_dialogue());
        assert!(ChatMessage::assistant("hi there").is_plain_dialogue());
        assert!(!ChatMessage::user("   ").is_plain_dialogue());
        assert!(!ChatMessage::system("summary").is_plain_dialogue());
        assert!(!ChatMessage::tool_result("c", "web_search", "out").is_plain_dialogue());

        let mut named = ChatMessage::assistant("from a tool");
        named.name = Some("query_data".into());
        assert!(!named.is_plain_dialogue());

        let request = ChatMessage::tool_request(vec![]);
        assert!(!request.is_plain_dialogue());
    }
}
