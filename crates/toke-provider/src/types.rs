//! Conversation model shared by every provider client.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[serde(alias = "human")]
    User,
    Assistant,
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A model-requested function invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    pub input: String,
    #[serde(default)]
    pub finished: bool,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: input.into(),
            finished: true,
        }
    }
}

/// Output of a tool, sent back to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn that requested tools.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::text(Role::Assistant, content)
        }
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            tool_results: results,
            ..Self::text(Role::Tool, "")
        }
    }
}

/// A function the model may call.
///
/// `parameters` holds the JSON-schema properties object; clients wrap it in
/// `{"type": "object", "properties": ..., "required": ...}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            required: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_required<I, S>(mut self, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = required.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": self.parameters,
                    "required": self.required,
                },
            },
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    #[default]
    Unknown,
}

impl FinishReason {
    /// OpenAI-compatible vocabulary.
    pub fn from_openai(raw: &str) -> Self {
        match raw {
            "stop" => Self::EndTurn,
            "length" => Self::MaxTokens,
            "tool_calls" => Self::ToolUse,
            _ => Self::Unknown,
        }
    }

    /// GLM servers also send `max_tokens` and `function_call`, and anything
    /// unrecognised ends the turn.
    pub fn from_glm(raw: &str) -> Self {
        match raw {
            "length" | "max_tokens" => Self::MaxTokens,
            "tool_calls" | "function_call" => Self::ToolUse,
            _ => Self::EndTurn,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
}

impl ProviderResponse {
    /// Any tool call forces [`FinishReason::ToolUse`].
    pub fn new(
        content: String,
        tool_calls: Vec<ToolCall>,
        usage: TokenUsage,
        finish_reason: FinishReason,
    ) -> Self {
        let finish_reason = if tool_calls.is_empty() {
            finish_reason
        } else {
            FinishReason::ToolUse
        };
        Self {
            content,
            tool_calls,
            usage,
            finish_reason,
        }
    }
}

/// One step of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    ContentStart,
    ContentDelta { content: String },
    ContentStop,
    ToolUseStart { tool_call: ToolCall },
    /// A fragment of the arguments of the call with `id`.
    ToolUseDelta { id: String, arguments: String },
    ToolUseStop { tool_call: ToolCall },
    Complete { response: ProviderResponse },
    Error { error: ProviderError },
}

impl ProviderEvent {
    /// `Complete` and `Error` end a stream.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_vocabularies() {
        assert_eq!(FinishReason::from_openai("stop"), FinishReason::EndTurn);
        assert_eq!(FinishReason::from_openai("length"), FinishReason::MaxTokens);
        assert_eq!(FinishReason::from_openai("tool_calls"), FinishReason::ToolUse);
        assert_eq!(FinishReason::from_openai("content_filter"), FinishReason::Unknown);

        assert_eq!(FinishReason::from_glm("max_tokens"), FinishReason::MaxTokens);
        assert_eq!(FinishReason::from_glm("function_call"), FinishReason::ToolUse);
        assert_eq!(FinishReason::from_glm("eos"), FinishReason::EndTurn);
    }

    #[test]
    fn tool_calls_force_tool_use() {
        let response = ProviderResponse::new(
            String::new(),
            vec![ToolCall::new("call_1", "ls", "{}")],
            TokenUsage::default(),
            FinishReason::EndTurn,
        );
        assert_eq!(response.finish_reason, FinishReason::ToolUse);
    }

    #[test]
    fn events_are_tagged_by_type() {
        let json = serde_json::to_value(ProviderEvent::ContentDelta {
            content: "Hi".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "content_delta", "content": "Hi"}));
        assert!(ProviderEvent::Error {
            error: ProviderError::Cancelled
        }
        .is_terminal());
        assert!(!ProviderEvent::ContentStop.is_terminal());
    }

    #[test]
    fn human_role_reads_as_user() {
        let msg: Message = serde_json::from_str(r#"{"role":"human","content":"hey"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.role.as_str(), "user");
    }

    #[test]
    fn tool_definition_wraps_properties() {
        let tool = ToolDefinition::new(
            "read_file",
            "Read a file",
            serde_json::json!({"path": {"type": "string"}}),
        )
        .with_required(["path"]);
        let wire = tool.to_wire();
        assert_eq!(wire["function"]["parameters"]["type"], "object");
        assert_eq!(wire["function"]["parameters"]["required"][0], "path");
        assert_eq!(wire["function"]["parameters"]["properties"]["path"]["type"], "string");
    }
}
