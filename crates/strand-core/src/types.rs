use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StrandError;

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message in a model-backed node's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// An assistant turn requesting tool calls.
    pub fn assistant_tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
        content.extend(calls.into_iter().map(|call| ContentBlock::ToolUse {
            id: call.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: call.name,
            input: call.args,
        }));
        Self {
            role: Role::Assistant,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolResult { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool calls requested by this message, in order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                    id: Some(id.clone()),
                    name: name.clone(),
                    args: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// A request to run a tool node, usually emitted by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            args,
        }
    }
}

/// Tool definition offered to a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Data flowing into and out of nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Text(String),
    Message(ChatMessage),
    ToolCall(ToolCall),
    Json(Value),
    /// Outputs of parallel branches, fed back after a join.
    Batch(Vec<Payload>),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    /// Human-readable content of the payload.
    pub fn content(&self) -> String {
        match self {
            Payload::Text(t) => t.clone(),
            Payload::Message(m) => m.text(),
            Payload::ToolCall(c) => serde_json::to_string(c).unwrap_or_default(),
            Payload::Json(Value::String(s)) => s.clone(),
            Payload::Json(v) => v.to_string(),
            Payload::Batch(items) => items
                .iter()
                .map(Payload::content)
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    /// The value bound to `$output` in edge conditions.
    pub fn as_output_context(&self) -> Value {
        match self {
            Payload::Json(v) => v.clone(),
            _ => Value::Object(Map::new()),
        }
    }

    /// Convert into the messages a model-backed node appends to its history.
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            Payload::Message(m) => vec![m],
            Payload::Batch(items) => items.into_iter().flat_map(Payload::into_messages).collect(),
            other => vec![ChatMessage::user(other.content())],
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

/// Closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "LLMNode")]
    Llm,
    #[serde(rename = "ToolNode")]
    Tool,
    #[serde(rename = "FunctionNode")]
    Function,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Llm => "LLMNode",
            NodeKind::Tool => "ToolNode",
            NodeKind::Function => "FunctionNode",
        }
    }

    /// Lowercase form used in composite ids.
    pub fn short_name(&self) -> &'static str {
        match self {
            NodeKind::Llm => "llm",
            NodeKind::Tool => "tool",
            NodeKind::Function => "function",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = StrandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "LLMNode" | "llm" => Ok(NodeKind::Llm),
            "ToolNode" | "tool" => Ok(NodeKind::Tool),
            "FunctionNode" | "function" => Ok(NodeKind::Function),
            other => Err(StrandError::UnsupportedKind(other.to_string())),
        }
    }
}

/// Per-run, per-node mutable data owned by one actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeState {
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub input: Option<Payload>,
    #[serde(default)]
    pub output: Option<Payload>,
    /// Free-form context; bare names in edge conditions resolve here first.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl NodeState {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            messages: Vec::new(),
            input: None,
            output: None,
            context: Map::new(),
        }
    }

    /// Text of the last assistant message, falling back to the last output.
    pub fn last_response(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(ChatMessage::text)
            .or_else(|| self.output.as_ref().map(Payload::content))
    }
}

/// A declared transition to another node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeSpec {
    pub target: String,
    #[serde(default = "default_target_kind")]
    pub target_kind: NodeKind,
    /// Condition gating the edge; absent means always followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Ids of edges this one depends on. Interpreted by the owning node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
}

fn default_target_kind() -> NodeKind {
    NodeKind::Function
}

impl EdgeSpec {
    /// An unconditional edge to a function node.
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            target_kind: NodeKind::Function,
            when: None,
            id: None,
            depends: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.target_kind = kind;
        self
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.when = Some(condition.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// What a node sees about the execution it runs in.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub actor_id: Uuid,
    pub execution_id: Uuid,
    pub node_name: String,
    pub node_kind: NodeKind,
    /// Values supplied by the caller and pre-execution hooks.
    pub values: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_kind_wire_names() {
        assert_eq!(serde_json::to_string(&NodeKind::Llm).unwrap(), "\"LLMNode\"");
        assert_eq!("ToolNode".parse::<NodeKind>().unwrap(), NodeKind::Tool);
        assert_eq!("function".parse::<NodeKind>().unwrap(), NodeKind::Function);
        assert!(matches!(
            "SubgraphNode".parse::<NodeKind>(),
            Err(StrandError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn test_tool_calls_from_message() {
        let msg = ChatMessage::assistant_tool_calls(
            "checking",
            vec![ToolCall::new("search", json!({"q": "rust"}))],
        );
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert!(calls[0].id.is_some());
        assert_eq!(msg.text(), "checking");
    }

    #[test]
    fn test_output_context() {
        assert_eq!(
            Payload::Json(json!({"n": 1})).as_output_context(),
            json!({"n": 1})
        );
        assert_eq!(Payload::text("x").as_output_context(), json!({}));
    }

    #[test]
    fn test_batch_content_joined_by_blank_line() {
        let batch = Payload::Batch(vec![Payload::text("a"), Payload::text("b")]);
        assert_eq!(batch.content(), "a\n\nb");
        assert_eq!(batch.into_messages().len(), 2);
    }

    #[test]
    fn test_last_response_prefers_assistant() {
        let mut state = NodeState::new(NodeKind::Llm, "chat");
        state.output = Some(Payload::text("raw"));
        assert_eq!(state.last_response().as_deref(), Some("raw"));
        state.messages.push(ChatMessage::user("hi"));
        state.messages.push(ChatMessage::assistant_text("hello"));
        assert_eq!(state.last_response().as_deref(), Some("hello"));
    }

    #[test]
    fn test_edge_defaults_from_json() {
        let edge: EdgeSpec = serde_json::from_value(json!({"target": "next"})).unwrap();
        assert_eq!(edge, EdgeSpec::to("next"));
        let gated = EdgeSpec::to("b").kind(NodeKind::Tool).when("$output.ok");
        assert_eq!(gated.target_kind, NodeKind::Tool);
        assert_eq!(gated.when.as_deref(), Some("$output.ok"));
    }
}
