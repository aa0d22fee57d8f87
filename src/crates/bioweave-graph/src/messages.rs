//! Message types for agent conversations
//!
//! A conversation is an ordered sequence of immutable [`Message`] values.
//! Identity is carried by `id` (for deduplication in [`add_messages`]) and
//! by `tool_call_id`, which is the only cross-message join key: every
//! [`ToolCall`] on an assistant message is answered by exactly one tool
//! message carrying the same id.
//!
//! # Examples
//!
//! ```rust
//! use bioweave_graph::messages::{Message, add_messages};
//!
//! let history = vec![
//!     Message::human("What regulates BRCA1?").with_id("m1"),
//!     Message::assistant("Let me search.").with_id("m2"),
//! ];
//! let update = vec![Message::assistant("BRCA1 is regulated by...").with_id("m3")];
//!
//! let merged = add_messages(history, update);
//! assert_eq!(merged.len(), 3);
//! ```
//!
//! Multimodal content (text plus image references from sandbox artifacts)
//! is carried as [`ContentPart`] lists; plain strings remain the common
//! case and serialize untagged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role of the message sender in a conversation.
///
/// Serializes to lowercase strings matching provider wire formats:
/// `system`, `human`, `assistant`, `tool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions or context for the model
    System,
    /// Input from the user
    Human,
    /// Model output, possibly carrying tool calls
    Assistant,
    /// Result of a tool execution, joined to its call by `tool_call_id`
    Tool,
}

/// A single tool invocation requested by an assistant message.
///
/// `args` is a JSON mapping (string keys to arbitrary values). The
/// dispatcher guarantees a matching tool message for every call id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Stable identifier joining this call to its tool message
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// Arguments as a JSON object
    pub args: Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Token usage reported by a provider for one assistant message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub input_tokens: u64,
    /// Tokens produced in the completion
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Create a new usage record
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Individual content block in a multimodal message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Textual content
    Text {
        /// The text content
        text: String,
    },
    /// Image content, either a URL/path reference or embedded base64 data
    Image {
        /// Image URL or host path (mutually exclusive with `source`)
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Base64 image payload with media type (mutually exclusive with `url`)
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<Value>,
    },
}

impl ContentPart {
    /// Create a text content part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image content part from a URL or host path
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::Image {
            url: Some(url.into()),
            source: None,
        }
    }

    /// Create an image content part from base64 data
    pub fn image_data(media_type: &str, data: &str) -> Self {
        Self::Image {
            url: None,
            source: Some(serde_json::json!({
                "type": "base64",
                "media_type": media_type,
                "data": data,
            })),
        }
    }
}

/// Message content: a plain string or a list of typed blocks.
///
/// Untagged serialization so text messages stay plain JSON strings on the
/// wire while multimodal messages become block arrays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Multimodal content blocks
    Parts(Vec<ContentPart>),
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        Self::Parts(parts)
    }
}

/// A single message in a conversation.
///
/// Messages are immutable after creation; builders return new values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique identifier, used for deduplication in [`add_messages`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Role of the sender
    pub role: MessageRole,

    /// Message content
    pub content: MessageContent,

    /// Optional name (tool messages carry the tool name here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Ordered tool calls (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Id of the tool call this message answers (tool messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Provider-reported token usage (assistant messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    /// Create a new message with a generated id
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            usage: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a human message
    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create a tool message answering the given call id
    pub fn tool(content: impl Into<MessageContent>, tool_call_id: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role: MessageRole::Tool,
            content: content.into(),
            name: None,
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            usage: None,
        }
    }

    /// Set the message id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the message name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set tool calls (assistant messages)
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    /// Set token usage (assistant messages)
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// True if this is an assistant message
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    /// True if this is a tool message
    pub fn is_tool(&self) -> bool {
        self.role == MessageRole::Tool
    }

    /// True if this assistant message carries at least one tool call
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().map(|t| !t.is_empty()).unwrap_or(false)
    }

    /// The tool calls on this message, empty when absent
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    /// Plain text content, `None` for multimodal messages
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(s) => Some(s),
            MessageContent::Parts(_) => None,
        }
    }
}

/// Extract plain text from message content.
///
/// Multimodal block lists flatten to text with `[image]` placeholders for
/// image blocks, joined by newlines. Used by compaction and by the results
/// formatting helpers, which must never carry raw image payloads into a
/// text summary.
pub fn content_to_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(s) => s.clone(),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ContentPart::Text { text } => text.clone(),
                ContentPart::Image { .. } => "[image]".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Append-merge reducer for message sequences.
///
/// Concatenates `right` onto `left`. A right-hand message whose id already
/// exists in the accumulated sequence replaces that message in place rather
/// than appending a duplicate; messages without ids always append. The
/// result is strictly non-shorter than `left`, which keeps the conversation
/// log append-only across node executions.
pub fn add_messages(left: Vec<Message>, right: Vec<Message>) -> Vec<Message> {
    let mut merged = left;
    for msg in right {
        let existing = msg.id.as_ref().and_then(|id| {
            merged
                .iter()
                .position(|m| m.id.as_deref() == Some(id.as_str()))
        });
        match existing {
            Some(idx) => merged[idx] = msg,
            None => merged.push(msg),
        }
    }
    merged
}

/// Get the last message of a sequence
pub fn last_message(messages: &[Message]) -> Option<&Message> {
    messages.last()
}
