//! Chat-model trait and request/response types
//!
//! The graph crate is an orchestration engine, not an LLM client library:
//! it defines the [`ChatModel`] trait and the request/response shapes, and
//! the `bioweave-llm` crate implements them for concrete providers. Agents
//! hold `Arc<dyn ChatModel>` and never see provider details; tests script
//! conversations by implementing the trait over a canned transcript.

use crate::error::Result;
use crate::messages::{Message, TokenUsage};
use crate::tool::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Provider-tunable generation parameters.
///
/// Each provider honours the subset it understands and the gateway strips
/// what a given model cannot accept (see the gateway's kwargs handling).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Anthropic: overall completion budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// OpenAI/Azure: completion token cap (stripped for models that do not
    /// accept it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,

    /// OpenAI reasoning models: effort level (stripped for Azure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,

    /// Anthropic: extended-thinking token budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_budget_tokens: Option<u32>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A single chat request: conversation plus bound tools and config.
#[derive(Clone)]
pub struct ChatRequest {
    /// Ordered conversation
    pub messages: Vec<Message>,
    /// Tools bound for tool-calling (empty = no tool use)
    pub tools: Vec<ToolDefinition>,
    /// Whether the model may emit multiple tool calls per turn
    pub parallel_tool_calls: bool,
    /// Generation parameters
    pub config: ChatConfig,
}

impl ChatRequest {
    /// Create a request from a conversation
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            parallel_tool_calls: true,
            config: ChatConfig::default(),
        }
    }

    /// Bind tools for tool-calling
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set whether parallel tool calls are allowed
    pub fn with_parallel_tool_calls(mut self, allowed: bool) -> Self {
        self.parallel_tool_calls = allowed;
        self
    }

    /// Set generation parameters
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }
}

/// A complete chat response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The assistant message, tool calls and usage attached
    pub message: Message,
    /// Token usage for this call (also mirrored on the message)
    pub usage: Option<TokenUsage>,
}

/// Core trait for chat-based language models.
///
/// Implementations must be `Send + Sync`; agents share them as
/// `Arc<dyn ChatModel>`. The contract the orchestration layer depends on:
/// tool calls present in the provider response are never silently dropped,
/// and usage metadata is preserved on the returned message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete response for the request
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageRole;
    use std::sync::Arc;

    struct FixedModel(String);

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
            let message = Message::assistant(self.0.clone()).with_usage(TokenUsage::new(3, 2));
            let usage = message.usage;
            Ok(ChatResponse { message, usage })
        }
    }

    #[tokio::test]
    async fn test_trait_object() {
        let model: Arc<dyn ChatModel> = Arc::new(FixedModel("hello".into()));
        let response = model
            .chat(ChatRequest::new(vec![Message::human("hi")]))
            .await
            .unwrap();
        assert_eq!(response.message.role, MessageRole::Assistant);
        assert_eq!(response.usage.unwrap().input_tokens, 3);
    }
}
