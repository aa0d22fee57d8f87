//! Anthropic messages API client.
//!
//! Converts the runtime's conversation model to the messages wire format:
//! system messages are lifted out of the conversation, assistant tool
//! calls become `tool_use` blocks, tool messages become `tool_result`
//! blocks on a user turn, and multimodal tool output is carried through
//! as image/text blocks.

use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use bioweave_graph::llm::{ChatRequest, ChatResponse};
use bioweave_graph::messages::{
    ContentPart, Message, MessageContent, MessageRole, TokenUsage, ToolCall,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic API client.
#[derive(Clone)]
pub struct AnthropicClient {
    config: ProviderConfig,
    client: Client,
}

impl AnthropicClient {
    /// Create a client from provider configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(LlmError::HttpError)?;
        Ok(Self { config, client })
    }

    /// Run a chat request
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let base = self
            .config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let url = format!("{}/v1/messages", base);

        let (system, messages) = convert_messages(&request.messages);

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": request.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(budget) = request.config.thinking_budget_tokens {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!({
                "type": "auto",
                "disable_parallel_tool_use": !request.parallel_tool_calls,
            });
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationError(error_text),
                429 => LlmError::RateLimitExceeded(error_text),
                _ => LlmError::ProviderError(format!(
                    "Anthropic API error {}: {}",
                    status, error_text
                )),
            });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(convert_response(wire))
    }
}

fn content_blocks(content: &MessageContent) -> Vec<Value> {
    match content {
        MessageContent::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![json!({"type": "text", "text": text})]
            }
        }
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::Image { source: Some(source), .. } => {
                    json!({"type": "image", "source": source})
                }
                // URL/path references degrade to a text pointer; the API
                // only accepts embedded sources here.
                ContentPart::Image { url, .. } => {
                    json!({"type": "text", "text": format!("[image] {}", url.as_deref().unwrap_or(""))})
                }
            })
            .collect(),
    }
}

fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Option<String> = None;
    let mut wire = Vec::new();

    for msg in messages {
        match msg.role {
            MessageRole::System => {
                let text = bioweave_graph::messages::content_to_text(&msg.content);
                system = Some(match system {
                    Some(existing) => format!("{}\n\n{}", existing, text),
                    None => text,
                });
            }
            MessageRole::Human => {
                wire.push(json!({"role": "user", "content": content_blocks(&msg.content)}));
            }
            MessageRole::Assistant => {
                let mut blocks = content_blocks(&msg.content);
                for call in msg.tool_calls() {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.args,
                    }));
                }
                wire.push(json!({"role": "assistant", "content": blocks}));
            }
            MessageRole::Tool => {
                let result_content = content_blocks(&msg.content);
                wire.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": result_content,
                    }],
                }));
            }
        }
    }

    (system, wire)
}

fn convert_response(wire: WireResponse) -> ChatResponse {
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in wire.content {
        match block.block_type.as_str() {
            "text" => {
                if let Some(text) = block.text {
                    text_parts.push(text);
                }
            }
            "tool_use" => {
                tool_calls.push(ToolCall::new(
                    block.id.unwrap_or_default(),
                    block.name.unwrap_or_default(),
                    block.input.unwrap_or(Value::Null),
                ));
            }
            // thinking blocks are not surfaced into the conversation
            _ => {}
        }
    }

    let usage = TokenUsage::new(wire.usage.input_tokens, wire.usage.output_tokens);
    let mut message = Message::assistant(text_parts.join(""))
        .with_id(wire.id)
        .with_usage(usage);
    if !tool_calls.is_empty() {
        message = message.with_tool_calls(tool_calls);
    }

    ChatResponse {
        message,
        usage: Some(usage),
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    content: Vec<WireBlock>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiType;

    #[test]
    fn test_message_conversion_lifts_system() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::human("Hello"),
        ];
        let (system, wire) = convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful"));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["role"], "user");
    }

    #[test]
    fn test_tool_call_round_trip_blocks() {
        let assistant = Message::assistant("checking").with_tool_calls(vec![ToolCall::new(
            "tc1",
            "search_papers",
            json!({"query": "brca1"}),
        )]);
        let tool = Message::tool("3 hits", "tc1").with_name("search_papers");
        let (_, wire) = convert_messages(&[assistant, tool]);

        assert_eq!(wire[0]["content"][1]["type"], "tool_use");
        assert_eq!(wire[0]["content"][1]["id"], "tc1");
        assert_eq!(wire[1]["content"][0]["type"], "tool_result");
        assert_eq!(wire[1]["content"][0]["tool_use_id"], "tc1");
    }

    #[test]
    fn test_response_conversion_extracts_tool_calls() {
        let wire = WireResponse {
            id: "msg_1".to_string(),
            content: vec![
                WireBlock {
                    block_type: "text".to_string(),
                    text: Some("Let me search.".to_string()),
                    id: None,
                    name: None,
                    input: None,
                },
                WireBlock {
                    block_type: "tool_use".to_string(),
                    text: None,
                    id: Some("tc9".to_string()),
                    name: Some("search_papers".to_string()),
                    input: Some(json!({"query": "tp53"})),
                },
            ],
            usage: WireUsage {
                input_tokens: 12,
                output_tokens: 8,
            },
        };
        let response = convert_response(wire);
        assert!(response.message.has_tool_calls());
        assert_eq!(response.message.tool_calls()[0].id, "tc9");
        assert_eq!(response.usage.unwrap().input_tokens, 12);
    }

    #[test]
    fn test_client_creation() {
        let config = ProviderConfig::new(ApiType::Anthropic, "claude-sonnet-4-5", "key");
        assert!(AnthropicClient::new(config).is_ok());
    }
}
