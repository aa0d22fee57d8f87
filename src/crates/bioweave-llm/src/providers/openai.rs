//! OpenAI chat-completions client, also serving Azure deployments.
//!
//! Azure uses the same wire format behind a different URL scheme
//! (`{endpoint}/openai/deployments/{model}/...?api-version=...`) and an
//! `api-key` header instead of a bearer token. The gateway strips
//! `reasoning_effort` for Azure before the request reaches this client.

use crate::config::{ApiType, ProviderConfig};
use crate::error::{LlmError, Result};
use bioweave_graph::llm::{ChatRequest, ChatResponse};
use bioweave_graph::messages::{Message, MessageRole, TokenUsage, ToolCall};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const AZURE_API_VERSION: &str = "2024-12-01-preview";

/// OpenAI / Azure-OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: ProviderConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a client from provider configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_type == ApiType::Azure && config.endpoint.is_none() {
            return Err(LlmError::ConfigError(
                "Azure requires an endpoint".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(LlmError::HttpError)?;
        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        match self.config.api_type {
            ApiType::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.config.endpoint.as_deref().unwrap_or_default(),
                self.config.model,
                AZURE_API_VERSION,
            ),
            _ => format!(
                "{}/chat/completions",
                self.config
                    .endpoint
                    .as_deref()
                    .unwrap_or(DEFAULT_BASE_URL)
            ),
        }
    }

    /// Run a chat request
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut body = json!({
            "messages": convert_messages(&request.messages),
        });
        if self.config.api_type != ApiType::Azure {
            body["model"] = json!(self.config.model);
        }
        if let Some(effort) = &request.config.reasoning_effort {
            body["reasoning_effort"] = json!(effort);
        }
        if let Some(cap) = request.config.max_completion_tokens {
            body["max_completion_tokens"] = json!(cap);
        }
        if let Some(temperature) = request.config.temperature {
            body["temperature"] = json!(temperature);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tools"] = json!(tools);
            body["parallel_tool_calls"] = json!(request.parallel_tool_calls);
        }

        let mut http_request = self.client.post(self.url()).json(&body);
        http_request = match self.config.api_type {
            ApiType::Azure => http_request.header("api-key", &self.config.api_key),
            _ => http_request.bearer_auth(&self.config.api_key),
        };

        let response = http_request.send().await.map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationError(error_text),
                429 => LlmError::RateLimitExceeded(error_text),
                _ => LlmError::ProviderError(format!(
                    "OpenAI API error {}: {}",
                    status, error_text
                )),
            });
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        convert_response(wire)
    }
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let content = bioweave_graph::messages::content_to_text(&msg.content);
            match msg.role {
                MessageRole::System => json!({"role": "system", "content": content}),
                MessageRole::Human => json!({"role": "user", "content": content}),
                MessageRole::Assistant => {
                    let mut wire = json!({"role": "assistant", "content": content});
                    if msg.has_tool_calls() {
                        let calls: Vec<Value> = msg
                            .tool_calls()
                            .iter()
                            .map(|c| {
                                json!({
                                    "id": c.id,
                                    "type": "function",
                                    "function": {
                                        "name": c.name,
                                        "arguments": c.args.to_string(),
                                    },
                                })
                            })
                            .collect();
                        wire["tool_calls"] = json!(calls);
                    }
                    wire
                }
                MessageRole::Tool => json!({
                    "role": "tool",
                    "content": content,
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                }),
            }
        })
        .collect()
}

fn convert_response(wire: WireResponse) -> Result<ChatResponse> {
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

    let mut tool_calls = Vec::new();
    for call in choice.message.tool_calls.unwrap_or_default() {
        let args = serde_json::from_str::<Value>(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments));
        tool_calls.push(ToolCall::new(call.id, call.function.name, args));
    }

    let usage = wire
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));
    let mut message = Message::assistant(choice.message.content.unwrap_or_default());
    if let Some(id) = wire.id {
        message = message.with_id(id);
    }
    if let Some(usage) = usage {
        message = message.with_usage(usage);
    }
    if !tool_calls.is_empty() {
        message = message.with_tool_calls(tool_calls);
    }

    Ok(ChatResponse { message, usage })
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: Option<String>,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_requires_endpoint() {
        let config = ProviderConfig::new(ApiType::Azure, "gpt-4o", "key");
        assert!(OpenAiClient::new(config).is_err());
    }

    #[test]
    fn test_azure_url_shape() {
        let config = ProviderConfig::new(ApiType::Azure, "gpt-4o", "key")
            .with_endpoint("https://acct.openai.azure.com");
        let client = OpenAiClient::new(config).unwrap();
        let url = client.url();
        assert!(url.contains("/openai/deployments/gpt-4o/chat/completions"));
        assert!(url.contains("api-version="));
    }

    #[test]
    fn test_message_conversion_tool_round_trip() {
        let messages = vec![
            Message::assistant("calling").with_tool_calls(vec![ToolCall::new(
                "c1",
                "calc",
                json!({"a": 2}),
            )]),
            Message::tool("4", "c1"),
        ];
        let wire = convert_messages(&messages);
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "calc");
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "c1");
    }

    #[test]
    fn test_response_parses_tool_arguments() {
        let wire = WireResponse {
            id: Some("r1".to_string()),
            choices: vec![WireChoice {
                message: WireMessage {
                    content: Some("".to_string()),
                    tool_calls: Some(vec![WireToolCall {
                        id: "c2".to_string(),
                        function: WireFunction {
                            name: "search".to_string(),
                            arguments: r#"{"q":"egfr"}"#.to_string(),
                        },
                    }]),
                },
            }],
            usage: Some(WireUsage {
                prompt_tokens: 5,
                completion_tokens: 7,
            }),
        };
        let response = convert_response(wire).unwrap();
        assert_eq!(response.message.tool_calls()[0].args["q"], "egfr");
        assert_eq!(response.usage.unwrap().output_tokens, 7);
    }
}
