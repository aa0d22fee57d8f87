//! Google Gemini generateContent client.
//!
//! Gemini has no tool-call ids on the wire; ids are synthesized at
//! conversion time so the dispatcher's call/result join works the same
//! as for the other providers.

use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use bioweave_graph::llm::{ChatRequest, ChatResponse};
use bioweave_graph::messages::{Message, MessageRole, TokenUsage, ToolCall};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API client.
#[derive(Clone)]
pub struct GoogleClient {
    config: ProviderConfig,
    client: Client,
}

impl GoogleClient {
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
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            base, self.config.model, self.config.api_key
        );

        let (system_instruction, contents) = convert_messages(&request.messages);

        let mut body = json!({"contents": contents});
        if let Some(system) = system_instruction {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.config.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.config.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{"functionDeclarations": declarations}]);
        }

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(LlmError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthenticationError(error_text),
                429 => LlmError::RateLimitExceeded(error_text),
                _ => LlmError::ProviderError(format!(
                    "Gemini API error {}: {}",
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

fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Option<String> = None;
    let mut contents = Vec::new();

    for msg in messages {
        let text = bioweave_graph::messages::content_to_text(&msg.content);
        match msg.role {
            MessageRole::System => {
                system = Some(match system {
                    Some(existing) => format!("{}\n\n{}", existing, text),
                    None => text,
                });
            }
            MessageRole::Human => {
                contents.push(json!({"role": "user", "parts": [{"text": text}]}));
            }
            MessageRole::Assistant => {
                let mut parts = Vec::new();
                if !text.is_empty() {
                    parts.push(json!({"text": text}));
                }
                for call in msg.tool_calls() {
                    parts.push(json!({
                        "functionCall": {"name": call.name, "args": call.args},
                    }));
                }
                contents.push(json!({"role": "model", "parts": parts}));
            }
            MessageRole::Tool => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": msg.name.clone().unwrap_or_default(),
                            "response": {"result": text},
                        },
                    }],
                }));
            }
        }
    }

    (system, contents)
}

fn convert_response(wire: WireResponse) -> Result<ChatResponse> {
    let candidate = wire
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("no candidates in response".to_string()))?;

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for (idx, part) in candidate.content.parts.into_iter().enumerate() {
        if let Some(text) = part.text {
            text_parts.push(text);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall::new(
                format!("{}-{}", call.name, idx),
                call.name,
                call.args.unwrap_or(Value::Null),
            ));
        }
    }

    let usage = wire
        .usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count));
    let mut message = Message::assistant(text_parts.join(""));
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
    candidates: Vec<WireCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: WireContent,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
struct WirePart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_conversion_roles() {
        let messages = vec![
            Message::system("rules"),
            Message::human("question"),
            Message::assistant("answer"),
        ];
        let (system, contents) = convert_messages(&messages);
        assert_eq!(system.as_deref(), Some("rules"));
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn test_response_synthesizes_call_ids() {
        let wire = WireResponse {
            candidates: vec![WireCandidate {
                content: WireContent {
                    parts: vec![WirePart {
                        text: None,
                        function_call: Some(WireFunctionCall {
                            name: "search".to_string(),
                            args: Some(json!({"q": "kras"})),
                        }),
                    }],
                },
            }],
            usage_metadata: None,
        };
        let response = convert_response(wire).unwrap();
        assert_eq!(response.message.tool_calls()[0].id, "search-0");
    }
}
