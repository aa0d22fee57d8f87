//! Concrete provider clients.
//!
//! Each client owns message/tool conversion to and from its wire format;
//! the gateway picks one per call based on [`ApiType`].

pub mod anthropic;
pub mod google;
pub mod openai;

use crate::config::{ApiType, ProviderConfig};
use crate::error::Result;
use bioweave_graph::llm::{ChatRequest, ChatResponse};

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use openai::OpenAiClient;

/// Build the client for `config` and run the request.
pub(crate) async fn dispatch(
    config: &ProviderConfig,
    request: ChatRequest,
) -> Result<ChatResponse> {
    match config.api_type {
        ApiType::Anthropic => AnthropicClient::new(config.clone())?.chat(request).await,
        ApiType::OpenAi | ApiType::Azure => {
            OpenAiClient::new(config.clone())?.chat(request).await
        }
        ApiType::Google => GoogleClient::new(config.clone())?.chat(request).await,
    }
}
