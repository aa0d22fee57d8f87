//! # bioweave-llm
//!
//! Provider clients and the retrying model gateway for bioweave.
//!
//! The graph crate defines the provider-agnostic
//! [`ChatModel`](bioweave_graph::llm::ChatModel) trait; this crate
//! implements it for the supported providers behind a single
//! [`ModelGateway`]:
//!
//! - **Anthropic** - messages API, extended thinking budget
//! - **OpenAI** - chat completions, reasoning effort
//! - **Azure OpenAI** - OpenAI format on deployment URLs
//! - **Google** - Gemini generateContent
//!
//! The gateway builds a fresh client per call, retries with jittered
//! exponential backoff, and enforces an optional per-attempt wall-clock
//! deadline by abandoning the call's worker task on expiry.
//!
//! ```rust,ignore
//! use bioweave_llm::{ApiType, ModelGateway, ProviderConfig};
//! use bioweave_graph::llm::{ChatModel, ChatRequest};
//! use bioweave_graph::messages::Message;
//!
//! let gateway = ModelGateway::new(ProviderConfig::new(
//!     ApiType::Anthropic,
//!     "claude-sonnet-4-5",
//!     std::env::var("ANTHROPIC_API_KEY")?,
//! ));
//!
//! let response = gateway
//!     .chat(ChatRequest::new(vec![Message::human("What is TP53?")]))
//!     .await?;
//! println!("{:?}", response.message.text());
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod retry;

pub use config::{default_chat_config, sanitize_config, ApiType, ProviderConfig};
pub use error::{LlmError, Result};
pub use gateway::ModelGateway;
pub use retry::RetryPolicy;

// Re-export the trait-side types for convenience
pub use bioweave_graph::llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse};
