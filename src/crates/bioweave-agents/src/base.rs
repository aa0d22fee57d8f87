//! Shared agent core: model access, sandbox lifecycle, workspace surface.
//!
//! Every agent owns an [`AgentCore`]: the chat model (a retrying gateway
//! or a test double), an optional sandbox, a summariser for compaction,
//! and the workspace path. Sandbox construction is fail-open - when
//! Docker is unavailable the agent still runs with a local workspace
//! directory and error-reporting execution tools.

use crate::config::{CompactionSettings, RetrySettings};
use crate::context::compact_messages;
use crate::error::{AgentError, Result};
use bioweave_graph::error::Result as GraphResult;
use bioweave_graph::llm::{ChatModel, ChatRequest, ChatResponse};
use bioweave_graph::messages::Message;
use bioweave_graph::tool::{Tool, ToolDefinition};
use bioweave_llm::{ApiType, ModelGateway, ProviderConfig, RetryPolicy};
use bioweave_sandbox::{Sandbox, DEFAULT_IMAGE};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// How an agent should obtain its sandbox.
#[derive(Debug, Clone)]
pub enum SandboxSpec {
    /// Start a fresh container from this image
    Image(String),
    /// Re-attach to an existing container id
    Attach(String),
    /// Run without a sandbox (no execution capability)
    Disabled,
}

impl Default for SandboxSpec {
    fn default() -> Self {
        Self::Image(DEFAULT_IMAGE.to_string())
    }
}

/// Companion helper module installed into the sandbox's site-packages.
pub const COMPANION_MODULE_NAME: &str = "bioweave_tools";

const COMPANION_MODULE_INIT: &str = r#""""Workspace helpers available to sandboxed analysis code."""
import os

WORKSPACE = "/workdir"


def list_workspace():
    """Names of all files currently in the workspace."""
    return sorted(os.listdir(WORKSPACE))


def workspace_path(name):
    """Absolute path of a workspace file."""
    return os.path.join(WORKSPACE, name)
"#;

/// Build the retrying model gateway from environment-style inputs.
pub fn build_gateway(
    api_type: &str,
    model_name: &str,
    api_key: &str,
    endpoint: Option<&str>,
    retry: &RetrySettings,
) -> Result<Arc<dyn ChatModel>> {
    let api_type: ApiType = api_type
        .parse()
        .map_err(|e: bioweave_llm::LlmError| AgentError::InvalidInput(e.to_string()))?;
    let mut config = ProviderConfig::new(api_type, model_name, api_key);
    if let Some(endpoint) = endpoint {
        config = config.with_endpoint(endpoint);
    }
    let gateway = ModelGateway::new(config)
        .with_retry(
            RetryPolicy::new(retry.max_retries).with_wait_window(retry.min_wait, retry.max_wait),
        )
        .with_timeout(retry.llm_timeout);
    Ok(Arc::new(gateway))
}

/// Shared state behind every agent.
pub struct AgentCore {
    /// The agent's chat model
    pub model: Arc<dyn ChatModel>,
    /// Summariser used for compaction (defaults to `model`)
    pub summarizer: Arc<dyn ChatModel>,
    /// Sandbox handle; `None` in degraded mode
    pub sandbox: Option<Arc<Sandbox>>,
    /// Workspace path (sandbox workdir, or a local fallback directory)
    pub workdir: String,
    /// Compaction settings applied before each model call
    pub compaction: CompactionSettings,
}

impl AgentCore {
    /// Initialize the core, attempting sandbox construction per `spec`.
    ///
    /// Sandbox failure logs a warning and degrades to a local `workdir`
    /// directory under the current working directory.
    pub async fn initialize(
        model: Arc<dyn ChatModel>,
        summarizer: Option<Arc<dyn ChatModel>>,
        spec: SandboxSpec,
        compaction: CompactionSettings,
    ) -> Self {
        let sandbox = match &spec {
            SandboxSpec::Disabled => None,
            SandboxSpec::Image(image) => match Sandbox::start(image).await {
                Ok(sandbox) => Some(Arc::new(sandbox)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to initialize sandbox; running degraded");
                    None
                }
            },
            SandboxSpec::Attach(container_id) => match Sandbox::attach(container_id).await {
                Ok(sandbox) => Some(Arc::new(sandbox)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to attach sandbox; running degraded");
                    None
                }
            },
        };

        let workdir = match &sandbox {
            Some(sandbox) => sandbox.workdir().to_string(),
            None => {
                let local = std::env::current_dir()
                    .unwrap_or_else(|_| std::path::PathBuf::from("."))
                    .join("workdir");
                if let Err(e) = std::fs::create_dir_all(&local) {
                    tracing::warn!(error = %e, "Failed to create local workdir");
                }
                local.to_string_lossy().to_string()
            }
        };

        Self {
            summarizer: summarizer.unwrap_or_else(|| model.clone()),
            model,
            sandbox,
            workdir,
            compaction,
        }
    }

    /// Core used by tests: model only, no sandbox, default compaction.
    pub fn for_model(model: Arc<dyn ChatModel>) -> Self {
        Self {
            summarizer: model.clone(),
            model,
            sandbox: None,
            workdir: "/workdir".to_string(),
            compaction: CompactionSettings::default(),
        }
    }

    /// Call the configured model with tools bound, compacting the
    /// conversation first if it crossed the token threshold.
    pub async fn call_model(
        &self,
        messages: Vec<Message>,
        tools: &[Arc<dyn Tool>],
        parallel_tool_calls: bool,
    ) -> GraphResult<ChatResponse> {
        self.call_model_on(&*self.model, messages, tools, parallel_tool_calls)
            .await
    }

    /// [`call_model`](Self::call_model) against an explicit model (used by
    /// sub-agents running on a lighter model).
    pub async fn call_model_on(
        &self,
        model: &dyn ChatModel,
        messages: Vec<Message>,
        tools: &[Arc<dyn Tool>],
        parallel_tool_calls: bool,
    ) -> GraphResult<ChatResponse> {
        let messages = compact_messages(
            self.summarizer.as_ref(),
            messages,
            self.compaction.token_threshold,
        )
        .await;

        let definitions: Vec<ToolDefinition> = tools
            .iter()
            .map(|t| ToolDefinition::from_tool(t.as_ref()))
            .collect();
        let request = ChatRequest::new(messages)
            .with_tools(definitions)
            .with_parallel_tool_calls(parallel_tool_calls);
        model.chat(request).await
    }

    /// Upload `*.csv` files from `local_dir` into the sandbox workspace
    /// (marked preserved) and optionally install the companion tools
    /// module. Returns the uploaded target paths.
    pub async fn register_workspace(
        &self,
        local_dir: Option<&Path>,
        install_tools: bool,
    ) -> Result<Vec<String>> {
        let sandbox = match &self.sandbox {
            Some(sandbox) => sandbox,
            None => {
                tracing::warn!("register_workspace called without a sandbox; nothing uploaded");
                return Ok(Vec::new());
            }
        };

        let mut uploaded = Vec::new();
        if let Some(dir) = local_dir {
            let mut pairs = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                let is_csv = path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false);
                if !is_csv {
                    continue;
                }
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    let target = format!("{}/{}", self.workdir, name);
                    pairs.push((path.clone(), target.clone()));
                    uploaded.push(target);
                }
            }
            sandbox.upload_tables(&pairs).await?;
        }

        if install_tools {
            sandbox
                .install_companion_module(
                    COMPANION_MODULE_NAME,
                    &[(
                        "__init__.py".to_string(),
                        COMPANION_MODULE_INIT.as_bytes().to_vec(),
                    )],
                )
                .await?;
        }

        Ok(uploaded)
    }

    /// Tear down the sandbox; the agent keeps running in degraded mode.
    pub async fn clear_workspace(&self) -> Result<()> {
        if let Some(sandbox) = &self.sandbox {
            sandbox.stop().await?;
        }
        Ok(())
    }

    /// Input/output token usage of a response, zero when absent.
    pub fn usage_of(response: &ChatResponse) -> (u64, u64) {
        response
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0))
    }
}

/// Deserialize the message log out of a state value.
pub fn messages_from_state(state: &Value) -> Vec<Message> {
    state
        .get("messages")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Read a u64 counter field from state.
pub fn counter_from_state(state: &Value, field: &str) -> u64 {
    state.get(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn chat(&self, request: ChatRequest) -> GraphResult<ChatResponse> {
            let message = Message::assistant(format!("saw {} messages", request.messages.len()));
            Ok(ChatResponse {
                message,
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn test_call_model_binds_tools() {
        let core = AgentCore::for_model(Arc::new(EchoModel));
        let response = core
            .call_model(vec![Message::human("hi")], &[], false)
            .await
            .unwrap();
        assert_eq!(response.message.text(), Some("saw 1 messages"));
    }

    #[test]
    fn test_messages_from_state_tolerates_missing() {
        assert!(messages_from_state(&serde_json::json!({})).is_empty());
        let state = serde_json::json!({"messages": [Message::human("q")]});
        assert_eq!(messages_from_state(&state).len(), 1);
    }

    #[test]
    fn test_build_gateway_rejects_bad_api_type() {
        let err = build_gateway("together", "m", "k", None, &RetrySettings::default());
        assert!(err.is_err());
    }
}
