//! The model gateway: unified call surface with retry and timeout.
//!
//! A [`ModelGateway`] is the only `ChatModel` agents ever hold. Per call it
//! builds a fresh provider client, applies the model-parameter policy,
//! and runs the request under the retry discipline:
//!
//! 1. bounded attempts (default 5) with jittered exponential backoff,
//! 2. optional per-attempt wall-clock timeout enforced by spawning the
//!    call onto a worker task and waiting on its handle - on expiry the
//!    worker is **abandoned**, never joined or awaited again (it may run
//!    to completion in the background), and the timeout feeds the retry
//!    loop,
//! 3. after budget exhaustion the last error is re-raised.
//!
//! The gateway never drops tool calls from a provider response; callers
//! merge the returned message into state verbatim.

use crate::config::{default_chat_config, sanitize_config, ProviderConfig};
use crate::error::{LlmError, Result};
use crate::providers;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use bioweave_graph::error::Result as GraphResult;
use bioweave_graph::llm::{ChatConfig, ChatModel, ChatRequest, ChatResponse};
use std::time::Duration;

/// Unified, retrying gateway to any supported provider.
#[derive(Clone)]
pub struct ModelGateway {
    config: ProviderConfig,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

impl ModelGateway {
    /// Create a gateway with the default retry policy and no deadline
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt wall-clock deadline
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn attempt(&self, request: ChatRequest) -> Result<ChatResponse> {
        match self.timeout {
            None => providers::dispatch(&self.config, request).await,
            Some(deadline) => {
                let config = self.config.clone();
                let worker =
                    tokio::spawn(async move { providers::dispatch(&config, request).await });
                match tokio::time::timeout(deadline, worker).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_err)) => Err(LlmError::ProviderError(format!(
                        "model call worker failed: {join_err}"
                    ))),
                    Err(_elapsed) => {
                        // Abandon the worker; it may finish in the
                        // background but nothing will ever wait on it.
                        tracing::warn!(
                            model = %self.config.model,
                            timeout_s = deadline.as_secs_f64(),
                            "Model call exceeded deadline; abandoning worker"
                        );
                        Err(LlmError::Timeout(deadline.as_secs_f64()))
                    }
                }
            }
        }
    }

    async fn call_with_retry(&self, request: ChatRequest) -> Result<ChatResponse> {
        let mut last_error: Option<LlmError> = None;
        for attempt in 0..self.retry.max_attempts {
            match self.attempt(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    tracing::warn!(
                        model = %self.config.model,
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        error = %error,
                        "Model call attempt failed"
                    );
                    last_error = Some(error);
                    if self.retry.should_retry(attempt + 1) {
                        let delay = self.retry.calculate_delay(attempt);
                        tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| LlmError::ConfigError("retry budget of zero attempts".to_string())))
    }
}

#[async_trait]
impl ChatModel for ModelGateway {
    async fn chat(&self, request: ChatRequest) -> GraphResult<ChatResponse> {
        let mut request = request;
        if request.config == ChatConfig::default() {
            request.config = default_chat_config(&self.config.model);
        }
        sanitize_config(self.config.api_type, &self.config.model, &mut request.config);

        let response = self.call_with_retry(request).await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiType;

    // Exercises retry exhaustion against an unroutable endpoint: every
    // attempt fails fast at the HTTP layer and the last error re-raises.
    #[tokio::test]
    async fn test_retry_exhaustion_reraises() {
        let config = ProviderConfig::new(ApiType::OpenAi, "gpt-4o", "test-key")
            .with_endpoint("http://127.0.0.1:1")
            .with_http_timeout(Duration::from_millis(200));
        let gateway = ModelGateway::new(config).with_retry(
            RetryPolicy::new(2)
                .with_wait_window(0.01, 0.02)
                .without_jitter(),
        );

        let request = ChatRequest::new(vec![bioweave_graph::messages::Message::human("hi")]);
        let start = std::time::Instant::now();
        let err = gateway.chat(request).await.unwrap_err();
        assert!(!err.to_string().is_empty());
        // Two fast-failing attempts plus sub-second backoff.
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    // A deadline far below the HTTP timeout triggers the abandon path:
    // the caller returns promptly instead of waiting on the worker. The
    // error is a Timeout when the connect hangs, or the connect error
    // when the host fails fast; either way nothing waits 60 seconds.
    #[tokio::test]
    async fn test_timeout_abandons_worker() {
        let config = ProviderConfig::new(ApiType::OpenAi, "gpt-4o", "test-key")
            .with_endpoint("http://10.255.255.1:9")
            .with_http_timeout(Duration::from_secs(60));
        let gateway = ModelGateway::new(config)
            .with_retry(RetryPolicy::new(1).without_jitter())
            .with_timeout(Some(Duration::from_millis(50)));

        let request = ChatRequest::new(vec![bioweave_graph::messages::Message::human("hi")]);
        let start = std::time::Instant::now();
        let err = gateway.chat(request).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!err.to_string().is_empty());
    }
}
