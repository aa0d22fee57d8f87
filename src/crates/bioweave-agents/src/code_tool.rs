//! The `code_execution` tool.
//!
//! Wraps a code runner (normally the sandbox) behind the tool contract.
//! The observation returned to the model is the console output truncated
//! to a much smaller cap than the raw sandbox return; the full
//! [`CodeExecutionResult`] records accumulate in a shared log that agent
//! nodes drain into state after each dispatch.
//!
//! Without a runner (sandbox unavailable at construction) every call
//! produces a tool-level error message; agents still run.

use async_trait::async_trait;
use bioweave_graph::tool::{Tool, ToolError, ToolOutput, ToolResult};
use bioweave_sandbox::{truncate_middle_tokens, CodeExecutionResult, Language, Sandbox};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Caller-visible cap on console output, in approximate tokens.
pub const CODE_TOOL_OUTPUT_CAP: usize = 4096;

/// Something that can run code and produce an execution record.
///
/// The sandbox is the production implementation; tests substitute a
/// scripted runner.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `code` under `language`, returning the execution record.
    async fn run_code(
        &self,
        language: Language,
        code: &str,
    ) -> std::result::Result<CodeExecutionResult, String>;
}

#[async_trait]
impl CodeRunner for Sandbox {
    async fn run_code(
        &self,
        language: Language,
        code: &str,
    ) -> std::result::Result<CodeExecutionResult, String> {
        self.execute(language, code).await.map_err(|e| e.to_string())
    }
}

/// Tool executing Python/R code through a [`CodeRunner`].
pub struct CodeExecutionTool {
    runner: Option<Arc<dyn CodeRunner>>,
    log: Arc<Mutex<Vec<CodeExecutionResult>>>,
    output_cap: usize,
}

impl CodeExecutionTool {
    /// Create the tool; `None` means execution is unavailable.
    pub fn new(runner: Option<Arc<dyn CodeRunner>>) -> Self {
        Self {
            runner,
            log: Arc::new(Mutex::new(Vec::new())),
            output_cap: CODE_TOOL_OUTPUT_CAP,
        }
    }

    /// Drain the accumulated execution records.
    ///
    /// Agent nodes call this after tool dispatch and append the records to
    /// state, which is where the append-only execution log lives.
    pub fn take_results(&self) -> Vec<CodeExecutionResult> {
        self.log.lock().map(|mut log| std::mem::take(&mut *log)).unwrap_or_default()
    }
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn name(&self) -> &str {
        "code_execution"
    }

    fn description(&self) -> &str {
        "Execute Python or R code in the isolated workspace sandbox. The \
         code runs with the workspace as its working directory; files \
         written there are collected as artifacts. Returns the console \
         output (truncated) and execution metrics."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": ["python", "r"],
                    "description": "Interpreter to use",
                },
                "code": {
                    "type": "string",
                    "description": "The code to execute",
                },
            },
            "required": ["code"],
        })
    }

    async fn run(&self, args: Value) -> ToolResult {
        let runner = self.runner.as_ref().ok_or_else(|| {
            ToolError::execution(
                "code_execution",
                "sandbox is not available; code execution is disabled",
            )
        })?;

        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "code_execution".to_string(),
                error: "missing required field 'code'".to_string(),
            })?;
        let language: Language = args
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or("python")
            .parse()
            .map_err(|e: bioweave_sandbox::SandboxError| ToolError::InvalidArguments {
                tool: "code_execution".to_string(),
                error: e.to_string(),
            })?;

        let result = runner
            .run_code(language, code)
            .await
            .map_err(|e| ToolError::execution("code_execution", e))?;

        let observation = format!(
            "exit_code: {}\nrunning_time_s: {:.2}\npeak_memory_mb: {:.1}\nartifacts: {}\n--- console output ---\n{}",
            result.exit_code,
            result.running_time_s,
            result.peak_memory_mb,
            if result.artifact_paths.is_empty() {
                "none".to_string()
            } else {
                result.artifact_paths.join(", ")
            },
            truncate_middle_tokens(&result.console_output, self.output_cap),
        );

        if let Ok(mut log) = self.log.lock() {
            log.push(result);
        }
        Ok(ToolOutput::text(observation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRunner;

    #[async_trait]
    impl CodeRunner for EchoRunner {
        async fn run_code(
            &self,
            _language: Language,
            code: &str,
        ) -> std::result::Result<CodeExecutionResult, String> {
            Ok(CodeExecutionResult {
                code: code.to_string(),
                console_output: "4\n".to_string(),
                running_time_s: 0.1,
                peak_memory_mb: 12.5,
                exit_code: 0,
                artifact_paths: vec![],
            })
        }
    }

    #[tokio::test]
    async fn test_run_and_log() {
        let tool = CodeExecutionTool::new(Some(Arc::new(EchoRunner)));
        let output = tool
            .run(json!({"language": "python", "code": "print(2+2)"}))
            .await
            .unwrap();
        match output {
            ToolOutput::Text(text) => {
                assert!(text.contains("exit_code: 0"));
                assert!(text.contains("4"));
            }
            _ => panic!("expected text"),
        }
        let results = tool.take_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].exit_code, 0);
        // Drained once, gone afterwards.
        assert!(tool.take_results().is_empty());
    }

    #[tokio::test]
    async fn test_without_runner_is_tool_error() {
        let tool = CodeExecutionTool::new(None);
        let err = tool.run(json!({"code": "print(1)"})).await.unwrap_err();
        assert!(err.to_string().contains("sandbox is not available"));
    }

    #[tokio::test]
    async fn test_missing_code_rejected() {
        let tool = CodeExecutionTool::new(Some(Arc::new(EchoRunner)));
        let err = tool.run(json!({"language": "python"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
