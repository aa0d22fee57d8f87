//! Code execution records.

use serde::{Deserialize, Serialize};

/// Immutable record of one sandboxed code execution.
///
/// Created only by the sandbox; appended to agent state and never
/// mutated. A non-zero `exit_code` is data, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeExecutionResult {
    /// The code that ran
    pub code: String,
    /// Combined stdout/stderr, middle-truncated at the raw cap
    pub console_output: String,
    /// Wall-clock execution time in seconds
    pub running_time_s: f64,
    /// Peak container memory observed during execution, in MB
    pub peak_memory_mb: f64,
    /// Interpreter exit code
    pub exit_code: i64,
    /// Host paths of artifacts pulled out of the workspace
    pub artifact_paths: Vec<String>,
}

impl std::fmt::Display for CodeExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "exit_code={} running_time_s={:.2} peak_memory_mb={:.1}\n{}",
            self.exit_code, self.running_time_s, self.peak_memory_mb, self.console_output
        )
    }
}
