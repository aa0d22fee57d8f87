//! Error type for the agent public surface.

use thiserror::Error;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors surfaced by agent construction and the `go`/`generate` surface.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Graph execution failed (recursion limit, node failure)
    #[error(transparent)]
    Graph(#[from] bioweave_graph::error::GraphError),

    /// Sandbox operation failed
    #[error(transparent)]
    Sandbox(#[from] bioweave_sandbox::SandboxError),

    /// Evidence store operation failed
    #[error(transparent)]
    Evidence(#[from] bioweave_evidence::EvidenceError),

    /// Host filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller passed invalid arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
