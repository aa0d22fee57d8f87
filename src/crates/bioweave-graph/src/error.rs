//! Error types for graph construction and execution
//!
//! All errors implement `std::error::Error` via `thiserror`. The two fatal
//! execution paths are [`GraphError::RecursionLimit`] and node failures
//! surfaced as [`GraphError::NodeExecution`]; everything else in the runtime
//! is reported into state (tool errors become tool messages) rather than
//! raised.

use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur during graph construction, validation, and execution
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed at compile time
    ///
    /// **Common causes**: edge to a node that was never added, missing entry
    /// point, conditional branch target that does not exist.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// A node's executor returned an error during execution
    ///
    /// Node failures propagate out of `invoke`; there is no graph-level
    /// retry. The model gateway and tool dispatcher do their own recovery
    /// before an error ever reaches this variant.
    #[error("Node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed
        node: String,
        /// Error message from node execution
        error: String,
    },

    /// Execution error without a specific node context
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The total number of node executions exceeded the configured limit
    ///
    /// Raised before the limit-exceeding node would run. This is the
    /// runaway-loop backstop for cyclic agent graphs.
    #[error("Recursion limit of {limit} reached without hitting END")]
    RecursionLimit {
        /// The configured limit that was exceeded
        limit: usize,
    },

    /// A conditional router returned a label with no matching branch
    #[error("Router at node '{node}' returned unknown branch label '{label}'")]
    UnknownBranch {
        /// Node whose conditional edge failed to resolve
        node: String,
        /// The label the router returned
        label: String,
    },

    /// State update could not be merged by the schema reducers
    #[error("State error{}: {error}", node.as_ref().map(|n| format!(" in node '{}'", n)).unwrap_or_default())]
    StateError {
        /// Optional node context where the error occurred
        node: Option<String>,
        /// Error description
        error: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph or node configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl GraphError {
    /// Create a node execution error with context
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create a state error with optional node context
    pub fn state_error(node: Option<impl Into<String>>, error: impl Into<String>) -> Self {
        Self::StateError {
            node: node.map(|n| n.into()),
            error: error.into(),
        }
    }
}
