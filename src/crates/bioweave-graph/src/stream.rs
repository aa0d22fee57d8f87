//! Streaming types for graph execution
//!
//! `stream` yields a [`StateSnapshot`] after every node execution. When
//! subgraph streaming is enabled, nested graphs emit their own snapshots
//! tagged with a namespace path (`["bfs_workflow"]`, ...); otherwise a
//! nested graph is one opaque node from the outside.

use serde_json::Value;

/// What a snapshot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// The full merged state after the node ran
    Values,
    /// Only the partial update the node returned
    Updates,
}

/// One emission from a running graph.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Path of nested graph names; empty for the top-level graph
    pub namespace: Vec<String>,
    /// Node that just executed
    pub node: String,
    /// Snapshot mode
    pub mode: StreamMode,
    /// State (full or partial, per `mode`)
    pub state: Value,
}

/// Options controlling a streaming run.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Modes to emit; one snapshot per mode per node execution
    pub modes: Vec<StreamMode>,
    /// Forward nested graphs' snapshots into this stream
    pub subgraphs: bool,
    /// Override of the compiled graph's recursion limit
    pub recursion_limit: Option<usize>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            modes: vec![StreamMode::Values],
            subgraphs: false,
            recursion_limit: None,
        }
    }
}

impl StreamOptions {
    /// Values-mode streaming with subgraph transparency
    pub fn with_subgraphs() -> Self {
        Self {
            subgraphs: true,
            ..Self::default()
        }
    }
}
