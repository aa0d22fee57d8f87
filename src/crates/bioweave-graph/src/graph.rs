//! Core graph data structures
//!
//! A graph is a directed multigraph of named handler nodes with an entry
//! point, unconditional edges, and conditional edges keyed by a routing
//! function. [`StateGraph`](crate::builder::StateGraph) is the builder;
//! [`CompiledGraph`](crate::compiled::CompiledGraph) executes.
//!
//! ```text
//! START ──> orchestrator ──(router)──> tool_node ──┐
//!              ▲      │                            │
//!              │      └──(router)──> END           │
//!              └───────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use bioweave_graph::graph::{Graph, NodeSpec, START, END};
//! use std::sync::Arc;
//!
//! let mut graph = Graph::new();
//! graph.add_node(
//!     "process".to_string(),
//!     NodeSpec::new("process", Arc::new(|_state| {
//!         Box::pin(async move { Ok(serde_json::json!({})) })
//!     })),
//! );
//! graph.add_edge(START.to_string(), "process".to_string());
//! graph.add_edge("process".to_string(), END.to_string());
//! assert!(graph.validate().is_ok());
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Node identifier - unique name within a graph
pub type NodeId = String;

/// Virtual node marking where execution begins
pub const START: &str = "__start__";

/// Virtual node marking successful completion
pub const END: &str = "__end__";

/// Node executor function type.
///
/// Receives the full current state and returns a **partial** state; the
/// executor merges the partial into the current state through the graph's
/// schema reducers. A node may update any subset of fields.
pub type NodeExecutor = Arc<
    dyn Fn(
            Value,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<
                        Output = std::result::Result<
                            Value,
                            Box<dyn std::error::Error + Send + Sync>,
                        >,
                    > + Send,
            >,
        > + Send
        + Sync,
>;

/// Routing function for conditional edges: state in, branch label out.
pub type RouterFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Edge defining a transition between nodes.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional transition to a node
    Direct(NodeId),

    /// Dynamic routing: the router inspects state and returns a label
    /// resolved through `branches`. A label with no branch entry is a
    /// fatal routing error.
    Conditional {
        /// Router function evaluated after the source node runs
        router: RouterFn,
        /// Label → target node map, used for validation and resolution
        branches: HashMap<String, NodeId>,
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Direct(node) => f.debug_tuple("Direct").field(node).finish(),
            Edge::Conditional { branches, .. } => f
                .debug_struct("Conditional")
                .field("router", &"<function>")
                .field("branches", branches)
                .finish(),
        }
    }
}

/// A node: named executor plus optional nested graph.
#[derive(Clone)]
pub struct NodeSpec {
    /// Human-readable node name
    pub name: String,
    /// The handler invoked when the node executes
    pub executor: NodeExecutor,
    /// Present when this node wraps a nested compiled graph; lets the
    /// streaming layer surface the child's snapshots transparently
    pub subgraph: Option<Arc<dyn SubgraphExecutor>>,
}

impl NodeSpec {
    /// Create a plain node
    pub fn new(name: impl Into<String>, executor: NodeExecutor) -> Self {
        Self {
            name: name.into(),
            executor,
            subgraph: None,
        }
    }

    /// Mark this node as wrapping a nested graph
    pub fn with_subgraph(mut self, subgraph: Arc<dyn SubgraphExecutor>) -> Self {
        self.subgraph = Some(subgraph);
        self
    }
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("executor", &"<function>")
            .field("subgraph", &self.subgraph.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

/// Trait for embedding compiled graphs as nodes of a parent graph.
///
/// Implemented by [`CompiledGraph`](crate::compiled::CompiledGraph); a
/// nested graph appears as one node from outside and emits its own state
/// snapshots into the parent's stream when subgraph streaming is enabled.
pub trait SubgraphExecutor: Send + Sync {
    /// Execute the nested graph with the given input state
    fn invoke(
        &self,
        state: Value,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<Output = crate::error::Result<Value>> + Send,
        >,
    >;

    /// Name of the nested graph, used as the namespace segment in streams
    fn name(&self) -> &str;
}

/// Core graph structure: nodes, edges, entry point.
#[derive(Clone, Debug)]
pub struct Graph {
    /// All nodes mapped by id
    pub nodes: HashMap<NodeId, NodeSpec>,
    /// Outgoing edges per source node
    pub edges: HashMap<NodeId, Vec<Edge>>,
    /// Entry node id
    pub entry: NodeId,
}

impl Graph {
    /// Create an empty graph with entry set to [`START`]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: START.to_string(),
        }
    }

    /// Add a node
    pub fn add_node(&mut self, id: NodeId, spec: NodeSpec) {
        self.nodes.insert(id, spec);
    }

    /// Add an unconditional edge
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.entry(from).or_default().push(Edge::Direct(to));
    }

    /// Add a conditional edge with a router and branch map
    pub fn add_conditional_edge(
        &mut self,
        from: NodeId,
        router: RouterFn,
        branches: HashMap<String, NodeId>,
    ) {
        self.edges
            .entry(from)
            .or_default()
            .push(Edge::Conditional { router, branches });
    }

    /// Set the entry point
    pub fn set_entry(&mut self, node: NodeId) {
        self.entry = node;
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Validate graph structure: entry exists, every edge endpoint
    /// exists (or is START/END), every conditional branch target exists.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.nodes.contains_key(&self.entry) && self.entry != START {
            return Err(format!("Entry point {} does not exist", self.entry));
        }

        for (from, edges) in &self.edges {
            if !self.nodes.contains_key(from) && from != START {
                return Err(format!("Edge source {} does not exist", from));
            }
            for edge in edges {
                match edge {
                    Edge::Direct(to) => {
                        if !self.nodes.contains_key(to) && to != END {
                            return Err(format!("Edge target {} does not exist", to));
                        }
                    }
                    Edge::Conditional { branches, .. } => {
                        for to in branches.values() {
                            if !self.nodes.contains_key(to) && to != END {
                                return Err(format!("Branch target {} does not exist", to));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_node(name: &str) -> NodeSpec {
        NodeSpec::new(
            name,
            Arc::new(|_state| Box::pin(async move { Ok(serde_json::json!({})) })),
        )
    }

    #[test]
    fn test_graph_creation() {
        let graph = Graph::new();
        assert_eq!(graph.nodes.len(), 0);
        assert_eq!(graph.entry, START);
    }

    #[test]
    fn test_add_nodes_and_edges() {
        let mut graph = Graph::new();
        graph.add_node("a".to_string(), noop_node("a"));
        graph.add_edge(START.to_string(), "a".to_string());
        graph.add_edge("a".to_string(), END.to_string());
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_validation_fails_missing_target() {
        let mut graph = Graph::new();
        graph.add_edge(START.to_string(), "missing".to_string());
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_validation_fails_missing_branch() {
        let mut graph = Graph::new();
        graph.add_node("a".to_string(), noop_node("a"));
        let mut branches = HashMap::new();
        branches.insert("x".to_string(), "nowhere".to_string());
        graph.add_conditional_edge(
            "a".to_string(),
            Arc::new(|_| "x".to_string()),
            branches,
        );
        assert!(graph.validate().is_err());
    }
}
