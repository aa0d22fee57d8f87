//! StateGraph builder
//!
//! The high-level API for constructing graphs: add nodes as async closures,
//! wire edges, attach a state schema, compile. Mirrors the shape of the
//! agent topologies this runtime executes:
//!
//! ```rust
//! use bioweave_graph::builder::StateGraph;
//! use bioweave_graph::graph::{START, END};
//! use serde_json::json;
//!
//! # async fn build() -> bioweave_graph::error::Result<()> {
//! let mut graph = StateGraph::new("demo");
//! graph.add_node("agent", |state| {
//!     Box::pin(async move {
//!         let _ = state;
//!         Ok(json!({"answered": true}))
//!     })
//! });
//! graph.add_edge(START, "agent");
//! graph.add_edge("agent", END);
//!
//! let compiled = graph.compile()?;
//! let result = compiled.invoke(json!({})).await?;
//! assert_eq!(result["answered"], true);
//! # Ok(())
//! # }
//! ```

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeSpec, SubgraphExecutor, START};
use crate::state::StateSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for executable state graphs.
pub struct StateGraph {
    graph: Graph,
    schema: StateSchema,
    name: String,
    input_keys: Option<Vec<String>>,
    output_keys: Option<Vec<String>>,
    recursion_limit: Option<usize>,
}

impl StateGraph {
    /// Create a named builder with the default schema (a `messages` field
    /// merged by the message reducer; everything else replaces).
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_schema(name, StateSchema::with_messages())
    }

    /// Create a builder with an explicit schema
    pub fn with_schema(name: impl Into<String>, schema: StateSchema) -> Self {
        Self {
            graph: Graph::new(),
            schema,
            name: name.into(),
            input_keys: None,
            output_keys: None,
            recursion_limit: None,
        }
    }

    /// Add a node from an async closure returning a partial state
    pub fn add_node<F>(&mut self, name: impl Into<String>, executor: F)
    where
        F: Fn(
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
            + Sync
            + 'static,
    {
        let name = name.into();
        self.graph
            .add_node(name.clone(), NodeSpec::new(name, Arc::new(executor)));
    }

    /// Add a node that wraps a nested compiled graph.
    ///
    /// The executor typically maps the parent state into the child's input
    /// shape, awaits `subgraph.invoke`, and maps the child's output back;
    /// registering the subgraph here is what lets streaming surface the
    /// child's snapshots.
    pub fn add_subgraph_node<F>(
        &mut self,
        name: impl Into<String>,
        subgraph: Arc<dyn SubgraphExecutor>,
        executor: F,
    ) where
        F: Fn(
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
            + Sync
            + 'static,
    {
        let name = name.into();
        let spec = NodeSpec::new(name.clone(), Arc::new(executor)).with_subgraph(subgraph);
        self.graph.add_node(name, spec);
    }

    /// Add an unconditional edge
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.graph.add_edge(from.into(), to.into());
    }

    /// Add a conditional edge: the router's label is resolved through
    /// `branches` after the source node executes.
    pub fn add_conditional_edge<R>(
        &mut self,
        from: impl Into<String>,
        router: R,
        branches: HashMap<String, String>,
    ) where
        R: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.graph
            .add_conditional_edge(from.into(), Arc::new(router), branches);
    }

    /// Set the entry point by wiring `START` to the given node
    pub fn set_entry(&mut self, node: impl Into<String>) {
        let has_start_edge = self
            .graph
            .edges
            .get(START)
            .map(|e| !e.is_empty())
            .unwrap_or(false);
        if !has_start_edge {
            self.graph.add_edge(START.to_string(), node.into());
        }
    }

    /// Declare the input projection (documentation of the accepted shape)
    pub fn with_input_keys(mut self, keys: Vec<String>) -> Self {
        self.input_keys = Some(keys);
        self
    }

    /// Declare the output projection: compile() restricts the returned
    /// state to these keys.
    pub fn with_output_keys(mut self, keys: Vec<String>) -> Self {
        self.output_keys = Some(keys);
        self
    }

    /// Set the compiled graph's recursion limit
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    /// Access the schema for further field registration
    pub fn schema_mut(&mut self) -> &mut StateSchema {
        &mut self.schema
    }

    /// Validate and produce an executable graph
    pub fn compile(self) -> Result<CompiledGraph> {
        self.graph.validate().map_err(GraphError::Validation)?;
        let mut compiled = CompiledGraph::new(self.graph, self.schema, self.name);
        if let Some(limit) = self.recursion_limit {
            compiled = compiled.with_recursion_limit(limit);
        }
        if let Some(keys) = self.output_keys {
            compiled = compiled.with_output_keys(keys);
        }
        Ok(compiled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::END;
    use serde_json::json;

    #[tokio::test]
    async fn test_builder_compile_and_invoke() {
        let mut graph = StateGraph::new("t");
        graph.add_node("n", |_s| Box::pin(async move { Ok(json!({"x": 1})) }));
        graph.add_edge(START, "n");
        graph.add_edge("n", END);
        let result = graph.compile().unwrap().invoke(json!({})).await.unwrap();
        assert_eq!(result["x"], 1);
    }

    #[test]
    fn test_compile_rejects_bad_edges() {
        let mut graph = StateGraph::new("t");
        graph.add_edge(START, "ghost");
        assert!(graph.compile().is_err());
    }
}
