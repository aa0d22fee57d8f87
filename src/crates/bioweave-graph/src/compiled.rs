//! Compiled graph execution: invoke, stream, recursion bound
//!
//! A [`CompiledGraph`] runs its nodes sequentially from the entry point,
//! merging each node's partial state through the schema reducers and
//! following edges until the frontier reaches `END`. The total number of
//! node executions per invocation is bounded by the recursion limit;
//! exceeding it is fatal.
//!
//! Streaming runs the same loop in a spawned task and yields a
//! [`StateSnapshot`] through a bounded channel after every node. Snapshot
//! emitters propagate through a task-local, which is how nested graphs
//! (invoked from inside a parent's node executor) surface their own
//! snapshots when the caller asked for subgraph transparency.

use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph, SubgraphExecutor, END, START};
use crate::state::StateSchema;
use crate::stream::{StateSnapshot, StreamMode, StreamOptions};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Default bound on node executions per invocation.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Snapshot channel capacity; the executor blocks when the consumer lags.
const STREAM_BUFFER: usize = 100;

#[derive(Clone)]
struct Emitter {
    tx: mpsc::Sender<StateSnapshot>,
    modes: Vec<StreamMode>,
    subgraphs: bool,
    namespace: Vec<String>,
}

impl Emitter {
    async fn emit(&self, node: &str, state: &Value, update: &Value) {
        for mode in &self.modes {
            let snapshot = StateSnapshot {
                namespace: self.namespace.clone(),
                node: node.to_string(),
                mode: *mode,
                state: match mode {
                    StreamMode::Values => state.clone(),
                    StreamMode::Updates => update.clone(),
                },
            };
            // A dropped receiver just stops observation, not execution.
            let _ = self.tx.send(snapshot).await;
        }
    }
}

tokio::task_local! {
    static EMITTER: Option<Emitter>;
}

fn inherited_emitter() -> Option<Emitter> {
    EMITTER.try_with(|e| e.clone()).ok().flatten()
}

/// An executable graph produced by
/// [`StateGraph::compile`](crate::builder::StateGraph::compile).
#[derive(Clone)]
pub struct CompiledGraph {
    pub(crate) graph: Graph,
    pub(crate) schema: Arc<StateSchema>,
    pub(crate) name: String,
    pub(crate) recursion_limit: usize,
    pub(crate) output_keys: Option<Vec<String>>,
}

impl CompiledGraph {
    pub(crate) fn new(graph: Graph, schema: StateSchema, name: String) -> Self {
        Self {
            graph,
            schema: Arc::new(schema),
            name,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            output_keys: None,
        }
    }

    /// Set the recursion limit (max node executions per invoke)
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Restrict the returned state to the given keys (output projection)
    pub fn with_output_keys(mut self, keys: Vec<String>) -> Self {
        self.output_keys = Some(keys);
        self
    }

    /// Graph name, used as the stream namespace segment for nested runs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until the frontier reaches `END`; returns the final state.
    ///
    /// A nested call (from inside another graph's node) inherits the
    /// parent's snapshot emitter when subgraph streaming was requested.
    pub async fn invoke(&self, input: Value) -> Result<Value> {
        self.invoke_with_limit(input, self.recursion_limit).await
    }

    /// [`invoke`](Self::invoke) with an explicit recursion limit.
    pub async fn invoke_with_limit(&self, input: Value, limit: usize) -> Result<Value> {
        let emitter = inherited_emitter().filter(|e| e.subgraphs).map(|mut e| {
            e.namespace.push(self.name.clone());
            e
        });
        let state = match emitter {
            // Re-scope so graphs nested below this one extend our
            // namespace rather than the parent's.
            Some(em) => {
                EMITTER
                    .scope(
                        Some(em.clone()),
                        self.run_loop(input, limit, Some(em)),
                    )
                    .await?
            }
            None => self.run_loop(input, limit, None).await?,
        };
        Ok(self.project_output(state))
    }

    /// Run the graph in a background task, yielding a snapshot after each
    /// node execution.
    pub fn stream(
        &self,
        input: Value,
        options: StreamOptions,
    ) -> ReceiverStream<StateSnapshot> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let emitter = Emitter {
            tx,
            modes: options.modes.clone(),
            subgraphs: options.subgraphs,
            namespace: Vec::new(),
        };
        let graph = self.clone();
        let limit = options.recursion_limit.unwrap_or(self.recursion_limit);

        tokio::spawn(EMITTER.scope(Some(emitter.clone()), async move {
            if let Err(e) = graph.run_loop(input, limit, Some(emitter)).await {
                tracing::error!(error = %e, graph = %graph.name, "Streaming execution failed");
            }
        }));

        ReceiverStream::new(rx)
    }

    async fn run_loop(
        &self,
        input: Value,
        limit: usize,
        emitter: Option<Emitter>,
    ) -> Result<Value> {
        self.graph
            .validate()
            .map_err(GraphError::Validation)?;

        let mut state = match input {
            Value::Object(_) => input,
            other => {
                return Err(GraphError::state_error(
                    None::<String>,
                    format!("initial state must be an object, got {}", other),
                ))
            }
        };

        let mut current = if self.graph.entry == START {
            self.resolve_next(START, &state)?
        } else {
            self.graph.entry.clone()
        };
        let mut steps = 0usize;

        tracing::debug!(graph = %self.name, entry = %current, "Starting graph execution");

        while current != END {
            if steps >= limit {
                tracing::error!(graph = %self.name, limit, "Recursion limit reached");
                return Err(GraphError::RecursionLimit { limit });
            }
            steps += 1;

            let spec = self.graph.nodes.get(&current).ok_or_else(|| {
                GraphError::Validation(format!("Node {} does not exist", current))
            })?;

            tracing::debug!(graph = %self.name, node = %current, step = steps, "Executing node");
            let update = (spec.executor)(state.clone())
                .await
                .map_err(|e| GraphError::node_execution(&current, e.to_string()))?;

            self.schema
                .apply(&mut state, &update)
                .map_err(|e| GraphError::state_error(Some(&current), e.to_string()))?;

            if let Some(em) = &emitter {
                em.emit(&current, &state, &update).await;
            }

            current = self.resolve_next(&current, &state)?;
        }

        tracing::debug!(graph = %self.name, steps, "Graph execution completed");
        Ok(state)
    }

    /// Resolve the next node after `from` given the current state.
    fn resolve_next(&self, from: &str, state: &Value) -> Result<String> {
        let edges = match self.graph.edges.get(from) {
            Some(edges) if !edges.is_empty() => edges,
            // A node with no outgoing edges is terminal.
            _ => return Ok(END.to_string()),
        };

        match &edges[0] {
            Edge::Direct(to) => Ok(to.clone()),
            Edge::Conditional { router, branches } => {
                let label = router(state);
                if let Some(target) = branches.get(&label) {
                    Ok(target.clone())
                } else if label == END {
                    Ok(END.to_string())
                } else {
                    Err(GraphError::UnknownBranch {
                        node: from.to_string(),
                        label,
                    })
                }
            }
        }
    }

    fn project_output(&self, state: Value) -> Value {
        match &self.output_keys {
            Some(keys) => StateSchema::project(&state, keys),
            None => state,
        }
    }
}

impl SubgraphExecutor for CompiledGraph {
    fn invoke(
        &self,
        state: Value,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + Send>> {
        let graph = self.clone();
        Box::pin(async move { graph.invoke(state).await })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateGraph;
    use crate::state::{AppendReducer, StateSchema};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_linear_invoke() {
        let mut graph = StateGraph::new("linear");
        graph.add_node("a", |_state| {
            Box::pin(async move { Ok(json!({"seen": "a"})) })
        });
        graph.add_node("b", |_state| {
            Box::pin(async move { Ok(json!({"seen": "b"})) })
        });
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", END);

        let compiled = graph.compile().unwrap();
        let result = compiled.invoke(json!({})).await.unwrap();
        assert_eq!(result["seen"], "b");
    }

    #[tokio::test]
    async fn test_conditional_routing() {
        let mut graph = StateGraph::new("cond");
        graph.add_node("decide", |_state| {
            Box::pin(async move { Ok(json!({})) })
        });
        graph.add_node("left", |_state| {
            Box::pin(async move { Ok(json!({"path": "left"})) })
        });
        graph.add_node("right", |_state| {
            Box::pin(async move { Ok(json!({"path": "right"})) })
        });
        graph.add_edge(START, "decide");
        let mut branches = HashMap::new();
        branches.insert("l".to_string(), "left".to_string());
        branches.insert("r".to_string(), "right".to_string());
        graph.add_conditional_edge(
            "decide",
            |state| {
                if state["go_left"].as_bool().unwrap_or(false) {
                    "l".to_string()
                } else {
                    "r".to_string()
                }
            },
            branches,
        );
        graph.add_edge("left", END);
        graph.add_edge("right", END);

        let compiled = graph.compile().unwrap();
        let result = compiled.invoke(json!({"go_left": true})).await.unwrap();
        assert_eq!(result["path"], "left");
    }

    #[tokio::test]
    async fn test_recursion_limit_cycle() {
        // A -> B -> A with no END: exactly `limit` node executions then a
        // fatal recursion-limit error.
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut graph = StateGraph::new("cycle");
        for name in ["a", "b"] {
            let counter = counter.clone();
            graph.add_node(name, move |_state| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!({}))
                })
            });
        }
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", "a");

        let compiled = graph.compile().unwrap();
        let err = compiled.invoke_with_limit(json!({}), 5).await.unwrap_err();
        assert!(matches!(err, GraphError::RecursionLimit { limit: 5 }));
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_node_error_propagates() {
        let mut graph = StateGraph::new("failing");
        graph.add_node("boom", |_state| {
            Box::pin(async move { Err("exploded".into()) })
        });
        graph.add_edge(START, "boom");
        graph.add_edge("boom", END);

        let compiled = graph.compile().unwrap();
        let err = compiled.invoke(json!({})).await.unwrap_err();
        match err {
            GraphError::NodeExecution { node, error } => {
                assert_eq!(node, "boom");
                assert!(error.contains("exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_branch_is_fatal() {
        let mut graph = StateGraph::new("bad-router");
        graph.add_node("a", |_state| Box::pin(async move { Ok(json!({})) }));
        graph.add_edge(START, "a");
        let mut branches = HashMap::new();
        branches.insert("known".to_string(), END.to_string());
        graph.add_conditional_edge("a", |_state| "unknown".to_string(), branches);

        let compiled = graph.compile().unwrap();
        let err = compiled.invoke(json!({})).await.unwrap_err();
        assert!(matches!(err, GraphError::UnknownBranch { .. }));
    }

    #[tokio::test]
    async fn test_append_only_log_length_non_decreasing() {
        let schema = StateSchema::new().field("log", Box::new(AppendReducer));
        let mut graph = StateGraph::with_schema("logger", schema);
        graph.add_node("a", |_state| {
            Box::pin(async move { Ok(json!({"log": ["a"]})) })
        });
        graph.add_node("b", |_state| {
            Box::pin(async move { Ok(json!({"log": ["b"]})) })
        });
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", END);

        let compiled = graph.compile().unwrap();
        let result = compiled.invoke(json!({"log": []})).await.unwrap();
        assert_eq!(result["log"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_output_projection() {
        let mut graph = StateGraph::new("proj");
        graph.add_node("a", |_state| {
            Box::pin(async move { Ok(json!({"keep": 1, "internal": 2})) })
        });
        graph.add_edge(START, "a");
        graph.add_edge("a", END);

        let compiled = graph
            .compile()
            .unwrap()
            .with_output_keys(vec!["keep".to_string()]);
        let result = compiled.invoke(json!({})).await.unwrap();
        assert_eq!(result, json!({"keep": 1}));
    }

    #[tokio::test]
    async fn test_stream_yields_after_each_node() {
        use futures::StreamExt;

        let mut graph = StateGraph::new("streamer");
        graph.add_node("a", |_state| {
            Box::pin(async move { Ok(json!({"step": "a"})) })
        });
        graph.add_node("b", |_state| {
            Box::pin(async move { Ok(json!({"step": "b"})) })
        });
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", END);

        let compiled = graph.compile().unwrap();
        let snapshots: Vec<_> = compiled
            .stream(json!({}), StreamOptions::default())
            .collect()
            .await;

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].node, "a");
        assert_eq!(snapshots[1].node, "b");
        assert_eq!(snapshots[1].state["step"], "b");
    }
}
