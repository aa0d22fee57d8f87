//! # bioweave-graph
//!
//! Graph execution engine for bioweave agents: a typed node/edge spec
//! compiled into a runnable state machine with streaming snapshots, a
//! recursion bound, schema-driven state merging, the message model, and
//! the tool and chat-model traits the rest of the workspace builds on.
//!
//! ## Architecture
//!
//! - [`builder::StateGraph`] - construct graphs from async closures
//! - [`compiled::CompiledGraph`] - `invoke` / `stream` with a recursion limit
//! - [`state`] - reducers: append-merge for message logs and list fields,
//!   replace for scalars
//! - [`messages`] - immutable conversation values joined by `tool_call_id`
//! - [`tool`] - the `run(args) -> text | multimodal` capability contract
//! - [`llm`] - the provider-agnostic [`llm::ChatModel`] trait
//!
//! ## Example
//!
//! ```rust
//! use bioweave_graph::{StateGraph, START, END};
//! use serde_json::json;
//!
//! # async fn run() -> bioweave_graph::error::Result<()> {
//! let mut graph = StateGraph::new("hello");
//! graph.add_node("greet", |_state| {
//!     Box::pin(async move { Ok(json!({"greeting": "hello"})) })
//! });
//! graph.add_edge(START, "greet");
//! graph.add_edge("greet", END);
//!
//! let result = graph.compile()?.invoke(json!({})).await?;
//! assert_eq!(result["greeting"], "hello");
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod compiled;
pub mod error;
pub mod graph;
pub mod llm;
pub mod messages;
pub mod state;
pub mod stream;
pub mod tool;

pub use builder::StateGraph;
pub use compiled::CompiledGraph;
pub use error::{GraphError, Result};
pub use graph::{SubgraphExecutor, END, START};
pub use messages::{
    add_messages, content_to_text, ContentPart, Message, MessageContent, MessageRole, TokenUsage,
    ToolCall,
};
pub use state::{AppendReducer, MessageReducer, OverwriteReducer, Reducer, StateSchema, SumReducer};
pub use stream::{StateSnapshot, StreamMode, StreamOptions};
pub use tool::{Tool, ToolDefinition, ToolError, ToolOutput, ToolRegistry, ToolResult};
