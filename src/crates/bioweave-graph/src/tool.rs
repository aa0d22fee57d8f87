//! Tool framework for agent workflows
//!
//! A tool is a named, side-effecting capability the model can invoke: a
//! literature search, a sandbox code execution, an evidence-graph write.
//! Tools expose a synchronous-contract `run(args) -> text | multimodal`
//! surface behind an async trait; the dispatcher (see the agents crate)
//! turns tool calls into tool messages and never lets a tool failure
//! escape as a panic or graph error.
//!
//! # Defining a tool
//!
//! ```rust,ignore
//! use bioweave_graph::tool::{Tool, ToolOutput, ToolResult};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! struct SearchPapers;
//!
//! #[async_trait]
//! impl Tool for SearchPapers {
//!     fn name(&self) -> &str { "search_papers" }
//!     fn description(&self) -> &str { "Search PubMed for papers matching a query." }
//!     fn args_schema(&self) -> Value {
//!         json!({
//!             "type": "object",
//!             "properties": {"query": {"type": "string"}},
//!             "required": ["query"],
//!         })
//!     }
//!     async fn run(&self, args: Value) -> ToolResult {
//!         let query = args["query"].as_str().unwrap_or_default();
//!         Ok(ToolOutput::text(format!("results for {query}")))
//!     }
//! }
//! ```

use crate::messages::ContentPart;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Result type for tool execution
pub type ToolResult = std::result::Result<ToolOutput, ToolError>;

/// Errors from tool lookup and execution
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    /// Tool name not present in the active tool set
    #[error("Tool '{0}' not found")]
    NotFound(String),

    /// Arguments did not match the tool's expectations
    #[error("Invalid arguments for tool '{tool}': {error}")]
    InvalidArguments {
        /// Tool name
        tool: String,
        /// What was wrong
        error: String,
    },

    /// The tool ran and failed
    #[error("Tool '{tool}' execution failed: {error}")]
    ExecutionFailed {
        /// Tool name
        tool: String,
        /// Failure description
        error: String,
    },
}

impl ToolError {
    /// Create an execution failure for the named tool
    pub fn execution(tool: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::ExecutionFailed {
            tool: tool.into(),
            error: error.to_string(),
        }
    }
}

/// The value a tool returns: plain text or an ordered block sequence.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Text result
    Text(String),
    /// Multimodal result preserved as content blocks on the tool message
    Multimodal(Vec<ContentPart>),
}

impl ToolOutput {
    /// Create a text output
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// True if this output carries non-text blocks
    pub fn is_multimodal(&self) -> bool {
        matches!(self, Self::Multimodal(_))
    }
}

impl From<String> for ToolOutput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// A tool the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name, referenced by the model in tool calls
    fn name(&self) -> &str;

    /// Description shown to the model when the tool is bound
    fn description(&self) -> &str;

    /// JSON-schema-like argument specification
    fn args_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    /// Execute the tool with the given arguments
    async fn run(&self, args: Value) -> ToolResult;
}

/// Wire-format tool declaration bound onto a model request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Argument schema
    pub parameters: Value,
}

impl ToolDefinition {
    /// Build the wire declaration for a tool instance
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.args_schema(),
        }
    }
}

/// A name-keyed collection of tools forming an agent's active tool set.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a tool list. Later tools shadow earlier ones
    /// with the same name.
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when no tools are registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Wire declarations for every registered tool
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::from_tool(t.as_ref()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        match self.get(name) {
            Some(tool) => tool.run(args).await,
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }
}
