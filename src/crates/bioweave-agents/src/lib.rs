//! # bioweave-agents
//!
//! Agent topologies for biomedical data-science and evidence-synthesis
//! workflows, built on the bioweave graph engine:
//!
//! - [`ReactAgent`] - model↔tool loop with sandboxed code execution
//! - [`DsWizardAgent`] - plan-then-code data-science wizard
//! - [`DeepEvidenceAgent`] - hierarchical BFS/DFS literature researcher
//!   with round budgets and an evidence knowledge graph
//! - [`SlrAgent`] - four-stage systematic-review pipeline
//! - [`DocGenAgent`] - per-section write→review→revise document generator
//!
//! Shared infrastructure: the tool dispatcher ([`ToolNode`]), conversation
//! compaction ([`context`]), the knowledge-base catalog, budget
//! configuration, and the execution-result records every agent returns.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bioweave_agents::{build_gateway, ReactAgent, SandboxSpec};
//! use bioweave_agents::config::RetrySettings;
//!
//! let model = build_gateway(
//!     "anthropic",
//!     "claude-sonnet-4-5",
//!     &std::env::var("ANTHROPIC_API_KEY")?,
//!     None,
//!     &RetrySettings::default(),
//! )?;
//! let agent = ReactAgent::new(model, SandboxSpec::default()).await?;
//! agent.register_workspace(Some("data/".as_ref()), true).await?;
//!
//! let results = agent.go("What is the median survival in the cohort? Use code.").await?;
//! println!("{}", results.final_response);
//! agent.clear_workspace().await?;
//! ```

pub mod base;
pub mod code_tool;
pub mod config;
pub mod context;
pub mod deepevidence;
pub mod docgen;
pub mod dswizard;
pub mod error;
pub mod knowledge;
pub mod prompts;
pub mod react;
pub mod results;
pub mod slr;
pub mod tool_node;

pub use base::{build_gateway, AgentCore, SandboxSpec};
pub use code_tool::{CodeExecutionTool, CodeRunner, CODE_TOOL_OUTPUT_CAP};
pub use deepevidence::{DeepEvidenceAgent, DeepEvidenceConfig};
pub use docgen::{DocGenAgent, SectionTemplate};
pub use dswizard::DsWizardAgent;
pub use error::{AgentError, Result};
pub use knowledge::{KnowledgeBaseCatalog, KNOWLEDGE_BASE_KEYS};
pub use react::ReactAgent;
pub use results::{
    DeepEvidenceExecutionResults, DocGenExecutionResults, ExecutionResults, SlrExecutionResults,
};
pub use slr::{SlrAgent, SlrToolset};
pub use tool_node::ToolNode;
