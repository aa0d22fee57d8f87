//! ReAct agent: a model↔tool loop with sandboxed code execution.
//!
//! The simplest topology in the runtime and the template the others build
//! on: an agent node calls the model with the tool set bound, a router
//! inspects the response for tool calls, the tool node dispatches them,
//! and control loops back until the model answers without tools.
//!
//! ```text
//! START ──> agent ──(tool calls?)──> tools ──> agent ...
//!                 └───────(no)─────> END
//! ```

use crate::base::{messages_from_state, AgentCore, SandboxSpec};
use crate::code_tool::{CodeExecutionTool, CodeRunner};
use crate::config::recursion_limits;
use crate::error::Result;
use crate::prompts::REACT_SYSTEM_PROMPT;
use crate::results::ExecutionResults;
use crate::tool_node::ToolNode;
use bioweave_graph::llm::ChatModel;
use bioweave_graph::messages::Message;
use bioweave_graph::state::{AppendReducer, StateSchema};
use bioweave_graph::stream::{StateSnapshot, StreamOptions};
use bioweave_graph::tool::Tool;
use bioweave_graph::{CompiledGraph, StateGraph, END, START};
use bioweave_sandbox::CodeExecutionResult;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

/// ReAct code-runner agent.
pub struct ReactAgent {
    core: Arc<AgentCore>,
    graph: CompiledGraph,
    code_tool: Arc<CodeExecutionTool>,
}

impl ReactAgent {
    /// Construct with a sandbox per `spec`; failure degrades gracefully.
    pub async fn new(model: Arc<dyn ChatModel>, spec: SandboxSpec) -> Result<Self> {
        let core = AgentCore::initialize(model, None, spec, Default::default()).await;
        let runner = core
            .sandbox
            .clone()
            .map(|s| s as Arc<dyn CodeRunner>);
        Self::from_parts(core, runner, Vec::new())
    }

    /// Construct from explicit parts. `runner` backs the `code_execution`
    /// tool; `extra_tools` extend the agent's tool set.
    pub fn from_parts(
        core: AgentCore,
        runner: Option<Arc<dyn CodeRunner>>,
        extra_tools: Vec<Arc<dyn Tool>>,
    ) -> Result<Self> {
        let core = Arc::new(core);
        let code_tool = Arc::new(CodeExecutionTool::new(runner));
        let mut tools: Vec<Arc<dyn Tool>> = vec![code_tool.clone()];
        tools.extend(extra_tools);
        let graph = Self::build_graph(core.clone(), tools, code_tool.clone())?;
        Ok(Self {
            core,
            graph,
            code_tool,
        })
    }

    fn build_graph(
        core: Arc<AgentCore>,
        tools: Vec<Arc<dyn Tool>>,
        code_tool: Arc<CodeExecutionTool>,
    ) -> Result<CompiledGraph> {
        let schema = StateSchema::with_messages()
            .field("code_execution_results", Box::new(AppendReducer));
        let mut graph = StateGraph::with_schema("react", schema);

        let system_prompt = REACT_SYSTEM_PROMPT.replace("{workdir}", &core.workdir);
        {
            let core = core.clone();
            let tools = tools.clone();
            graph.add_node("agent", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                let system_prompt = system_prompt.clone();
                Box::pin(async move {
                    let mut messages = vec![Message::system(system_prompt)];
                    messages.extend(messages_from_state(&state));
                    let response = core.call_model(messages, &tools, true).await?;
                    Ok(json!({"messages": [response.message]}))
                })
            });
        }

        {
            let dispatcher = ToolNode::new(tools);
            graph.add_node("tools", move |state| {
                let dispatcher = dispatcher.clone();
                let code_tool = code_tool.clone();
                Box::pin(async move {
                    let messages = messages_from_state(&state);
                    let replies = dispatcher.execute(&messages).await;
                    let executions = code_tool.take_results();
                    Ok(json!({
                        "messages": replies,
                        "code_execution_results": executions,
                    }))
                })
            });
        }

        graph.add_edge(START, "agent");
        let mut branches = HashMap::new();
        branches.insert("tools".to_string(), "tools".to_string());
        branches.insert(END.to_string(), END.to_string());
        graph.add_conditional_edge(
            "agent",
            |state| {
                let messages = messages_from_state(state);
                match messages.last() {
                    Some(m) if m.has_tool_calls() => "tools".to_string(),
                    _ => END.to_string(),
                }
            },
            branches,
        );
        graph.add_edge("tools", "agent");

        Ok(graph
            .with_recursion_limit(recursion_limits::REACT)
            .compile()?)
    }

    fn initial_state(input_query: &str) -> serde_json::Value {
        json!({
            "messages": [Message::human(input_query)],
            "code_execution_results": [],
        })
    }

    /// Streaming view: one snapshot per node execution.
    pub fn generate(&self, input_query: &str) -> ReceiverStream<StateSnapshot> {
        self.graph
            .stream(Self::initial_state(input_query), StreamOptions::default())
    }

    /// Blocking run returning the final execution record.
    pub async fn go(&self, input_query: &str) -> Result<ExecutionResults> {
        let final_state = self.graph.invoke(Self::initial_state(input_query)).await?;
        let messages = messages_from_state(&final_state);
        let executions: Vec<CodeExecutionResult> = final_state
            .get("code_execution_results")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        Ok(ExecutionResults::from_run(&messages, executions))
    }

    /// Upload workspace datasets and install the companion tools module.
    pub async fn register_workspace(
        &self,
        local_dir: Option<&Path>,
        install_tools: bool,
    ) -> Result<Vec<String>> {
        self.core.register_workspace(local_dir, install_tools).await
    }

    /// Tear down the sandbox.
    pub async fn clear_workspace(&self) -> Result<()> {
        self.core.clear_workspace().await
    }

    /// The agent's code tool (sub-topologies reuse it).
    pub fn code_tool(&self) -> Arc<CodeExecutionTool> {
        self.code_tool.clone()
    }
}
