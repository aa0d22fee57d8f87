//! DS-Wizard: plan-then-code data-science agent.
//!
//! Same loop as ReAct with one addition: a `propose_analysis_plan` tool
//! records the model's plan into state, and every subsequent turn pins the
//! current plan into the prompt so the code loop implements it rather than
//! improvising.

use crate::base::{messages_from_state, AgentCore, SandboxSpec};
use crate::code_tool::{CodeExecutionTool, CodeRunner};
use crate::config::recursion_limits;
use crate::error::Result;
use crate::prompts::DSWIZARD_SYSTEM_PROMPT;
use crate::results::ExecutionResults;
use crate::tool_node::ToolNode;
use async_trait::async_trait;
use bioweave_graph::llm::ChatModel;
use bioweave_graph::messages::Message;
use bioweave_graph::state::{AppendReducer, StateSchema};
use bioweave_graph::tool::{Tool, ToolOutput, ToolResult};
use bioweave_graph::{CompiledGraph, StateGraph, END, START};
use bioweave_sandbox::CodeExecutionResult;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Tool recording the proposed analysis plan.
///
/// The plan lands in a shared slot the agent node drains into state after
/// dispatch; the tool itself just acknowledges.
struct AnalysisPlanTool {
    slot: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl Tool for AnalysisPlanTool {
    fn name(&self) -> &str {
        "propose_analysis_plan"
    }

    fn description(&self) -> &str {
        "Record the analysis plan before writing code. Provide the ordered \
         steps of the analysis as a single plan string."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": {"type": "string", "description": "The ordered analysis plan"},
            },
            "required": ["plan"],
        })
    }

    async fn run(&self, args: Value) -> ToolResult {
        let plan = args
            .get("plan")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(plan);
        }
        Ok(ToolOutput::text(
            "Analysis plan recorded. Proceed to implement it with code_execution.",
        ))
    }
}

/// Plan→code data-science agent.
pub struct DsWizardAgent {
    core: Arc<AgentCore>,
    graph: CompiledGraph,
}

impl DsWizardAgent {
    /// Construct with a sandbox per `spec`.
    pub async fn new(model: Arc<dyn ChatModel>, spec: SandboxSpec) -> Result<Self> {
        let core = AgentCore::initialize(model, None, spec, Default::default()).await;
        let runner = core.sandbox.clone().map(|s| s as Arc<dyn CodeRunner>);
        Self::from_parts(core, runner)
    }

    /// Construct from explicit parts (test seam).
    pub fn from_parts(core: AgentCore, runner: Option<Arc<dyn CodeRunner>>) -> Result<Self> {
        let core = Arc::new(core);
        let code_tool = Arc::new(CodeExecutionTool::new(runner));
        let plan_slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let plan_tool = Arc::new(AnalysisPlanTool {
            slot: plan_slot.clone(),
        });
        let tools: Vec<Arc<dyn Tool>> = vec![code_tool.clone(), plan_tool];

        let schema = StateSchema::with_messages()
            .field("code_execution_results", Box::new(AppendReducer));
        let mut graph = StateGraph::with_schema("dswizard", schema);

        let system_prompt = DSWIZARD_SYSTEM_PROMPT.replace("{workdir}", &core.workdir);
        {
            let core = core.clone();
            let tools = tools.clone();
            graph.add_node("agent", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                let system_prompt = system_prompt.clone();
                Box::pin(async move {
                    let mut prompt = system_prompt.clone();
                    if let Some(plan) = state.get("analysis_plan").and_then(|v| v.as_str()) {
                        if !plan.is_empty() {
                            prompt.push_str(&format!("\n\n# Current analysis plan\n{}", plan));
                        }
                    }
                    let mut messages = vec![Message::system(prompt)];
                    messages.extend(messages_from_state(&state));
                    let response = core.call_model(messages, &tools, true).await?;
                    Ok(json!({"messages": [response.message]}))
                })
            });
        }

        {
            let dispatcher = ToolNode::new(tools);
            let code_tool = code_tool.clone();
            graph.add_node("tools", move |state| {
                let dispatcher = dispatcher.clone();
                let code_tool = code_tool.clone();
                let plan_slot = plan_slot.clone();
                Box::pin(async move {
                    let messages = messages_from_state(&state);
                    let replies = dispatcher.execute(&messages).await;
                    let executions = code_tool.take_results();
                    let mut update = json!({
                        "messages": replies,
                        "code_execution_results": executions,
                    });
                    let recorded = plan_slot.lock().ok().and_then(|mut slot| slot.take());
                    if let Some(plan) = recorded {
                        update["analysis_plan"] = json!(plan);
                    }
                    Ok(update)
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

        let graph = graph
            .with_recursion_limit(recursion_limits::REACT)
            .compile()?;
        Ok(Self { core, graph })
    }

    /// Blocking run returning the final record plus the recorded plan.
    pub async fn go(&self, input_query: &str) -> Result<(ExecutionResults, String)> {
        let final_state = self
            .graph
            .invoke(json!({
                "messages": [Message::human(input_query)],
                "code_execution_results": [],
                "analysis_plan": "",
            }))
            .await?;
        let messages = messages_from_state(&final_state);
        let executions: Vec<CodeExecutionResult> = final_state
            .get("code_execution_results")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let plan = final_state
            .get("analysis_plan")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok((ExecutionResults::from_run(&messages, executions), plan))
    }

    /// Tear down the sandbox.
    pub async fn clear_workspace(&self) -> Result<()> {
        self.core.clear_workspace().await
    }
}
