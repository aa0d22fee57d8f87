//! DeepEvidence: hierarchical BFS/DFS literature researcher.
//!
//! A three-graph composition. The orchestrator decomposes the research
//! question and dispatches breadth-first or depth-first search rounds;
//! each round runs a sub-agent workflow (usually on a lighter model) over
//! the knowledge bases the orchestrator selected; findings accumulate in
//! the evidence knowledge graph unless light mode is on.
//!
//! ```text
//!                ┌────────────────────────────┐
//!                ▼                            │
//! START ──> orchestrator_node ──(router)──> tool_node
//!                │        │
//!                │        ├──> bfs_workflow ──┐
//!                │        ├──> dfs_workflow ──┤ (back to orchestrator)
//!                │        └──> END            │
//!                └────────────────────────────┘
//! ```
//!
//! Round budgets are injected into the prompt every turn as
//! `current/budget`; exceeding a budget never hard-terminates - the model
//! is told and expected to conclude. Only the recursion limit is fatal.
//! Sub-agents honour a minimum floor of three action rounds even when the
//! orchestrator supplies a smaller budget.

use crate::base::{counter_from_state, messages_from_state, AgentCore, SandboxSpec};
use crate::code_tool::{CodeExecutionTool, CodeRunner};
use crate::config::{recursion_limits, ResearchBudgets, SUBAGENT_ROUND_FLOOR};
use crate::error::{AgentError, Result};
use crate::knowledge::KnowledgeBaseCatalog;
use crate::prompts::{
    action_rounds_budget_prompt, search_rounds_budget_prompt, BFS_SYSTEM_PROMPT,
    DFS_SYSTEM_PROMPT, EVIDENCE_GRAPH_PROTOCOL_PROMPT, ORCHESTRATOR_SYSTEM_PROMPT,
};
use crate::results::{DeepEvidenceExecutionResults, ExecutionResults};
use crate::tool_node::ToolNode;
use async_trait::async_trait;
use bioweave_evidence::{
    clear_manager_cache, load_graph_data, manager, AddToGraph, RetrieveFromGraph,
};
use bioweave_graph::llm::ChatModel;
use bioweave_graph::messages::Message;
use bioweave_graph::state::{AppendReducer, StateSchema};
use bioweave_graph::stream::{StateSnapshot, StreamOptions};
use bioweave_graph::tool::{Tool, ToolOutput, ToolResult};
use bioweave_graph::{CompiledGraph, StateGraph, SubgraphExecutor, END, START};
use bioweave_sandbox::CodeExecutionResult;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

const GO_BFS: &str = "go_breadth_first_search";
const GO_DFS: &str = "go_depth_first_search";

/// Marker tool the orchestrator calls to dispatch a search round.
///
/// The router intercepts these calls and routes into the sub-workflow; the
/// tool body only runs if dispatch is bypassed, in which case it reminds
/// the model how the call is handled.
struct GoSearchTool {
    name: &'static str,
    description: String,
}

impl GoSearchTool {
    fn bfs(max_rounds: usize) -> Self {
        Self {
            name: GO_BFS,
            description: format!(
                "Start a round of breadth-first search on the given knowledge \
                 bases (up to {} sub-agent action rounds). Provide a one \
                 sentence search target.",
                max_rounds
            ),
        }
    }

    fn dfs(max_rounds: usize) -> Self {
        Self {
            name: GO_DFS,
            description: format!(
                "Start a round of depth-first search on the given knowledge \
                 bases (up to {} sub-agent action rounds). Provide a one \
                 sentence search target.",
                max_rounds
            ),
        }
    }
}

#[async_trait]
impl Tool for GoSearchTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_target": {
                    "type": "string",
                    "description": "A one sentence description of the target of this search round",
                },
                "knowledge_bases": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "The knowledge bases to search on",
                },
            },
            "required": ["search_target", "knowledge_bases"],
        })
    }

    async fn run(&self, _args: Value) -> ToolResult {
        Ok(ToolOutput::text(
            "Search dispatch is handled by the orchestrator workflow.",
        ))
    }
}

#[derive(Clone, Copy)]
enum SearchKind {
    Breadth,
    Depth,
}

impl SearchKind {
    fn workflow_name(&self) -> &'static str {
        match self {
            Self::Breadth => "bfs_workflow",
            Self::Depth => "dfs_workflow",
        }
    }

    fn agent_node(&self) -> &'static str {
        match self {
            Self::Breadth => "bfs_agent_node",
            Self::Depth => "dfs_agent_node",
        }
    }

    fn tool_node(&self) -> &'static str {
        match self {
            Self::Breadth => "bfs_agent_tool_node",
            Self::Depth => "dfs_agent_tool_node",
        }
    }

    fn dispatch_tool(&self) -> &'static str {
        match self {
            Self::Breadth => GO_BFS,
            Self::Depth => GO_DFS,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Self::Breadth => BFS_SYSTEM_PROMPT,
            Self::Depth => DFS_SYSTEM_PROMPT,
        }
    }
}

/// Configuration for [`DeepEvidenceAgent`].
#[derive(Clone)]
pub struct DeepEvidenceConfig {
    /// Round budgets (search, action, sub-agent)
    pub budgets: ResearchBudgets,
    /// Skip the evidence graph entirely
    pub light_mode: bool,
    /// Evidence-graph scope name for this agent
    pub evidence_graph_name: String,
    /// Evidence-graph cache directory
    pub evidence_graph_cache_dir: PathBuf,
}

impl Default for DeepEvidenceConfig {
    fn default() -> Self {
        Self {
            budgets: ResearchBudgets::default(),
            light_mode: false,
            evidence_graph_name: "evidence_graph".to_string(),
            evidence_graph_cache_dir: std::env::temp_dir().join("bioweave-evidence"),
        }
    }
}

/// Hierarchical breadth/depth-first literature researcher.
pub struct DeepEvidenceAgent {
    core: Arc<AgentCore>,
    catalog: Arc<KnowledgeBaseCatalog>,
    config: DeepEvidenceConfig,
    graph: CompiledGraph,
}

impl DeepEvidenceAgent {
    /// Construct with a sandbox per `spec`. `small_model` runs the
    /// sub-agent workflows and falls back to the orchestrator's model.
    pub async fn new(
        model: Arc<dyn ChatModel>,
        small_model: Option<Arc<dyn ChatModel>>,
        catalog: KnowledgeBaseCatalog,
        config: DeepEvidenceConfig,
        spec: SandboxSpec,
    ) -> Result<Self> {
        let core =
            AgentCore::initialize(model, small_model.clone(), spec, Default::default()).await;
        let runner = core.sandbox.clone().map(|s| s as Arc<dyn CodeRunner>);
        Self::from_parts(core, small_model, runner, catalog, config)
    }

    /// Construct from explicit parts (test seam).
    pub fn from_parts(
        core: AgentCore,
        small_model: Option<Arc<dyn ChatModel>>,
        runner: Option<Arc<dyn CodeRunner>>,
        catalog: KnowledgeBaseCatalog,
        config: DeepEvidenceConfig,
    ) -> Result<Self> {
        let core = Arc::new(core);
        let small_model = small_model.unwrap_or_else(|| core.model.clone());
        let catalog = Arc::new(catalog);
        let code_tool = Arc::new(CodeExecutionTool::new(runner));

        let bfs = Arc::new(Self::build_sub_workflow(
            core.clone(),
            small_model.clone(),
            catalog.clone(),
            code_tool.clone(),
            SearchKind::Breadth,
        )?);
        let dfs = Arc::new(Self::build_sub_workflow(
            core.clone(),
            small_model,
            catalog.clone(),
            code_tool.clone(),
            SearchKind::Depth,
        )?);

        let graph = Self::build_orchestrator_graph(
            core.clone(),
            catalog.clone(),
            code_tool,
            bfs,
            dfs,
            config.clone(),
        )?;

        Ok(Self {
            core,
            catalog,
            config,
            graph,
        })
    }

    fn agent_schema() -> StateSchema {
        StateSchema::with_messages()
            .field("code_execution_results", Box::new(AppendReducer))
    }

    /// Sub-agent tool set for the selected knowledge bases.
    fn sub_tools(
        catalog: &KnowledgeBaseCatalog,
        code_tool: &Arc<CodeExecutionTool>,
        knowledge_bases: &[String],
    ) -> Vec<Arc<dyn Tool>> {
        let mut tools = catalog.tools_for(knowledge_bases);
        tools.push(code_tool.clone() as Arc<dyn Tool>);
        tools
    }

    fn string_list_from_state(state: &Value, field: &str) -> Vec<String> {
        state
            .get(field)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn build_sub_workflow(
        core: Arc<AgentCore>,
        small_model: Arc<dyn ChatModel>,
        catalog: Arc<KnowledgeBaseCatalog>,
        code_tool: Arc<CodeExecutionTool>,
        kind: SearchKind,
    ) -> Result<CompiledGraph> {
        let mut graph = StateGraph::with_schema(kind.workflow_name(), Self::agent_schema());

        {
            let core = core.clone();
            let catalog = catalog.clone();
            let code_tool = code_tool.clone();
            let system_prompt = kind.system_prompt().replace("{workdir}", &core.workdir);
            graph.add_node(kind.agent_node(), move |state| {
                let core = core.clone();
                let catalog = catalog.clone();
                let code_tool = code_tool.clone();
                let small_model = small_model.clone();
                let system_prompt = system_prompt.clone();
                Box::pin(async move {
                    let knowledge_bases = Self::string_list_from_state(&state, "knowledge_bases");
                    let current_round = counter_from_state(&state, "current_round") as usize;
                    let budget = counter_from_state(&state, "action_rounds_budget") as usize;

                    let mut messages = vec![Message::system(system_prompt)];
                    messages.extend(messages_from_state(&state));
                    messages.push(Message::human(action_rounds_budget_prompt(
                        current_round,
                        budget,
                    )));

                    let tools = Self::sub_tools(&catalog, &code_tool, &knowledge_bases);
                    let response = core
                        .call_model_on(&*small_model, messages, &tools, false)
                        .await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);

                    tracing::debug!(round = current_round + 1, budget, "Sub-agent round");
                    Ok(json!({
                        "messages": [response.message],
                        "current_round": current_round + 1,
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        graph.add_node(kind.tool_node(), move |state| {
            let catalog = catalog.clone();
            let code_tool = code_tool.clone();
            Box::pin(async move {
                let knowledge_bases = Self::string_list_from_state(&state, "knowledge_bases");
                let tools = Self::sub_tools(&catalog, &code_tool, &knowledge_bases);
                let dispatcher = ToolNode::new(tools);
                let messages = messages_from_state(&state);
                let replies = dispatcher.execute(&messages).await;
                let executions = code_tool.take_results();
                Ok(json!({
                    "messages": replies,
                    "code_execution_results": executions,
                }))
            })
        });

        graph.add_edge(START, kind.agent_node());
        let tool_branch = kind.tool_node().to_string();
        let mut branches = HashMap::new();
        branches.insert(tool_branch.clone(), tool_branch.clone());
        branches.insert(END.to_string(), END.to_string());
        graph.add_conditional_edge(
            kind.agent_node(),
            move |state| {
                let messages = messages_from_state(state);
                match messages.last() {
                    Some(m) if m.is_assistant() && m.has_tool_calls() => tool_branch.clone(),
                    _ => END.to_string(),
                }
            },
            branches,
        );
        graph.add_edge(kind.tool_node(), kind.agent_node());

        Ok(graph.compile()?)
    }

    /// Orchestrator tool set for the allowed knowledge bases.
    fn orchestrator_tools(
        catalog: &KnowledgeBaseCatalog,
        code_tool: &Arc<CodeExecutionTool>,
        config: &DeepEvidenceConfig,
        allowed: &[String],
    ) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(GoSearchTool::bfs(config.budgets.subagent_action_rounds)),
            Arc::new(GoSearchTool::dfs(config.budgets.subagent_action_rounds)),
            code_tool.clone(),
        ];
        if !config.light_mode {
            tools.push(Arc::new(AddToGraph::new(
                config.evidence_graph_name.clone(),
                config.evidence_graph_cache_dir.clone(),
            )));
            tools.push(Arc::new(RetrieveFromGraph::new(
                config.evidence_graph_name.clone(),
                config.evidence_graph_cache_dir.clone(),
            )));
        }
        tools.extend(catalog.orchestrator_tools_for(allowed));
        tools
    }

    /// Node wrapping one sub-workflow dispatch: map the parent state into
    /// the child's input, invoke, and return the child's final response as
    /// the tool message answering the dispatching call.
    fn sub_dispatch_node(
        workflow: Arc<CompiledGraph>,
        kind: SearchKind,
        subagent_budget: usize,
    ) -> impl Fn(
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
           + 'static {
        move |state: Value| {
            let workflow = workflow.clone();
            Box::pin(async move {
                let messages = messages_from_state(&state);
                let dispatch_call = messages
                    .last()
                    .map(|m| m.tool_calls().to_vec())
                    .unwrap_or_default()
                    .into_iter()
                    .find(|c| c.name == kind.dispatch_tool())
                    .ok_or_else(|| {
                        format!(
                            "No {} tool call found in the orchestrator message",
                            kind.dispatch_tool()
                        )
                    })?;

                let search_target =
                    Self::string_list_from_state(&state, "search_targets").join("\n\n");
                let knowledge_bases =
                    Self::string_list_from_state(&state, "subagent_knowledge_bases");
                let requested = counter_from_state(&state, "search_rounds_budget") as usize;
                let budget = requested.min(subagent_budget).max(SUBAGENT_ROUND_FLOOR);

                let inputs = json!({
                    "messages": [Message::human(search_target)],
                    "knowledge_bases": knowledge_bases,
                    "action_rounds_budget": budget,
                    "current_round": 0,
                    "total_input_tokens": 0,
                    "total_output_tokens": 0,
                    "code_execution_results": [],
                });

                tracing::info!(workflow = kind.workflow_name(), budget, "Dispatching sub-workflow");
                let outputs = workflow.invoke(inputs).await?;

                let final_response = messages_from_state(&outputs)
                    .last()
                    .map(|m| bioweave_graph::messages::content_to_text(&m.content))
                    .unwrap_or_default();
                let reply = Message::tool(final_response, &dispatch_call.id)
                    .with_name(kind.dispatch_tool());

                Ok(json!({
                    "messages": [reply],
                    "total_input_tokens":
                        counter_from_state(&state, "total_input_tokens")
                            + counter_from_state(&outputs, "total_input_tokens"),
                    "total_output_tokens":
                        counter_from_state(&state, "total_output_tokens")
                            + counter_from_state(&outputs, "total_output_tokens"),
                }))
            })
        }
    }

    fn build_orchestrator_graph(
        core: Arc<AgentCore>,
        catalog: Arc<KnowledgeBaseCatalog>,
        code_tool: Arc<CodeExecutionTool>,
        bfs: Arc<CompiledGraph>,
        dfs: Arc<CompiledGraph>,
        config: DeepEvidenceConfig,
    ) -> Result<CompiledGraph> {
        let mut graph = StateGraph::with_schema("orchestrator_workflow", Self::agent_schema());

        {
            let core = core.clone();
            let catalog = catalog.clone();
            let code_tool = code_tool.clone();
            let config = config.clone();
            graph.add_node("orchestrator_node", move |state| {
                let core = core.clone();
                let catalog = catalog.clone();
                let code_tool = code_tool.clone();
                let config = config.clone();
                Box::pin(async move {
                    let allowed = {
                        let from_state = Self::string_list_from_state(&state, "knowledge_bases");
                        if from_state.is_empty() {
                            catalog.keys()
                        } else {
                            from_state
                        }
                    };
                    let tools =
                        Self::orchestrator_tools(&catalog, &code_tool, &config, &allowed);

                    let mut system_prompt =
                        ORCHESTRATOR_SYSTEM_PROMPT.replace("{workdir}", &core.workdir);
                    if !config.light_mode {
                        system_prompt.push_str(EVIDENCE_GRAPH_PROTOCOL_PROMPT);
                    }

                    let current_round = counter_from_state(&state, "current_round") as usize;
                    let current_action_round =
                        counter_from_state(&state, "current_action_round") as usize;

                    let mut messages = vec![Message::system(system_prompt)];
                    messages.extend(messages_from_state(&state));
                    messages.push(Message::human(search_rounds_budget_prompt(
                        current_round,
                        config.budgets.main_search_rounds,
                    )));
                    messages.push(Message::human(action_rounds_budget_prompt(
                        current_action_round,
                        config.budgets.main_action_rounds,
                    )));

                    let response = core.call_model(messages, &tools, false).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);

                    // Search-round accounting: dispatch calls consume a
                    // round; any other tool call is just an action.
                    let mut search_rounds = current_round;
                    let mut subagent_knowledge_bases: Vec<String> = Vec::new();
                    let mut search_targets: Vec<String> = Vec::new();
                    for call in response.message.tool_calls() {
                        if call.name == GO_BFS || call.name == GO_DFS {
                            search_rounds += 1;
                            if let Some(bases) =
                                call.args.get("knowledge_bases").and_then(|v| v.as_array())
                            {
                                for base in bases {
                                    if let Some(base) = base.as_str() {
                                        if !subagent_knowledge_bases.iter().any(|b| b == base) {
                                            subagent_knowledge_bases.push(base.to_string());
                                        }
                                    }
                                }
                            }
                            if let Some(target) =
                                call.args.get("search_target").and_then(|v| v.as_str())
                            {
                                if !search_targets.iter().any(|t| t == target) {
                                    search_targets.push(target.to_string());
                                }
                            }
                        }
                    }

                    tracing::info!(
                        search_rounds,
                        search_budget = config.budgets.main_search_rounds,
                        action_rounds = current_action_round + 1,
                        action_budget = config.budgets.main_action_rounds,
                        "Orchestrator round"
                    );

                    Ok(json!({
                        "messages": [response.message],
                        "subagent_knowledge_bases": subagent_knowledge_bases,
                        "search_targets": search_targets,
                        "current_round": search_rounds,
                        "current_action_round": current_action_round + 1,
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        {
            let catalog = catalog.clone();
            let code_tool = code_tool.clone();
            let config = config.clone();
            graph.add_node("tool_node", move |state| {
                let catalog = catalog.clone();
                let code_tool = code_tool.clone();
                let config = config.clone();
                Box::pin(async move {
                    let allowed = {
                        let from_state = Self::string_list_from_state(&state, "knowledge_bases");
                        if from_state.is_empty() {
                            catalog.keys()
                        } else {
                            from_state
                        }
                    };
                    let tools =
                        Self::orchestrator_tools(&catalog, &code_tool, &config, &allowed);
                    let dispatcher = ToolNode::new(tools);
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

        let subagent_budget = config.budgets.subagent_action_rounds;
        graph.add_subgraph_node(
            "bfs_workflow",
            bfs.clone() as Arc<dyn SubgraphExecutor>,
            Self::sub_dispatch_node(bfs, SearchKind::Breadth, subagent_budget),
        );
        graph.add_subgraph_node(
            "dfs_workflow",
            dfs.clone() as Arc<dyn SubgraphExecutor>,
            Self::sub_dispatch_node(dfs, SearchKind::Depth, subagent_budget),
        );

        graph.add_edge(START, "orchestrator_node");
        let mut branches = HashMap::new();
        for target in ["bfs_workflow", "dfs_workflow", "tool_node"] {
            branches.insert(target.to_string(), target.to_string());
        }
        branches.insert(END.to_string(), END.to_string());
        graph.add_conditional_edge(
            "orchestrator_node",
            |state| {
                let messages = messages_from_state(state);
                let last = match messages.last() {
                    Some(last) => last.clone(),
                    None => return END.to_string(),
                };
                match last.tool_calls().first() {
                    Some(call) if call.name == GO_BFS => "bfs_workflow".to_string(),
                    Some(call) if call.name == GO_DFS => "dfs_workflow".to_string(),
                    Some(_) => "tool_node".to_string(),
                    None => END.to_string(),
                }
            },
            branches,
        );
        graph.add_edge("tool_node", "orchestrator_node");
        graph.add_edge("bfs_workflow", "orchestrator_node");
        graph.add_edge("dfs_workflow", "orchestrator_node");

        Ok(graph
            .with_recursion_limit(recursion_limits::ORCHESTRATOR)
            .compile()?)
    }

    fn initial_state(&self, input_query: &str, knowledge_bases: &[String]) -> Value {
        json!({
            "messages": [Message::human(input_query)],
            "user_query": input_query,
            "knowledge_bases": knowledge_bases,
            "subagent_knowledge_bases": [],
            "search_targets": [],
            "search_rounds_budget": 0,
            "current_round": 0,
            "current_action_round": 0,
            "total_input_tokens": 0,
            "total_output_tokens": 0,
            "code_execution_results": [],
        })
    }

    fn validate_knowledge_bases(&self, knowledge_bases: Option<Vec<String>>) -> Result<Vec<String>> {
        match knowledge_bases {
            None => Ok(self.catalog.keys()),
            Some(bases) => {
                for base in &bases {
                    if !self.catalog.is_known(base) {
                        return Err(AgentError::InvalidInput(format!(
                            "Unknown knowledge base: {}. Must be one of {:?}",
                            base,
                            self.catalog.keys()
                        )));
                    }
                }
                Ok(bases)
            }
        }
    }

    /// Streaming view with sub-workflow transparency.
    pub fn generate(
        &self,
        input_query: &str,
        knowledge_bases: Option<Vec<String>>,
    ) -> Result<ReceiverStream<StateSnapshot>> {
        let bases = self.validate_knowledge_bases(knowledge_bases)?;
        Ok(self.graph.stream(
            self.initial_state(input_query, &bases),
            StreamOptions {
                subgraphs: true,
                recursion_limit: Some(recursion_limits::ORCHESTRATOR),
                ..Default::default()
            },
        ))
    }

    /// Blocking run. Clears the evidence-graph scope first when asked,
    /// and embeds the full graph dump in the result.
    pub async fn go(
        &self,
        input_query: &str,
        knowledge_bases: Option<Vec<String>>,
        clear_evidence_graph_cache: bool,
    ) -> Result<DeepEvidenceExecutionResults> {
        let bases = self.validate_knowledge_bases(knowledge_bases)?;

        if clear_evidence_graph_cache && !self.config.light_mode {
            let handle = manager(
                &self.config.evidence_graph_name,
                &self.config.evidence_graph_cache_dir,
            )?;
            if let Ok(mut guard) = handle.lock() {
                guard.clear()?;
            }
            clear_manager_cache(Some(&self.config.evidence_graph_cache_dir));
        }

        let final_state = self
            .graph
            .invoke(self.initial_state(input_query, &bases))
            .await?;

        let messages = messages_from_state(&final_state);
        let executions: Vec<CodeExecutionResult> = final_state
            .get("code_execution_results")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let evidence_graph_data = if self.config.light_mode {
            Default::default()
        } else {
            load_graph_data(
                &self.config.evidence_graph_name,
                &self.config.evidence_graph_cache_dir,
            )?
        };

        Ok(DeepEvidenceExecutionResults {
            base: ExecutionResults::from_run(&messages, executions),
            total_input_tokens: counter_from_state(&final_state, "total_input_tokens"),
            total_output_tokens: counter_from_state(&final_state, "total_output_tokens"),
            evidence_graph_data,
        })
    }

    /// Upload workspace datasets and install the companion tools module.
    pub async fn register_workspace(
        &self,
        local_dir: Option<&std::path::Path>,
        install_tools: bool,
    ) -> Result<Vec<String>> {
        self.core.register_workspace(local_dir, install_tools).await
    }

    /// Tear down the sandbox.
    pub async fn clear_workspace(&self) -> Result<()> {
        self.core.clear_workspace().await
    }
}
