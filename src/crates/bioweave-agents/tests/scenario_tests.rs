//! End-to-end agent scenarios with scripted models and stub tools.

use async_trait::async_trait;
use bioweave_agents::base::AgentCore;
use bioweave_agents::code_tool::CodeRunner;
use bioweave_agents::config::{DocGenLimits, ResearchBudgets};
use bioweave_agents::deepevidence::{DeepEvidenceAgent, DeepEvidenceConfig};
use bioweave_agents::docgen::{DocGenAgent, SectionTemplate};
use bioweave_agents::knowledge::KnowledgeBaseCatalog;
use bioweave_agents::react::ReactAgent;
use bioweave_graph::error::Result as GraphResult;
use bioweave_graph::llm::{ChatModel, ChatRequest, ChatResponse};
use bioweave_graph::messages::{Message, TokenUsage, ToolCall};
use bioweave_graph::tool::{Tool, ToolError, ToolOutput, ToolResult};
use bioweave_sandbox::{CodeExecutionResult, Language};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Chat model replaying a fixed transcript of assistant messages.
struct ScriptedModel {
    responses: Mutex<VecDeque<Message>>,
}

impl ScriptedModel {
    fn new(responses: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, _request: ChatRequest) -> GraphResult<ChatResponse> {
        let message = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Message::assistant("script exhausted"));
        let message = message.with_usage(TokenUsage::new(10, 5));
        let usage = message.usage;
        Ok(ChatResponse { message, usage })
    }
}

/// Code runner scripting a successful `print(2+2)` execution.
struct FourRunner;

#[async_trait]
impl CodeRunner for FourRunner {
    async fn run_code(
        &self,
        _language: Language,
        code: &str,
    ) -> std::result::Result<CodeExecutionResult, String> {
        Ok(CodeExecutionResult {
            code: code.to_string(),
            console_output: "4\n".to_string(),
            running_time_s: 0.05,
            peak_memory_mb: 10.0,
            exit_code: 0,
            artifact_paths: vec![],
        })
    }
}

/// ReAct on a trivial task: one code_execution call, stdout carries
/// "4", exactly one execution record with exit code 0, final answer
/// references 4.
#[tokio::test]
async fn react_trivial_code_task() {
    let model = ScriptedModel::new(vec![
        Message::assistant("Let me compute that.").with_tool_calls(vec![ToolCall::new(
            "call-1",
            "code_execution",
            json!({"language": "python", "code": "print(2+2)"}),
        )]),
        Message::assistant("The answer is 4."),
    ]);

    let agent = ReactAgent::from_parts(
        AgentCore::for_model(model),
        Some(Arc::new(FourRunner)),
        Vec::new(),
    )
    .unwrap();

    let results = agent.go("What is 2+2? Use code.").await.unwrap();

    let tool_call_lines: Vec<&str> = results
        .message_history
        .iter()
        .filter(|m| m.content.contains("Tool call: code_execution"))
        .map(|m| m.content.as_str())
        .collect();
    assert!(!tool_call_lines.is_empty(), "no code_execution call recorded");

    assert_eq!(results.code_execution_results.len(), 1);
    assert_eq!(results.code_execution_results[0].exit_code, 0);
    assert!(results.code_execution_results[0].console_output.contains('4'));
    assert!(results.final_response.contains('4'));
}

struct BoomTool;

#[async_trait]
impl Tool for BoomTool {
    fn name(&self) -> &str {
        "boom"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    async fn run(&self, _args: Value) -> ToolResult {
        Err(ToolError::execution("boom", "boom"))
    }
}

/// Tool dispatch error isolation: a raising tool becomes an error
/// tool message with the same call id; the run continues to a normal end.
#[tokio::test]
async fn tool_error_isolation() {
    let model = ScriptedModel::new(vec![
        Message::assistant("Trying the tool.").with_tool_calls(vec![ToolCall::new(
            "call-err",
            "boom",
            json!({}),
        )]),
        Message::assistant("The tool failed; answering directly."),
    ]);

    let agent = ReactAgent::from_parts(
        AgentCore::for_model(model),
        None,
        vec![Arc::new(BoomTool)],
    )
    .unwrap();

    let results = agent.go("Trigger the tool").await.unwrap();

    let error_messages: Vec<_> = results
        .message_history
        .iter()
        .filter(|m| m.role == "tool" && m.content.contains("Error executing tool"))
        .collect();
    assert_eq!(error_messages.len(), 1);
    assert!(error_messages[0].content.contains("boom"));
    // The run continued past the failure.
    assert!(results.final_response.contains("answering directly"));
}

/// BFS orchestrator budget accounting: one go_breadth_first_search
/// dispatch then a bare conclusion gives `current_round == 1`,
/// `current_action_round == 2`, and a normal END.
#[tokio::test]
async fn orchestrator_budget_accounting() {
    let orchestrator_model = ScriptedModel::new(vec![
        Message::assistant("Dispatching a breadth-first sweep.").with_tool_calls(vec![
            ToolCall::new(
                "call-bfs",
                "go_breadth_first_search",
                json!({
                    "search_target": "BRCA1 resistance mechanisms",
                    "knowledge_bases": ["pubmed_papers"],
                }),
            ),
        ]),
        Message::assistant("Evidence gathered; concluding."),
    ]);
    // Sub-agent answers without tool calls, ending its workflow in one round.
    let sub_model = ScriptedModel::new(vec![Message::assistant(
        "Survey complete: three relevant papers found.",
    )]);

    let config = DeepEvidenceConfig {
        budgets: ResearchBudgets {
            main_search_rounds: 1,
            main_action_rounds: 20,
            subagent_action_rounds: 5,
        },
        light_mode: true,
        ..Default::default()
    };

    let agent = DeepEvidenceAgent::from_parts(
        AgentCore::for_model(orchestrator_model),
        Some(sub_model),
        None,
        KnowledgeBaseCatalog::new(),
        config,
    )
    .unwrap();

    let snapshots: Vec<_> = agent
        .generate("What drives PARP inhibitor resistance?", None)
        .unwrap()
        .collect()
        .await;
    assert!(!snapshots.is_empty());

    // Final top-level snapshot carries the terminal counters.
    let final_state = snapshots
        .iter()
        .rev()
        .find(|s| s.namespace.is_empty())
        .map(|s| s.state.clone())
        .unwrap();
    assert_eq!(final_state["current_round"], 1);
    assert_eq!(final_state["current_action_round"], 2);

    // Every snapshot respects search rounds <= action rounds.
    for snapshot in snapshots.iter().filter(|s| s.namespace.is_empty()) {
        let search = snapshot.state["current_round"].as_u64().unwrap_or(0);
        let action = snapshot.state["current_action_round"].as_u64().unwrap_or(0);
        assert!(search <= action);
    }

    // Sub-workflow snapshots were surfaced transparently.
    assert!(snapshots
        .iter()
        .any(|s| s.namespace == vec!["bfs_workflow".to_string()]));
}

/// The dispatched round's answer joins the conversation as
/// a tool message for the go_breadth_first_search call, and token totals
/// roll up from the sub-agent.
#[tokio::test]
async fn subagent_tokens_roll_up() {
    let orchestrator_model = ScriptedModel::new(vec![
        Message::assistant("Dispatching.").with_tool_calls(vec![ToolCall::new(
            "call-bfs",
            "go_breadth_first_search",
            json!({"search_target": "t", "knowledge_bases": ["pubmed_papers"]}),
        )]),
        Message::assistant("Done."),
    ]);
    let sub_model = ScriptedModel::new(vec![Message::assistant("findings")]);

    let agent = DeepEvidenceAgent::from_parts(
        AgentCore::for_model(orchestrator_model),
        Some(sub_model),
        None,
        KnowledgeBaseCatalog::new(),
        DeepEvidenceConfig {
            light_mode: true,
            ..Default::default()
        },
    )
    .unwrap();

    let results = agent.go("q", None, false).await.unwrap();

    // 2 orchestrator calls + 1 sub-agent call, 10/5 tokens each.
    assert_eq!(results.total_input_tokens, 30);
    assert_eq!(results.total_output_tokens, 15);

    let dispatch_answer = results
        .base
        .message_history
        .iter()
        .find(|m| m.role == "tool" && m.content.contains("findings"));
    assert!(dispatch_answer.is_some(), "sub-workflow answer missing");
}

struct CannedSearchTool {
    name: &'static str,
    output: &'static str,
}

#[async_trait]
impl Tool for CannedSearchTool {
    fn name(&self) -> &str {
        self.name
    }
    fn description(&self) -> &str {
        "Canned search output"
    }
    async fn run(&self, _args: Value) -> ToolResult {
        Ok(ToolOutput::text(self.output))
    }
}

/// SLR pipeline walk-through: the identified-studies list respects the
/// `max_search_results` cap, screening carries studies into inclusion,
/// and the final report assembles.
#[tokio::test]
async fn slr_pipeline_caps_identified_studies() {
    use bioweave_agents::config::SlrLimits;
    use bioweave_agents::slr::{SlrAgent, SlrToolset};

    let model = ScriptedModel::new(vec![
        // Stage 1: search
        Message::assistant("Searching both sources.").with_tool_calls(vec![ToolCall::new(
            "s1",
            "pubmed_search",
            json!({"query": "CAR-T lymphoma"}),
        )]),
        Message::assistant("Search complete; three PubMed records and one trial found."),
        // Stage 2: screening
        Message::assistant("Generating criteria.").with_tool_calls(vec![ToolCall::new(
            "s2",
            "generate_eligibility_criteria",
            json!({}),
        )]),
        Message::assistant("Screening complete; all candidates eligible."),
        // Stage 3: extraction (no tools needed)
        Message::assistant("Extraction complete; fields captured."),
        // Stage 4: synthesis
        Message::assistant("Synthesis: the evidence consistently favors the intervention."),
    ]);

    let toolset = SlrToolset {
        search: vec![Arc::new(CannedSearchTool {
            name: "pubmed_search",
            output: "**Title:** First trial\nPMID: 111\n**Title:** Second trial\nPMID: 222\nPMID: 333\nNCT01234567",
        })],
        screening: vec![Arc::new(CannedSearchTool {
            name: "generate_eligibility_criteria",
            output: "C1. Adults with relapsed disease\nE1. Case reports",
        })],
        ..Default::default()
    };

    let limits = SlrLimits {
        max_search_results: 2,
        max_studies_to_screen: 10,
        max_studies_to_include: 10,
    };
    let agent = SlrAgent::from_parts(AgentCore::for_model(model), toolset, limits).unwrap();

    let results = agent
        .go("Does CAR-T therapy improve outcomes in relapsed B-cell lymphoma?")
        .await
        .unwrap();

    // Hard cap on the combined identified list.
    assert!(results.identified_pubmed.len() + results.identified_ctgov.len() <= 2);
    assert_eq!(results.identified_pubmed[0].id, "111");
    assert_eq!(results.identified_pubmed[0].title, "First trial");

    assert!(!results.included_studies.is_empty());
    assert!(results.included_studies.len() <= 10);

    assert!(results
        .final_report
        .starts_with("# Systematic Literature Review Report"));
    assert!(results.final_report.contains("consistently favors"));

    let prisma = results.prisma_summary();
    assert_eq!(prisma["identified"], prisma["screened"]);
}

/// Document revision loop: NEEDS_REVISION then APPROVED yields one
/// completed section with iteration_count 2 and an assembled document.
#[tokio::test]
async fn docgen_revision_loop() {
    let model = ScriptedModel::new(vec![
        Message::assistant("Intro draft one."),
        Message::assistant("NEEDS_REVISION: too short"),
        Message::assistant("Intro draft two, fuller."),
        Message::assistant("APPROVED"),
    ]);

    let agent = DocGenAgent::from_parts(
        AgentCore::for_model(model),
        DocGenLimits {
            max_iterations_per_section: 2,
        },
    )
    .unwrap();

    let results = agent
        .go(
            vec![SectionTemplate {
                title: "Intro".to_string(),
                guidance: "One sentence.".to_string(),
                order: 0,
            }],
            vec![],
        )
        .await
        .unwrap();

    assert_eq!(results.completed_sections.len(), 1);
    assert_eq!(results.completed_sections[0].iteration_count, 2);
    assert!(results.final_document.starts_with("# Intro"));
    assert!(results.final_document.contains("Intro draft two"));
}

/// Iteration cap forces completion even under perpetual NEEDS_REVISION.
#[tokio::test]
async fn docgen_cap_forces_complete() {
    let model = ScriptedModel::new(vec![
        Message::assistant("Draft 1."),
        Message::assistant("NEEDS_REVISION: no"),
        Message::assistant("Draft 2."),
        Message::assistant("NEEDS_REVISION: still no"),
    ]);

    let agent = DocGenAgent::from_parts(
        AgentCore::for_model(model),
        DocGenLimits {
            max_iterations_per_section: 2,
        },
    )
    .unwrap();

    let results = agent
        .go(
            vec![SectionTemplate {
                title: "Methods".to_string(),
                guidance: "Describe the methods.".to_string(),
                order: 0,
            }],
            vec![],
        )
        .await
        .unwrap();

    assert_eq!(results.completed_sections.len(), 1);
    assert_eq!(results.completed_sections[0].iteration_count, 2);
    assert_eq!(results.completed_sections[0].content, "Draft 2.");
}
