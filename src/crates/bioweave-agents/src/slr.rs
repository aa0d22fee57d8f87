//! Systematic literature review: a linear four-stage pipeline.
//!
//! search → screening → extraction → synthesis → finalize report. Each
//! stage is a mini-graph `stage_entry → tool_dispatch ↔ stage_continue →
//! finalize_stage`, routed by the shape of the last message: tool calls
//! present → dispatch; a tool result just written → continue; final prose
//! → finalize and hand over to the next stage.
//!
//! The search stage draws on two sources (PubMed and ClinicalTrials.gov
//! tools supplied by the caller), parses identifiers out of tool output
//! with fixed regexes (`PMID:\s*(\d+)`, `NCT\d+`), deduplicates, and
//! hard-caps the identified list at `max_search_results`.

use crate::base::{counter_from_state, messages_from_state, AgentCore, SandboxSpec};
use crate::config::{recursion_limits, SlrLimits};
use crate::error::Result;
use crate::prompts::{
    SLR_EXTRACTION_SYSTEM_PROMPT, SLR_SCREENING_SYSTEM_PROMPT, SLR_SEARCH_SYSTEM_PROMPT,
    SLR_SYNTHESIS_SYSTEM_PROMPT,
};
use crate::results::{ExecutionResults, IncludedStudy, SlrExecutionResults, StudyReference};
use crate::tool_node::ToolNode;
use bioweave_graph::llm::ChatModel;
use bioweave_graph::messages::{content_to_text, Message, MessageRole};
use bioweave_graph::state::StateSchema;
use bioweave_graph::tool::Tool;
use bioweave_graph::{CompiledGraph, StateGraph, END, START};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-stage tool sets, supplied by the caller (the PubMed and
/// ClinicalTrials.gov clients are external collaborators).
#[derive(Clone, Default)]
pub struct SlrToolset {
    /// Search-stage tools (PubMed search, ClinicalTrials.gov search)
    pub search: Vec<Arc<dyn Tool>>,
    /// Screening-stage tools (criteria generation, per-study scoring)
    pub screening: Vec<Arc<dyn Tool>>,
    /// Extraction-stage tools
    pub extraction: Vec<Arc<dyn Tool>>,
    /// Synthesis-stage tools (aggregation, report helpers)
    pub synthesis: Vec<Arc<dyn Tool>>,
}

fn study_refs_from_state(state: &Value, field: &str) -> Vec<StudyReference> {
    state
        .get(field)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn text_field(state: &Value, field: &str) -> String {
    state
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Parse PMIDs (with optional titles) and NCT ids out of tool output,
/// appending unseen identifiers until the combined cap is reached.
fn parse_identifiers(
    text: &str,
    pubmed: &mut Vec<StudyReference>,
    ctgov: &mut Vec<StudyReference>,
    max_total: usize,
) {
    // Fixed patterns; compile failure is impossible for literals, but the
    // parser stays quiet rather than panicking if it ever were.
    let (Ok(pmid_re), Ok(title_re), Ok(nct_re)) = (
        Regex::new(r"PMID:\s*(\d+)"),
        Regex::new(r"\*\*Title:\*\*\s*([^\n]+)"),
        Regex::new(r"NCT\d+"),
    ) else {
        return;
    };

    let titles: Vec<&str> = title_re
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    for (idx, capture) in pmid_re.captures_iter(text).enumerate() {
        if pubmed.len() + ctgov.len() >= max_total {
            return;
        }
        let Some(pmid) = capture.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if pubmed.iter().any(|s| s.id == pmid) {
            continue;
        }
        pubmed.push(StudyReference {
            id: pmid.to_string(),
            source: "pubmed".to_string(),
            title: titles.get(idx).map(|t| t.trim().to_string()).unwrap_or_default(),
        });
    }

    for m in nct_re.find_iter(text) {
        if pubmed.len() + ctgov.len() >= max_total {
            return;
        }
        let nct = m.as_str();
        if ctgov.iter().any(|s| s.id == nct) {
            continue;
        }
        ctgov.push(StudyReference {
            id: nct.to_string(),
            source: "ctgov".to_string(),
            title: String::new(),
        });
    }
}

/// Parse eligibility criteria lines (`C1. ...` / `E2. ...`) out of tool
/// output.
fn parse_criteria(text: &str, criteria: &mut Vec<String>) {
    let Ok(re) = Regex::new(r"(?m)^([CE]\d+)\.\s+(.+)$") else {
        return;
    };
    for capture in re.captures_iter(text) {
        let line = format!("{}. {}", &capture[1], capture[2].trim());
        if !criteria.contains(&line) {
            criteria.push(line);
        }
    }
}

/// Systematic-review agent.
pub struct SlrAgent {
    core: Arc<AgentCore>,
    graph: CompiledGraph,
    limits: SlrLimits,
}

impl SlrAgent {
    /// Construct with a sandbox per `spec`.
    pub async fn new(
        model: Arc<dyn ChatModel>,
        toolset: SlrToolset,
        limits: SlrLimits,
        spec: SandboxSpec,
    ) -> Result<Self> {
        let core = AgentCore::initialize(model, None, spec, Default::default()).await;
        Self::from_parts(core, toolset, limits)
    }

    /// Construct from explicit parts (test seam).
    pub fn from_parts(core: AgentCore, toolset: SlrToolset, limits: SlrLimits) -> Result<Self> {
        let core = Arc::new(core);
        let graph = Self::build_graph(core.clone(), toolset, limits.clone())?;
        Ok(Self {
            core,
            graph,
            limits,
        })
    }

    /// Shared router shape for every stage: tool calls → dispatch, tool
    /// reply → continue, prose → finalize (search additionally requires at
    /// least one identified study before finalizing).
    fn stage_router(
        state: &Value,
        tools_branch: &str,
        continue_branch: &str,
        finalize_branch: &str,
        require_studies: bool,
    ) -> String {
        let messages = messages_from_state(state);
        match messages.last() {
            Some(m) if m.is_assistant() && m.has_tool_calls() => tools_branch.to_string(),
            Some(m) if m.role == MessageRole::Tool => continue_branch.to_string(),
            Some(m) if m.is_assistant() => {
                if require_studies {
                    let identified = study_refs_from_state(state, "identified_pubmed").len()
                        + study_refs_from_state(state, "identified_ctgov").len();
                    if identified == 0 {
                        return continue_branch.to_string();
                    }
                }
                finalize_branch.to_string()
            }
            _ => continue_branch.to_string(),
        }
    }

    fn build_graph(
        core: Arc<AgentCore>,
        toolset: SlrToolset,
        limits: SlrLimits,
    ) -> Result<CompiledGraph> {
        let schema = StateSchema::with_messages();
        let mut graph = StateGraph::with_schema("trialweave_slr", schema);

        // ------------------------------------------------------------------
        // Stage 1: literature search
        // ------------------------------------------------------------------
        {
            let core = core.clone();
            let tools = toolset.search.clone();
            let max_results = limits.max_search_results;
            graph.add_node("search_stage", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let question = text_field(&state, "research_question");
                    let system_prompt = format!(
                        "{}\n\n# RESEARCH QUESTION:\n{}\n\n# SEARCH LIMIT:\nRetrieve at most {} studies in total across PubMed and ClinicalTrials.gov.",
                        SLR_SEARCH_SYSTEM_PROMPT, question, max_results
                    );
                    let messages = vec![
                        Message::system(system_prompt),
                        Message::human(format!(
                            "Please conduct a literature search for: {}",
                            question
                        )),
                    ];
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "workflow_stage": "search",
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        {
            let tools = toolset.search.clone();
            let max_results = limits.max_search_results;
            graph.add_node("search_tools", move |state| {
                let dispatcher = ToolNode::new(tools.clone());
                Box::pin(async move {
                    let messages = messages_from_state(&state);
                    let replies = dispatcher.execute(&messages).await;

                    let mut pubmed = study_refs_from_state(&state, "identified_pubmed");
                    let mut ctgov = study_refs_from_state(&state, "identified_ctgov");
                    for reply in &replies {
                        parse_identifiers(
                            &content_to_text(&reply.content),
                            &mut pubmed,
                            &mut ctgov,
                            max_results,
                        );
                    }

                    Ok(json!({
                        "messages": replies,
                        "identified_pubmed": pubmed,
                        "identified_ctgov": ctgov,
                    }))
                })
            });
        }

        {
            let core = core.clone();
            let tools = toolset.search.clone();
            graph.add_node("search_continue", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let pubmed = study_refs_from_state(&state, "identified_pubmed");
                    let ctgov = study_refs_from_state(&state, "identified_ctgov");
                    let progress = format!(
                        "Search progress: {} PubMed studies and {} registered trials \
                         identified so far. Continue with additional searches if needed, \
                         or summarize the search results if complete.",
                        pubmed.len(),
                        ctgov.len()
                    );
                    let mut messages = vec![Message::system(SLR_SEARCH_SYSTEM_PROMPT)];
                    messages.extend(messages_from_state(&state));
                    messages.push(Message::human(progress));
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        graph.add_node("finalize_search", |state| {
            Box::pin(async move {
                let messages = messages_from_state(&state);
                let summary = messages
                    .last()
                    .map(|m| content_to_text(&m.content))
                    .unwrap_or_default();
                let identified = study_refs_from_state(&state, "identified_pubmed").len()
                    + study_refs_from_state(&state, "identified_ctgov").len();
                Ok(json!({
                    "search_summary": summary,
                    "workflow_stage": "screening",
                    "messages": [Message::assistant(format!(
                        "Literature search complete. Identified {} studies. Moving to screening stage.",
                        identified
                    ))],
                }))
            })
        });

        // ------------------------------------------------------------------
        // Stage 2: screening
        // ------------------------------------------------------------------
        {
            let core = core.clone();
            let tools = toolset.screening.clone();
            let max_screen = limits.max_studies_to_screen;
            graph.add_node("screening_stage", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let question = text_field(&state, "research_question");
                    let pubmed = study_refs_from_state(&state, "identified_pubmed");
                    let ctgov = study_refs_from_state(&state, "identified_ctgov");
                    let candidates: Vec<String> = pubmed
                        .iter()
                        .chain(ctgov.iter())
                        .take(max_screen)
                        .map(|s| format!("- {} ({}): {}", s.id, s.source, s.title))
                        .collect();
                    let system_prompt = format!(
                        "{}\n\n# RESEARCH QUESTION:\n{}\n\n# SEARCH SUMMARY:\n{}",
                        SLR_SCREENING_SYSTEM_PROMPT,
                        question,
                        text_field(&state, "search_summary"),
                    );
                    let messages = vec![
                        Message::system(system_prompt),
                        Message::human(format!(
                            "Please screen the following {} studies:\n\n{}",
                            candidates.len(),
                            candidates.join("\n")
                        )),
                    ];
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "workflow_stage": "screening",
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        {
            let tools = toolset.screening.clone();
            graph.add_node("screening_tools", move |state| {
                let dispatcher = ToolNode::new(tools.clone());
                Box::pin(async move {
                    let messages = messages_from_state(&state);
                    let replies = dispatcher.execute(&messages).await;

                    let mut criteria: Vec<String> = state
                        .get("eligibility_criteria")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    for reply in &replies {
                        parse_criteria(&content_to_text(&reply.content), &mut criteria);
                    }

                    Ok(json!({
                        "messages": replies,
                        "eligibility_criteria": criteria,
                    }))
                })
            });
        }

        {
            let core = core.clone();
            let tools = toolset.screening.clone();
            graph.add_node("screening_continue", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let criteria: Vec<String> = state
                        .get("eligibility_criteria")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    let progress = format!(
                        "Screening progress: {} eligibility criteria defined. Please \
                         continue screening studies or summarize results if complete.",
                        criteria.len()
                    );
                    let mut messages = vec![Message::system(SLR_SCREENING_SYSTEM_PROMPT)];
                    messages.extend(messages_from_state(&state));
                    messages.push(Message::human(progress));
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        {
            let max_include = limits.max_studies_to_include;
            graph.add_node("finalize_screening", move |state| {
                Box::pin(async move {
                    let pubmed = study_refs_from_state(&state, "identified_pubmed");
                    let ctgov = study_refs_from_state(&state, "identified_ctgov");
                    let included: Vec<IncludedStudy> = pubmed
                        .iter()
                        .chain(ctgov.iter())
                        .take(max_include)
                        .map(|s| IncludedStudy {
                            id: s.id.clone(),
                            source: s.source.clone(),
                            title: s.title.clone(),
                            eligibility: "include".to_string(),
                        })
                        .collect();
                    let messages = messages_from_state(&state);
                    let summary = messages
                        .last()
                        .map(|m| content_to_text(&m.content))
                        .unwrap_or_default();
                    let count = included.len();
                    Ok(json!({
                        "included_studies": included,
                        "screening_summary": summary,
                        "workflow_stage": "extraction",
                        "messages": [Message::assistant(format!(
                            "Screening complete. {} studies included for data extraction.",
                            count
                        ))],
                    }))
                })
            });
        }

        // ------------------------------------------------------------------
        // Stage 3: extraction
        // ------------------------------------------------------------------
        {
            let core = core.clone();
            let tools = toolset.extraction.clone();
            graph.add_node("extraction_stage", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let included: Vec<IncludedStudy> = state
                        .get("included_studies")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();
                    let listing: Vec<String> = included
                        .iter()
                        .map(|s| format!("- {} ({}): {}", s.id, s.source, s.title))
                        .collect();
                    let system_prompt = format!(
                        "{}\n\n# RESEARCH QUESTION:\n{}",
                        SLR_EXTRACTION_SYSTEM_PROMPT,
                        text_field(&state, "research_question"),
                    );
                    let messages = vec![
                        Message::system(system_prompt),
                        Message::human(format!(
                            "Please extract structured data from the {} included studies:\n\n{}",
                            included.len(),
                            listing.join("\n")
                        )),
                    ];
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "workflow_stage": "extraction",
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        {
            let tools = toolset.extraction.clone();
            graph.add_node("extraction_tools", move |state| {
                let dispatcher = ToolNode::new(tools.clone());
                Box::pin(async move {
                    let messages = messages_from_state(&state);
                    let replies = dispatcher.execute(&messages).await;
                    Ok(json!({"messages": replies}))
                })
            });
        }

        {
            let core = core.clone();
            let tools = toolset.extraction.clone();
            graph.add_node("extraction_continue", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let mut messages = vec![Message::system(SLR_EXTRACTION_SYSTEM_PROMPT)];
                    messages.extend(messages_from_state(&state));
                    messages.push(Message::human(
                        "Please continue extraction, or summarize the extracted fields if complete.",
                    ));
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        graph.add_node("finalize_extraction", |state| {
            Box::pin(async move {
                let messages = messages_from_state(&state);
                let summary = messages
                    .last()
                    .map(|m| content_to_text(&m.content))
                    .unwrap_or_default();
                Ok(json!({
                    "extraction_summary": summary,
                    "workflow_stage": "synthesis",
                    "messages": [Message::assistant(
                        "Data extraction complete. Moving to evidence synthesis."
                    )],
                }))
            })
        });

        // ------------------------------------------------------------------
        // Stage 4: synthesis
        // ------------------------------------------------------------------
        {
            let core = core.clone();
            let tools = toolset.synthesis.clone();
            graph.add_node("synthesis_stage", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let system_prompt = format!(
                        "{}\n\n# RESEARCH QUESTION:\n{}\n\n# EXTRACTION SUMMARY:\n{}",
                        SLR_SYNTHESIS_SYSTEM_PROMPT,
                        text_field(&state, "research_question"),
                        text_field(&state, "extraction_summary"),
                    );
                    let messages = vec![
                        Message::system(system_prompt),
                        Message::human(
                            "Please synthesize the evidence and generate the final SLR report.",
                        ),
                    ];
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "workflow_stage": "synthesis",
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        {
            let tools = toolset.synthesis.clone();
            graph.add_node("synthesis_tools", move |state| {
                let dispatcher = ToolNode::new(tools.clone());
                Box::pin(async move {
                    let messages = messages_from_state(&state);
                    let replies = dispatcher.execute(&messages).await;
                    Ok(json!({"messages": replies}))
                })
            });
        }

        {
            let core = core.clone();
            let tools = toolset.synthesis.clone();
            graph.add_node("synthesis_continue", move |state| {
                let core = core.clone();
                let tools = tools.clone();
                Box::pin(async move {
                    let mut messages = vec![Message::system(SLR_SYNTHESIS_SYSTEM_PROMPT)];
                    messages.extend(messages_from_state(&state));
                    messages.push(Message::human(
                        "Please finalize the evidence synthesis and provide the complete \
                         SLR report in markdown format.",
                    ));
                    let response = core.call_model(messages, &tools, true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    Ok(json!({
                        "messages": [response.message],
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        graph.add_node("finalize_report", |state| {
            Box::pin(async move {
                let messages = messages_from_state(&state);
                let synthesis = messages
                    .last()
                    .map(|m| content_to_text(&m.content))
                    .unwrap_or_default();
                let pubmed = study_refs_from_state(&state, "identified_pubmed");
                let ctgov = study_refs_from_state(&state, "identified_ctgov");
                let included: Vec<IncludedStudy> = state
                    .get("included_studies")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();

                let final_report = format!(
                    "# Systematic Literature Review Report\n\n\
                     ## Research Question\n{}\n\n\
                     ## Study Flow\n\
                     - Studies identified: {} ({} PubMed, {} ClinicalTrials.gov)\n\
                     - Studies included: {}\n\n\
                     ## Methods\n\n### Literature Search\n{}\n\n\
                     ### Study Selection\n{}\n\n### Data Extraction\n{}\n\n\
                     ## Evidence Synthesis\n{}\n",
                    text_field(&state, "research_question"),
                    pubmed.len() + ctgov.len(),
                    pubmed.len(),
                    ctgov.len(),
                    included.len(),
                    text_field(&state, "search_summary"),
                    text_field(&state, "screening_summary"),
                    text_field(&state, "extraction_summary"),
                    synthesis,
                );

                Ok(json!({
                    "final_report": final_report,
                    "synthesis_summary": synthesis,
                    "workflow_stage": "completed",
                    "messages": [Message::assistant(
                        "Systematic literature review complete. Final report generated."
                    )],
                }))
            })
        });

        // ------------------------------------------------------------------
        // Wiring
        // ------------------------------------------------------------------
        graph.add_edge(START, "search_stage");

        let stage_edges = [
            (
                "search_stage",
                "search_tools",
                "search_continue",
                "finalize_search",
                true,
            ),
            (
                "search_continue",
                "search_tools",
                "search_continue",
                "finalize_search",
                true,
            ),
            (
                "screening_stage",
                "screening_tools",
                "screening_continue",
                "finalize_screening",
                false,
            ),
            (
                "screening_continue",
                "screening_tools",
                "screening_continue",
                "finalize_screening",
                false,
            ),
            (
                "extraction_stage",
                "extraction_tools",
                "extraction_continue",
                "finalize_extraction",
                false,
            ),
            (
                "extraction_continue",
                "extraction_tools",
                "extraction_continue",
                "finalize_extraction",
                false,
            ),
            (
                "synthesis_stage",
                "synthesis_tools",
                "synthesis_continue",
                "finalize_report",
                false,
            ),
            (
                "synthesis_continue",
                "synthesis_tools",
                "synthesis_continue",
                "finalize_report",
                false,
            ),
        ];
        for (from, tools_branch, continue_branch, finalize_branch, require_studies) in stage_edges {
            let mut branches = HashMap::new();
            for target in [tools_branch, continue_branch, finalize_branch] {
                branches.insert(target.to_string(), target.to_string());
            }
            let tools_branch = tools_branch.to_string();
            let continue_branch = continue_branch.to_string();
            let finalize_branch = finalize_branch.to_string();
            graph.add_conditional_edge(
                from,
                move |state| {
                    Self::stage_router(
                        state,
                        &tools_branch,
                        &continue_branch,
                        &finalize_branch,
                        require_studies,
                    )
                },
                branches,
            );
        }

        graph.add_edge("search_tools", "search_continue");
        graph.add_edge("screening_tools", "screening_continue");
        graph.add_edge("extraction_tools", "extraction_continue");
        graph.add_edge("synthesis_tools", "synthesis_continue");

        graph.add_edge("finalize_search", "screening_stage");
        graph.add_edge("finalize_screening", "extraction_stage");
        graph.add_edge("finalize_extraction", "synthesis_stage");
        graph.add_edge("finalize_report", END);

        Ok(graph
            .with_recursion_limit(recursion_limits::SLR)
            .compile()?)
    }

    /// Blocking run over a research question.
    pub async fn go(&self, research_question: &str) -> Result<SlrExecutionResults> {
        let final_state = self
            .graph
            .invoke(json!({
                "messages": [Message::human(research_question)],
                "research_question": research_question,
                "workflow_stage": "search",
                "identified_pubmed": [],
                "identified_ctgov": [],
                "eligibility_criteria": [],
                "included_studies": [],
                "total_input_tokens": 0,
                "total_output_tokens": 0,
            }))
            .await?;

        let messages = messages_from_state(&final_state);
        let included: Vec<IncludedStudy> = final_state
            .get("included_studies")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Ok(SlrExecutionResults {
            base: ExecutionResults::from_run(&messages, Vec::new()),
            identified_pubmed: study_refs_from_state(&final_state, "identified_pubmed"),
            identified_ctgov: study_refs_from_state(&final_state, "identified_ctgov"),
            included_studies: included,
            final_report: text_field(&final_state, "final_report"),
            total_input_tokens: counter_from_state(&final_state, "total_input_tokens"),
            total_output_tokens: counter_from_state(&final_state, "total_output_tokens"),
        })
    }

    /// The configured study-count limits.
    pub fn limits(&self) -> &SlrLimits {
        &self.limits
    }

    /// Tear down the sandbox.
    pub async fn clear_workspace(&self) -> Result<()> {
        self.core.clear_workspace().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifiers_dedup_and_cap() {
        let mut pubmed = Vec::new();
        let mut ctgov = Vec::new();
        let text = "**Title:** CAR-T in lymphoma\nPMID: 111\nPMID: 222\nPMID: 111\nNCT01234567\nNCT01234567";
        parse_identifiers(text, &mut pubmed, &mut ctgov, 10);
        assert_eq!(pubmed.len(), 2);
        assert_eq!(pubmed[0].title, "CAR-T in lymphoma");
        assert_eq!(ctgov.len(), 1);

        // Cap applies to the combined list.
        let mut pubmed = Vec::new();
        let mut ctgov = Vec::new();
        parse_identifiers("PMID: 1\nPMID: 2\nPMID: 3\nNCT00000001", &mut pubmed, &mut ctgov, 2);
        assert_eq!(pubmed.len() + ctgov.len(), 2);
    }

    #[test]
    fn test_parse_criteria() {
        let mut criteria = Vec::new();
        let text = "C1. Adults with relapsed disease\nE1. Case reports\nnot a criterion";
        parse_criteria(text, &mut criteria);
        assert_eq!(criteria.len(), 2);
        assert!(criteria[0].starts_with("C1."));
        parse_criteria(text, &mut criteria);
        assert_eq!(criteria.len(), 2);
    }
}
