//! Document generator: per-section write→review→revise loop.
//!
//! Given a section template and a set of source documents, the agent
//! initializes by caching the sources, then walks the template: a writer
//! drafts each section, a reviewer verdicts it (`APPROVED` /
//! `NEEDS_REVISION ...`), and the section loops until approval or the
//! per-section iteration cap forces completion. Finished sections are
//! concatenated with `\n\n---\n\n` separators into the final document.
//!
//! ```text
//! START ─> initialize ─> section_writer ─> section_reviewer
//!                             ▲                  │
//!                             │  (NEEDS_REVISION)│(APPROVED | cap)
//!                             └──────────────────┼─> complete_section
//!                                                │        │ (more sections)
//!                                                │        ├─> section_writer
//!                                                │        └─> assemble_document ─> END
//! ```

use crate::base::{counter_from_state, messages_from_state, AgentCore, SandboxSpec};
use crate::config::{recursion_limits, DocGenLimits};
use crate::error::Result;
use crate::prompts::{
    iteration_budget_prompt, SECTION_REVIEWER_SYSTEM_PROMPT, SECTION_WRITER_SYSTEM_PROMPT,
};
use crate::results::{DocGenExecutionResults, ExecutionResults, SectionContent};
use bioweave_graph::llm::ChatModel;
use bioweave_graph::messages::{content_to_text, Message};
use bioweave_graph::state::StateSchema;
use bioweave_graph::{CompiledGraph, StateGraph, END, START};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A template for one document section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionTemplate {
    /// Section title
    pub title: String,
    /// Writing instructions for the section
    pub guidance: String,
    /// Position in the document
    #[serde(default)]
    pub order: usize,
}

fn templates_from_state(state: &Value) -> Vec<SectionTemplate> {
    state
        .get("document_template")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn sections_from_state(state: &Value) -> Vec<SectionContent> {
    state
        .get("completed_sections")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn source_contents_from_state(state: &Value) -> HashMap<String, String> {
    state
        .get("source_contents")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Template-driven document generation agent.
pub struct DocGenAgent {
    core: Arc<AgentCore>,
    graph: CompiledGraph,
}

impl DocGenAgent {
    /// Construct with a sandbox per `spec`.
    pub async fn new(
        model: Arc<dyn ChatModel>,
        limits: DocGenLimits,
        spec: SandboxSpec,
    ) -> Result<Self> {
        let core = AgentCore::initialize(model, None, spec, Default::default()).await;
        Self::from_parts(core, limits)
    }

    /// Construct from explicit parts (test seam).
    pub fn from_parts(core: AgentCore, limits: DocGenLimits) -> Result<Self> {
        let core = Arc::new(core);
        let graph = Self::build_graph(core.clone(), limits)?;
        Ok(Self { core, graph })
    }

    /// Read one source document: from the sandbox workspace when present,
    /// from the local filesystem otherwise.
    async fn read_source(core: &AgentCore, path: &str) -> std::io::Result<String> {
        match &core.sandbox {
            Some(sandbox) => {
                let staging = std::env::temp_dir().join(format!(
                    "bioweave-docgen-{}",
                    uuid::Uuid::new_v4().simple()
                ));
                sandbox
                    .download_artifacts(&staging)
                    .await
                    .map_err(|e| std::io::Error::other(e.to_string()))?;
                let file_name = path.rsplit('/').next().unwrap_or(path);
                let content = std::fs::read_to_string(staging.join(file_name));
                let _ = std::fs::remove_dir_all(&staging);
                content
            }
            None => std::fs::read_to_string(path),
        }
    }

    fn build_graph(core: Arc<AgentCore>, limits: DocGenLimits) -> Result<CompiledGraph> {
        let schema = StateSchema::with_messages();
        let mut graph = StateGraph::with_schema("docgen", schema);
        let max_iterations = limits.max_iterations_per_section;

        {
            let core = core.clone();
            graph.add_node("initialize", move |state| {
                let core = core.clone();
                Box::pin(async move {
                    let sources: Vec<String> = state
                        .get("source_documents")
                        .cloned()
                        .and_then(|v| serde_json::from_value(v).ok())
                        .unwrap_or_default();

                    let mut source_contents = HashMap::new();
                    for path in &sources {
                        match Self::read_source(&core, path).await {
                            Ok(content) => {
                                source_contents.insert(path.clone(), content);
                            }
                            Err(e) => {
                                tracing::warn!(path, error = %e, "Failed to read source document")
                            }
                        }
                    }

                    let count = source_contents.len();
                    Ok(json!({
                        "source_contents": source_contents,
                        "workflow_status": "writing",
                        "current_section_index": 0,
                        "current_iteration": 0,
                        "messages": [Message::assistant(format!(
                            "Initialized workflow. Read {} source documents. Starting section writing...",
                            count
                        ))],
                    }))
                })
            });
        }

        {
            let core = core.clone();
            graph.add_node("section_writer", move |state| {
                let core = core.clone();
                Box::pin(async move {
                    let templates = templates_from_state(&state);
                    let index = counter_from_state(&state, "current_section_index") as usize;
                    let Some(template) = templates.get(index) else {
                        return Ok(json!({"workflow_status": "assembling"}));
                    };
                    let iteration = counter_from_state(&state, "current_iteration") as usize;
                    let draft = state
                        .get("current_section_draft")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();

                    let mut system_prompt = format!(
                        "{}\n\n# SECTION: {}\n# GUIDANCE:\n{}",
                        SECTION_WRITER_SYSTEM_PROMPT, template.title, template.guidance
                    );
                    let sources = source_contents_from_state(&state);
                    if !sources.is_empty() {
                        system_prompt.push_str("\n\n# SOURCE DOCUMENTS:\n");
                        for (path, content) in &sources {
                            system_prompt.push_str(&format!("## {}\n{}\n", path, content));
                        }
                    }
                    let previous = sections_from_state(&state);
                    if !previous.is_empty() {
                        system_prompt.push_str("\n\n# PREVIOUS SECTIONS:\n");
                        for section in &previous {
                            system_prompt.push_str(&format!("## {}\n{}\n", section.title, section.content));
                        }
                    }

                    let mut messages = vec![Message::system(system_prompt)];
                    if iteration > 0 && !draft.is_empty() {
                        // Revision: feed back the reviewer's last verdict.
                        let feedback = messages_from_state(&state)
                            .iter()
                            .rev()
                            .find(|m| {
                                m.is_assistant()
                                    && content_to_text(&m.content).contains("NEEDS_REVISION")
                            })
                            .map(|m| content_to_text(&m.content))
                            .unwrap_or_else(|| {
                                "Please improve the section based on the review.".to_string()
                            });
                        messages.push(Message::human(format!(
                            "Revise the section '{}' addressing this review:\n{}\n\nPrevious draft:\n{}",
                            template.title, feedback, draft
                        )));
                    } else {
                        messages.push(Message::human(format!(
                            "Please write the section '{}' following the guidance provided.",
                            template.title
                        )));
                    }
                    messages.push(Message::human(iteration_budget_prompt(
                        iteration + 1,
                        max_iterations,
                    )));

                    let response = core.call_model(messages, &[], true).await?;
                    let (input_tokens, output_tokens) = AgentCore::usage_of(&response);
                    let new_draft = content_to_text(&response.message.content);
                    Ok(json!({
                        "messages": [response.message],
                        "current_section_draft": new_draft,
                        "current_iteration": iteration + 1,
                        "total_input_tokens":
                            counter_from_state(&state, "total_input_tokens") + input_tokens,
                        "total_output_tokens":
                            counter_from_state(&state, "total_output_tokens") + output_tokens,
                    }))
                })
            });
        }

        {
            let core = core.clone();
            graph.add_node("section_reviewer", move |state| {
                let core = core.clone();
                Box::pin(async move {
                    let templates = templates_from_state(&state);
                    let index = counter_from_state(&state, "current_section_index") as usize;
                    let title = templates
                        .get(index)
                        .map(|t| t.title.clone())
                        .unwrap_or_default();
                    let guidance = templates
                        .get(index)
                        .map(|t| t.guidance.clone())
                        .unwrap_or_default();
                    let draft = state
                        .get("current_section_draft")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();

                    let system_prompt = format!(
                        "{}\n\n# SECTION: {}\n# GUIDANCE:\n{}\n\n# DRAFT:\n{}",
                        SECTION_REVIEWER_SYSTEM_PROMPT, title, guidance, draft
                    );
                    let messages = vec![
                        Message::system(system_prompt),
                        Message::human("Please review this section and provide your assessment."),
                    ];

                    let response = core.call_model(messages, &[], true).await?;
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

        graph.add_node("complete_section", |state| {
            Box::pin(async move {
                let templates = templates_from_state(&state);
                let index = counter_from_state(&state, "current_section_index") as usize;
                let title = templates
                    .get(index)
                    .map(|t| t.title.clone())
                    .unwrap_or_default();
                let iteration = counter_from_state(&state, "current_iteration") as usize;

                let mut sections = sections_from_state(&state);
                sections.push(SectionContent {
                    title: title.clone(),
                    content: state
                        .get("current_section_draft")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    iteration_count: iteration,
                    status: "completed".to_string(),
                });

                let next_index = index + 1;
                let status = if next_index < templates.len() {
                    "writing"
                } else {
                    "assembling"
                };
                Ok(json!({
                    "completed_sections": sections,
                    "current_section_index": next_index,
                    "current_section_draft": "",
                    "current_iteration": 0,
                    "workflow_status": status,
                    "messages": [Message::assistant(format!(
                        "Section '{}' completed. Moving on.",
                        title
                    ))],
                }))
            })
        });

        graph.add_node("assemble_document", |state| {
            Box::pin(async move {
                let sections = sections_from_state(&state);
                let parts: Vec<String> = sections
                    .iter()
                    .map(|s| format!("# {}\n\n{}", s.title, s.content))
                    .collect();
                let final_document = parts.join("\n\n---\n\n");
                let count = sections.len();
                Ok(json!({
                    "final_document": final_document,
                    "workflow_status": "completed",
                    "messages": [Message::assistant(format!(
                        "Document assembly complete. Total sections: {}",
                        count
                    ))],
                }))
            })
        });

        graph.add_edge(START, "initialize");
        graph.add_edge("initialize", "section_writer");
        graph.add_edge("section_writer", "section_reviewer");

        // Review routing: the cap forces completion before any content
        // check; APPROVED (without NEEDS_REVISION) completes;
        // NEEDS_REVISION loops back; anything unclear defaults to
        // complete.
        let mut review_branches = HashMap::new();
        review_branches.insert("revise".to_string(), "section_writer".to_string());
        review_branches.insert("complete".to_string(), "complete_section".to_string());
        graph.add_conditional_edge(
            "section_reviewer",
            move |state| {
                let iteration = counter_from_state(state, "current_iteration") as usize;
                if iteration >= max_iterations {
                    return "complete".to_string();
                }
                let verdict = messages_from_state(state)
                    .last()
                    .map(|m| content_to_text(&m.content).to_uppercase())
                    .unwrap_or_default();
                if verdict.contains("APPROVED") && !verdict.contains("NEEDS_REVISION") {
                    "complete".to_string()
                } else if verdict.contains("NEEDS_REVISION") {
                    "revise".to_string()
                } else {
                    "complete".to_string()
                }
            },
            review_branches,
        );

        let mut continue_branches = HashMap::new();
        continue_branches.insert("write".to_string(), "section_writer".to_string());
        continue_branches.insert("assemble".to_string(), "assemble_document".to_string());
        graph.add_conditional_edge(
            "complete_section",
            |state| {
                let templates = templates_from_state(state);
                let index = counter_from_state(state, "current_section_index") as usize;
                if index >= templates.len() {
                    "assemble".to_string()
                } else {
                    "write".to_string()
                }
            },
            continue_branches,
        );
        graph.add_edge("assemble_document", END);

        Ok(graph
            .with_recursion_limit(recursion_limits::DOCGEN)
            .compile()?)
    }

    /// Blocking run over a document template and source documents.
    pub async fn go(
        &self,
        document_template: Vec<SectionTemplate>,
        source_documents: Vec<String>,
    ) -> Result<DocGenExecutionResults> {
        let final_state = self
            .graph
            .invoke(json!({
                "messages": [],
                "document_template": document_template,
                "source_documents": source_documents,
                "source_contents": {},
                "completed_sections": [],
                "current_section_index": 0,
                "current_iteration": 0,
                "current_section_draft": "",
                "final_document": "",
                "workflow_status": "initializing",
                "total_input_tokens": 0,
                "total_output_tokens": 0,
            }))
            .await?;

        let messages = messages_from_state(&final_state);
        Ok(DocGenExecutionResults {
            base: ExecutionResults::from_run(&messages, Vec::new()),
            completed_sections: sections_from_state(&final_state),
            final_document: final_state
                .get("final_document")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            total_input_tokens: counter_from_state(&final_state, "total_input_tokens"),
            total_output_tokens: counter_from_state(&final_state, "total_output_tokens"),
        })
    }

    /// Tear down the sandbox.
    pub async fn clear_workspace(&self) -> Result<()> {
        self.core.clear_workspace().await
    }
}
