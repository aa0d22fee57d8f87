//! Execution result objects returned by the agent `go` surface.
//!
//! Every agent returns a record carrying the formatted message history,
//! the code-execution log, and the final response; agent-specific variants
//! extend it with token totals, the evidence graph dump, completed
//! sections, or the SLR study lists. All serialize to JSON; PDF/HTML
//! rendering is delegated elsewhere.

use bioweave_graph::messages::{content_to_text, Message, MessageRole};
use bioweave_sandbox::CodeExecutionResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One message flattened to `{role, content}` for the history view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    /// Message role as a lowercase string
    pub role: String,
    /// Text content; tool calls are appended as readable lines
    pub content: String,
}

/// Flatten a conversation into `{role, content}` records, rendering tool
/// calls as text lines after the message content.
pub fn format_message_history(messages: &[Message]) -> Vec<MessageRecord> {
    messages
        .iter()
        .map(|msg| {
            let mut content = content_to_text(&msg.content);
            for call in msg.tool_calls() {
                content.push_str(&format!(
                    "\nTool call: {}\nTool call input: {}",
                    call.name, call.args
                ));
            }
            let role = match msg.role {
                MessageRole::System => "system",
                MessageRole::Human => "human",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => "tool",
            };
            MessageRecord {
                role: role.to_string(),
                content,
            }
        })
        .collect()
}

/// Base execution record shared by every agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResults {
    /// Conversation flattened to `{role, content}` records
    pub message_history: Vec<MessageRecord>,
    /// Sandboxed code executions, in order
    pub code_execution_results: Vec<CodeExecutionResult>,
    /// Content of the final assistant message
    pub final_response: String,
}

impl ExecutionResults {
    /// Build from a final conversation and execution log.
    pub fn from_run(messages: &[Message], code_results: Vec<CodeExecutionResult>) -> Self {
        let final_response = messages
            .last()
            .map(|m| content_to_text(&m.content))
            .unwrap_or_default();
        Self {
            message_history: format_message_history(messages),
            code_execution_results: code_results,
            final_response,
        }
    }
}

/// Serialize a result object to JSON, optionally writing it to a file.
pub fn to_json<T: Serialize>(results: &T, path: Option<&Path>) -> crate::error::Result<String> {
    let json = serde_json::to_string_pretty(results)?;
    if let Some(path) = path {
        std::fs::write(path, &json)?;
    }
    Ok(json)
}

/// Results of a DeepEvidence research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepEvidenceExecutionResults {
    /// Base record
    #[serde(flatten)]
    pub base: ExecutionResults,
    /// Input tokens consumed, sub-agents included
    pub total_input_tokens: u64,
    /// Output tokens produced, sub-agents included
    pub total_output_tokens: u64,
    /// Full dump of the run's evidence-graph scope (empty in light mode)
    pub evidence_graph_data: bioweave_evidence::GraphData,
}

/// A study reference identified during the SLR search stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyReference {
    /// PMID or NCT id
    pub id: String,
    /// Identifier namespace (`pubmed` or `ctgov`)
    pub source: String,
    /// Title when the search output carried one
    #[serde(default)]
    pub title: String,
}

/// A screened study carried into extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncludedStudy {
    /// PMID or NCT id
    pub id: String,
    /// Identifier namespace
    pub source: String,
    /// Title when known
    #[serde(default)]
    pub title: String,
    /// Screening outcome (`include`)
    pub eligibility: String,
}

/// Results of an SLR run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlrExecutionResults {
    /// Base record
    #[serde(flatten)]
    pub base: ExecutionResults,
    /// Studies identified from PubMed
    pub identified_pubmed: Vec<StudyReference>,
    /// Studies identified from ClinicalTrials.gov
    pub identified_ctgov: Vec<StudyReference>,
    /// Studies included after screening
    pub included_studies: Vec<IncludedStudy>,
    /// The assembled SLR report (markdown)
    pub final_report: String,
    /// Input tokens consumed
    pub total_input_tokens: u64,
    /// Output tokens produced
    pub total_output_tokens: u64,
}

impl SlrExecutionResults {
    /// PRISMA-style flow counts.
    pub fn prisma_summary(&self) -> HashMap<&'static str, usize> {
        let identified = self.identified_pubmed.len() + self.identified_ctgov.len();
        let included = self.included_studies.len();
        HashMap::from([
            ("identified", identified),
            ("screened", identified),
            ("included", included),
            ("excluded", identified.saturating_sub(included)),
        ])
    }
}

/// A completed document section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionContent {
    /// Section title
    pub title: String,
    /// Final section text
    pub content: String,
    /// Write→review iterations the section took
    pub iteration_count: usize,
    /// Terminal status (`completed`)
    pub status: String,
}

/// Results of a document-generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocGenExecutionResults {
    /// Base record
    #[serde(flatten)]
    pub base: ExecutionResults,
    /// Completed sections in template order
    pub completed_sections: Vec<SectionContent>,
    /// Assembled document with `\n\n---\n\n` separators
    pub final_document: String,
    /// Input tokens consumed
    pub total_input_tokens: u64,
    /// Output tokens produced
    pub total_output_tokens: u64,
}
