//! Budget and limit configuration shared across agents.
//!
//! Round budgets are ceilings on how often a class of node may run in one
//! invocation. They are enforced by prompt injection - the model sees
//! `current/budget` every turn and is expected to conclude - never by hard
//! termination; the recursion limit is the only hard stop.

use std::time::Duration;

/// Recursion limits per agent topology (max node executions per invoke).
pub mod recursion_limits {
    /// Simple ReAct / DS-Wizard loop
    pub const REACT: usize = 20;
    /// DeepEvidence orchestrator with sub-workflows
    pub const ORCHESTRATOR: usize = 100;
    /// Staged SLR pipeline
    pub const SLR: usize = 50;
    /// Document generation loop
    pub const DOCGEN: usize = 50;
}

/// Model-call retry and deadline settings.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Attempt budget for each model call
    pub max_retries: usize,
    /// Minimum backoff wait in seconds
    pub min_wait: f64,
    /// Maximum backoff wait in seconds
    pub max_wait: f64,
    /// Per-attempt wall-clock deadline (`None` = no deadline)
    pub llm_timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_wait: 1.0,
            max_wait: 30.0,
            llm_timeout: None,
        }
    }
}

/// Conversation compaction settings.
///
/// The summariser itself is injected as a chat model on the agent core
/// (defaulting to the agent's own model); this only carries the trigger.
#[derive(Debug, Clone)]
pub struct CompactionSettings {
    /// Approximate token count above which compaction triggers
    pub token_threshold: usize,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            token_threshold: 80_000,
        }
    }
}

/// Round budgets for the DeepEvidence researcher.
#[derive(Debug, Clone)]
pub struct ResearchBudgets {
    /// BFS/DFS dispatches allowed for the orchestrator
    pub main_search_rounds: usize,
    /// Orchestrator node executions allowed
    pub main_action_rounds: usize,
    /// Action rounds per sub-agent run (floored at
    /// [`SUBAGENT_ROUND_FLOOR`] regardless of smaller budgets)
    pub subagent_action_rounds: usize,
}

/// Sub-agents always get at least this many action rounds, even when the
/// orchestrator supplies a smaller budget.
pub const SUBAGENT_ROUND_FLOOR: usize = 3;

impl Default for ResearchBudgets {
    fn default() -> Self {
        Self {
            main_search_rounds: 5,
            main_action_rounds: 20,
            subagent_action_rounds: 5,
        }
    }
}

/// Study-count limits for the SLR pipeline.
#[derive(Debug, Clone)]
pub struct SlrLimits {
    /// Hard cap on the identified-studies list after the search stage
    pub max_search_results: usize,
    /// Cap on candidates offered for screening
    pub max_studies_to_screen: usize,
    /// Cap on studies carried into extraction
    pub max_studies_to_include: usize,
}

impl Default for SlrLimits {
    fn default() -> Self {
        Self {
            max_search_results: 50,
            max_studies_to_screen: 50,
            max_studies_to_include: 20,
        }
    }
}

/// Limits for the document-generation loop.
#[derive(Debug, Clone)]
pub struct DocGenLimits {
    /// Write→review→revise iterations allowed per section
    pub max_iterations_per_section: usize,
}

impl Default for DocGenLimits {
    fn default() -> Self {
        Self {
            max_iterations_per_section: 3,
        }
    }
}
