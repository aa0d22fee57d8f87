//! Knowledge-base catalog: named bundles of tools for sub-agents.
//!
//! A knowledge base is a key (`pubmed_papers`, `gene_set`, ...) mapped to
//! the tool set a BFS/DFS sub-agent receives when the orchestrator selects
//! that base. The biomedical REST clients behind those tools are external
//! collaborators - anything satisfying the `Tool` contract registers here.
//! `clinicaltrials` ships empty as an extension point.
//!
//! The catalog keeps a second map of orchestrator-level extras (entity
//! recognition, unified search) that become available on the orchestrator
//! itself when their base is allowed.

use bioweave_graph::tool::Tool;
use std::collections::HashMap;
use std::sync::Arc;

/// PubMed paper tools (annotations, entities, search, references)
pub const KB_PUBMED_PAPERS: &str = "pubmed_papers";
/// ClinicalTrials.gov (empty in the default catalog; extension point)
pub const KB_CLINICALTRIALS: &str = "clinicaltrials";
/// Gene-set tools (pathway, enrichment, interactions, complex, per-gene)
pub const KB_GENE_SET: &str = "gene_set";
/// Unified gene search
pub const KB_GENE: &str = "gene";
/// Unified disease search
pub const KB_DISEASE: &str = "disease";
/// Unified drug search
pub const KB_DRUG: &str = "drug";
/// Unified variant search
pub const KB_VARIANT: &str = "variant";

/// All knowledge-base keys, in catalog order.
pub const KNOWLEDGE_BASE_KEYS: &[&str] = &[
    KB_PUBMED_PAPERS,
    KB_CLINICALTRIALS,
    KB_GENE_SET,
    KB_GENE,
    KB_DISEASE,
    KB_DRUG,
    KB_VARIANT,
];

/// Registry mapping knowledge-base keys to tool bundles.
#[derive(Clone, Default)]
pub struct KnowledgeBaseCatalog {
    subagent_tools: HashMap<String, Vec<Arc<dyn Tool>>>,
    orchestrator_tools: HashMap<String, Vec<Arc<dyn Tool>>>,
}

impl KnowledgeBaseCatalog {
    /// Create an empty catalog with every known key present.
    pub fn new() -> Self {
        let mut catalog = Self::default();
        for key in KNOWLEDGE_BASE_KEYS {
            catalog.subagent_tools.insert(key.to_string(), Vec::new());
            catalog
                .orchestrator_tools
                .insert(key.to_string(), Vec::new());
        }
        catalog
    }

    /// Whether `key` names a known knowledge base.
    pub fn is_known(&self, key: &str) -> bool {
        self.subagent_tools.contains_key(key)
    }

    /// Known keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.subagent_tools.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Register a tool into a knowledge base's sub-agent bundle.
    pub fn register(&mut self, key: impl Into<String>, tool: Arc<dyn Tool>) {
        self.subagent_tools.entry(key.into()).or_default().push(tool);
    }

    /// Register an orchestrator-level extra tool gated on a knowledge base.
    pub fn register_orchestrator_tool(&mut self, key: impl Into<String>, tool: Arc<dyn Tool>) {
        self.orchestrator_tools
            .entry(key.into())
            .or_default()
            .push(tool);
    }

    /// Tool set a sub-agent receives for the selected bases.
    pub fn tools_for(&self, keys: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut tools = Vec::new();
        for key in keys {
            if let Some(bundle) = self.subagent_tools.get(key) {
                tools.extend(bundle.iter().cloned());
            }
        }
        tools
    }

    /// Orchestrator extras for the allowed bases.
    pub fn orchestrator_tools_for(&self, keys: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut tools = Vec::new();
        for key in keys {
            if let Some(bundle) = self.orchestrator_tools.get(key) {
                tools.extend(bundle.iter().cloned());
            }
        }
        tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bioweave_graph::tool::{ToolOutput, ToolResult};
    use serde_json::Value;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        async fn run(&self, _args: Value) -> ToolResult {
            Ok(ToolOutput::text("ok"))
        }
    }

    #[test]
    fn test_known_keys_present() {
        let catalog = KnowledgeBaseCatalog::new();
        for key in KNOWLEDGE_BASE_KEYS {
            assert!(catalog.is_known(key));
        }
        assert!(!catalog.is_known("proteome"));
    }

    #[test]
    fn test_clinicaltrials_empty_by_default() {
        let catalog = KnowledgeBaseCatalog::new();
        assert!(catalog
            .tools_for(&[KB_CLINICALTRIALS.to_string()])
            .is_empty());
    }

    #[test]
    fn test_tools_for_unions_selected_bases() {
        let mut catalog = KnowledgeBaseCatalog::new();
        catalog.register(KB_PUBMED_PAPERS, Arc::new(NamedTool("search_papers")));
        catalog.register(KB_GENE_SET, Arc::new(NamedTool("get_pathway")));

        let tools = catalog.tools_for(&[
            KB_PUBMED_PAPERS.to_string(),
            KB_GENE_SET.to_string(),
        ]);
        assert_eq!(tools.len(), 2);

        let only_pubmed = catalog.tools_for(&[KB_PUBMED_PAPERS.to_string()]);
        assert_eq!(only_pubmed.len(), 1);
        assert_eq!(only_pubmed[0].name(), "search_papers");
    }

    #[test]
    fn test_orchestrator_extras_separate() {
        let mut catalog = KnowledgeBaseCatalog::new();
        catalog.register_orchestrator_tool(KB_GENE, Arc::new(NamedTool("unified_gene_search")));

        assert!(catalog.tools_for(&[KB_GENE.to_string()]).is_empty());
        assert_eq!(
            catalog
                .orchestrator_tools_for(&[KB_GENE.to_string()])
                .len(),
            1
        );
    }
}
