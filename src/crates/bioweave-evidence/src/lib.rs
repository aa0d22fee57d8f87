//! # bioweave-evidence
//!
//! Scoped evidence knowledge-graph store for bioweave agents, plus the
//! `add_to_graph` / `retrieve_from_graph` tools the DeepEvidence
//! orchestrator binds.
//!
//! A *scope* (database name) is an independent namespace persisted as one
//! JSON file under a cache directory; a process-wide, evictable cache
//! keyed by `(scope, cache_dir)` shares one in-memory view per scope
//! within a run. Every mutating call persists atomically.
//!
//! ```rust
//! use bioweave_evidence::{manager, Entity};
//!
//! # fn demo() -> bioweave_evidence::Result<()> {
//! let dir = std::env::temp_dir().join("evidence-demo");
//! let graph = manager("my_run", &dir)?;
//! graph.lock().unwrap().create_entities(vec![Entity {
//!     name: "BRCA1".into(),
//!     entity_type: "Gene".into(),
//!     observations: vec!["tumor suppressor".into()],
//! }])?;
//! # Ok(())
//! # }
//! ```

pub mod store;
pub mod tools;

pub use store::{
    clear_manager_cache, load_graph_data, manager, Entity, EvidenceError, GraphData,
    GraphManager, GraphSlice, OverviewOptions, Relation, Result,
};
pub use tools::{AddToGraph, RetrieveFromGraph};
