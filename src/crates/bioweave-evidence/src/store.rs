//! Evidence graph store: entities, relations, observations by scope.
//!
//! A *scope* is a named namespace; two scopes share no state. Each scope
//! persists as one JSON file under a cache directory, rewritten atomically
//! (temp file + rename) on every mutating call. A process-wide cache maps
//! `(scope, cache_dir)` to a shared manager so repeated operations within
//! one run see one in-memory view; the cache is evictable so concurrent
//! unrelated runs cannot contaminate each other.
//!
//! Invariants: entity names are unique per scope; relations are identified
//! by the (from, to, type) triple and coalesced; observations are
//! insertion-ordered, deduplicated strings; relations reference extant
//! entities (endpoints are created on demand at ingest).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;

/// Errors from evidence store operations.
#[derive(Debug, Error)]
pub enum EvidenceError {
    /// Filesystem failure while loading or persisting a scope
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A scope file held malformed JSON
    #[error("Store corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Cache lock poisoned by a panicking holder
    #[error("Store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, EvidenceError>;

/// An entity: unique name, type tag, ordered observations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Unique key within the scope
    pub name: String,
    /// Free-form type tag (`Gene`, `Disease`, ...)
    pub entity_type: String,
    /// Insertion-ordered observation strings, no duplicates
    #[serde(default)]
    pub observations: Vec<String>,
}

/// A directed relation; identity is the (from, to, type) triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    /// Source entity name
    pub from_entity: String,
    /// Target entity name
    pub to_entity: String,
    /// Relation type tag (`ASSOCIATED_WITH`, ...)
    pub relation_type: String,
}

/// Full contents of one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphData {
    /// All entities, insertion-ordered
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// All relations, insertion-ordered, coalesced by identity
    #[serde(default)]
    pub relations: Vec<Relation>,
}

/// Result of a node search or open: matching entities plus relations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSlice {
    /// Matched entities
    pub entities: Vec<Entity>,
    /// Relations among/touching the matched entities
    pub relations: Vec<Relation>,
}

/// Options for [`GraphManager::text_overview`].
#[derive(Debug, Clone)]
pub struct OverviewOptions {
    /// Cap on entities included (`None` = all)
    pub max_entities: Option<usize>,
    /// Cap on observations shown per entity
    pub max_observations_per_entity: usize,
    /// Group entities under type headings
    pub group_by_type: bool,
    /// Prepend entity/relation counts
    pub include_statistics: bool,
}

impl Default for OverviewOptions {
    fn default() -> Self {
        Self {
            max_entities: None,
            max_observations_per_entity: 5,
            group_by_type: true,
            include_statistics: true,
        }
    }
}

/// In-memory view of one scope, persisted on every mutation.
pub struct GraphManager {
    scope: String,
    cache_dir: PathBuf,
    data: GraphData,
}

impl GraphManager {
    fn file_path(scope: &str, cache_dir: &Path) -> PathBuf {
        cache_dir.join(format!("{}.json", scope))
    }

    /// Load a scope from disk; a missing file is an empty graph.
    pub fn load(scope: &str, cache_dir: &Path) -> Result<Self> {
        let path = Self::file_path(scope, cache_dir);
        let data = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            GraphData::default()
        };
        Ok(Self {
            scope: scope.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            data,
        })
    }

    /// Scope name
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Current contents
    pub fn data(&self) -> &GraphData {
        &self.data
    }

    /// Atomic persist: write a temp file in the same directory, rename.
    fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = Self::file_path(&self.scope, &self.cache_dir);
        let tmp = self.cache_dir.join(format!(
            ".{}.{}.tmp",
            self.scope,
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&tmp, serde_json::to_string_pretty(&self.data)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn entity_index(&self, name: &str) -> Option<usize> {
        self.data.entities.iter().position(|e| e.name == name)
    }

    fn ensure_entity(&mut self, name: &str, entity_type: &str) -> usize {
        match self.entity_index(name) {
            Some(idx) => idx,
            None => {
                self.data.entities.push(Entity {
                    name: name.to_string(),
                    entity_type: entity_type.to_string(),
                    observations: Vec::new(),
                });
                self.data.entities.len() - 1
            }
        }
    }

    /// Upsert entities by name; new observations merge without duplicates.
    /// Returns the post-merge view of each input entity.
    pub fn create_entities(&mut self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        let mut touched = Vec::new();
        for entity in entities {
            let idx = self.ensure_entity(&entity.name, &entity.entity_type);
            let existing = &mut self.data.entities[idx];
            for obs in entity.observations {
                if !existing.observations.contains(&obs) {
                    existing.observations.push(obs);
                }
            }
            touched.push(existing.clone());
        }
        self.save()?;
        Ok(touched)
    }

    /// Upsert relations by identity triple, creating missing endpoints
    /// with an `Unknown` type. Duplicates coalesce.
    pub fn create_relations(&mut self, relations: Vec<Relation>) -> Result<Vec<Relation>> {
        let mut touched = Vec::new();
        for relation in relations {
            self.ensure_entity(&relation.from_entity, "Unknown");
            self.ensure_entity(&relation.to_entity, "Unknown");
            let exists = self.data.relations.iter().any(|r| {
                r.from_entity == relation.from_entity
                    && r.to_entity == relation.to_entity
                    && r.relation_type == relation.relation_type
            });
            if !exists {
                self.data.relations.push(relation.clone());
            }
            touched.push(relation);
        }
        self.save()?;
        Ok(touched)
    }

    /// Append unseen observation strings to entities, creating entities
    /// that do not exist yet. Returns (entity, newly added) pairs.
    pub fn add_observations(
        &mut self,
        additions: Vec<(String, Vec<String>)>,
    ) -> Result<Vec<(String, Vec<String>)>> {
        let mut added = Vec::new();
        for (name, contents) in additions {
            let idx = self.ensure_entity(&name, "Unknown");
            let entity = &mut self.data.entities[idx];
            let mut new_for_entity = Vec::new();
            for obs in contents {
                if !entity.observations.contains(&obs) {
                    entity.observations.push(obs.clone());
                    new_for_entity.push(obs);
                }
            }
            added.push((name, new_for_entity));
        }
        self.save()?;
        Ok(added)
    }

    /// Textual-relevance search over names, types, and observations.
    pub fn search_nodes(&self, query: &str, top_k: usize) -> GraphSlice {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        if terms.is_empty() {
            return GraphSlice::default();
        }

        let mut scored: Vec<(usize, &Entity)> = self
            .data
            .entities
            .iter()
            .filter_map(|entity| {
                let name = entity.name.to_lowercase();
                let entity_type = entity.entity_type.to_lowercase();
                let mut score = 0usize;
                for term in &terms {
                    if name.contains(term.as_str()) {
                        score += 3;
                    }
                    if entity_type.contains(term.as_str()) {
                        score += 1;
                    }
                    score += entity
                        .observations
                        .iter()
                        .filter(|o| o.to_lowercase().contains(term.as_str()))
                        .count();
                }
                (score > 0).then_some((score, entity))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let entities: Vec<Entity> = scored
            .into_iter()
            .take(top_k)
            .map(|(_, e)| e.clone())
            .collect();
        let names: Vec<&str> = entities.iter().map(|e| e.name.as_str()).collect();
        let relations = self
            .data
            .relations
            .iter()
            .filter(|r| {
                names.contains(&r.from_entity.as_str()) || names.contains(&r.to_entity.as_str())
            })
            .take(top_k)
            .cloned()
            .collect();

        GraphSlice {
            entities,
            relations,
        }
    }

    /// Return the named entities and all relations touching them.
    pub fn open_nodes(&self, names: &[String]) -> GraphSlice {
        let entities: Vec<Entity> = self
            .data
            .entities
            .iter()
            .filter(|e| names.contains(&e.name))
            .cloned()
            .collect();
        let relations: Vec<Relation> = self
            .data
            .relations
            .iter()
            .filter(|r| names.contains(&r.from_entity) || names.contains(&r.to_entity))
            .cloned()
            .collect();
        GraphSlice {
            entities,
            relations,
        }
    }

    /// Flat, human-readable dump of the scope.
    pub fn text_overview(&self, options: &OverviewOptions) -> String {
        let mut out = String::new();

        if self.data.entities.is_empty() && self.data.relations.is_empty() {
            return format!("Evidence graph '{}' is empty.", self.scope);
        }

        if options.include_statistics {
            out.push_str(&format!(
                "# Evidence graph '{}': {} entities, {} relations\n\n",
                self.scope,
                self.data.entities.len(),
                self.data.relations.len()
            ));
        }

        let shown: Vec<&Entity> = match options.max_entities {
            Some(cap) => self.data.entities.iter().take(cap).collect(),
            None => self.data.entities.iter().collect(),
        };

        if options.group_by_type {
            let mut by_type: Vec<(String, Vec<&Entity>)> = Vec::new();
            for entity in &shown {
                match by_type.iter_mut().find(|(t, _)| *t == entity.entity_type) {
                    Some((_, group)) => group.push(entity),
                    None => by_type.push((entity.entity_type.clone(), vec![entity])),
                }
            }
            for (entity_type, group) in by_type {
                out.push_str(&format!("## {}\n", entity_type));
                for entity in group {
                    Self::write_entity(&mut out, entity, options.max_observations_per_entity);
                }
                out.push('\n');
            }
        } else {
            for entity in &shown {
                Self::write_entity(&mut out, entity, options.max_observations_per_entity);
            }
            out.push('\n');
        }

        if !self.data.relations.is_empty() {
            out.push_str("## Relations\n");
            for relation in &self.data.relations {
                out.push_str(&format!(
                    "- {} -[{}]-> {}\n",
                    relation.from_entity, relation.relation_type, relation.to_entity
                ));
            }
        }

        out
    }

    fn write_entity(out: &mut String, entity: &Entity, max_observations: usize) {
        out.push_str(&format!("- {} ({})\n", entity.name, entity.entity_type));
        for obs in entity.observations.iter().take(max_observations) {
            out.push_str(&format!("    * {}\n", obs));
        }
        let hidden = entity.observations.len().saturating_sub(max_observations);
        if hidden > 0 {
            out.push_str(&format!("    * ... {} more observations\n", hidden));
        }
    }

    /// Remove everything from the scope and persist the empty graph.
    pub fn clear(&mut self) -> Result<()> {
        self.data = GraphData::default();
        self.save()
    }
}

type ManagerCache = Mutex<HashMap<(String, PathBuf), Arc<Mutex<GraphManager>>>>;

fn cache() -> &'static ManagerCache {
    static CACHE: OnceLock<ManagerCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Shared manager for `(scope, cache_dir)`, loading from disk on first use.
///
/// Access through the returned handle is serialised by its mutex; writes
/// between concurrent invocations sharing a scope are last-write-wins on a
/// relation triple and union-merge on observation lists.
pub fn manager(scope: &str, cache_dir: &Path) -> Result<Arc<Mutex<GraphManager>>> {
    let key = (scope.to_string(), cache_dir.to_path_buf());
    let mut cache = cache().lock().map_err(|_| EvidenceError::Poisoned)?;
    if let Some(existing) = cache.get(&key) {
        return Ok(existing.clone());
    }
    let loaded = Arc::new(Mutex::new(GraphManager::load(scope, cache_dir)?));
    cache.insert(key, loaded.clone());
    Ok(loaded)
}

/// Evict cached managers. With a cache dir, only that directory's entries
/// are dropped; with `None`, the whole cache empties.
pub fn clear_manager_cache(cache_dir: Option<&Path>) {
    if let Ok(mut cache) = cache().lock() {
        match cache_dir {
            Some(dir) => cache.retain(|(_, entry_dir), _| entry_dir != dir),
            None => cache.clear(),
        }
    }
}

/// Load the full contents of a scope, bypassing the manager cache.
pub fn load_graph_data(scope: &str, cache_dir: &Path) -> Result<GraphData> {
    Ok(GraphManager::load(scope, cache_dir)?.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, entity_type: &str, observations: &[&str]) -> Entity {
        Entity {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            observations: observations.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn relation(from: &str, to: &str, relation_type: &str) -> Relation {
        Relation {
            from_entity: from.to_string(),
            to_entity: to.to_string(),
            relation_type: relation_type.to_string(),
        }
    }

    #[test]
    fn test_create_entities_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("test", dir.path()).unwrap();

        let input = vec![entity("BRCA1", "Gene", &["tumor suppressor"])];
        manager.create_entities(input.clone()).unwrap();
        let first = manager.data().clone();

        manager.create_entities(input).unwrap();
        let second = manager.data();

        assert_eq!(second.entities, first.entities);
        assert_eq!(second.entities.len(), 1);
        assert_eq!(second.entities[0].observations, vec!["tumor suppressor"]);
    }

    #[test]
    fn test_add_observations_idempotent_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("test", dir.path()).unwrap();

        manager
            .add_observations(vec![(
                "TP53".to_string(),
                vec!["guardian of the genome".to_string(), "chr17".to_string()],
            )])
            .unwrap();
        manager
            .add_observations(vec![(
                "TP53".to_string(),
                vec!["guardian of the genome".to_string()],
            )])
            .unwrap();

        let observations = &manager.data().entities[0].observations;
        assert_eq!(observations, &["guardian of the genome", "chr17"]);
    }

    #[test]
    fn test_relations_coalesce_and_create_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("test", dir.path()).unwrap();

        let rel = relation("BRCA1", "Breast Cancer", "ASSOCIATED_WITH");
        manager.create_relations(vec![rel.clone(), rel.clone()]).unwrap();
        manager.create_relations(vec![rel]).unwrap();

        assert_eq!(manager.data().relations.len(), 1);
        // Endpoints exist even though never explicitly created.
        let names: Vec<&str> = manager.data().entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"BRCA1"));
        assert!(names.contains(&"Breast Cancer"));
    }

    #[test]
    fn test_entity_names_unique_per_scope() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("test", dir.path()).unwrap();
        manager
            .create_entities(vec![
                entity("KRAS", "Gene", &["oncogene"]),
                entity("KRAS", "Gene", &["GTPase"]),
            ])
            .unwrap();
        assert_eq!(manager.data().entities.len(), 1);
        assert_eq!(manager.data().entities[0].observations.len(), 2);
    }

    #[test]
    fn test_open_nodes_returns_touching_relations() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("test", dir.path()).unwrap();
        manager
            .create_entities(vec![entity("BRCA1", "Gene", &["tumor suppressor"])])
            .unwrap();
        manager
            .create_relations(vec![relation("BRCA1", "Breast Cancer", "ASSOCIATED_WITH")])
            .unwrap();

        let slice = manager.open_nodes(&["BRCA1".to_string()]);
        assert_eq!(slice.entities.len(), 1);
        assert_eq!(slice.relations.len(), 1);
    }

    #[test]
    fn test_search_ranks_name_matches_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("test", dir.path()).unwrap();
        manager
            .create_entities(vec![
                entity("BRCA1", "Gene", &["repair pathway"]),
                entity("RAD51", "Gene", &["interacts with brca1"]),
                entity("EGFR", "Gene", &["receptor"]),
            ])
            .unwrap();

        let slice = manager.search_nodes("brca1", 10);
        assert_eq!(slice.entities.len(), 2);
        assert_eq!(slice.entities[0].name, "BRCA1");
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut manager = GraphManager::load("persist", dir.path()).unwrap();
            manager
                .create_entities(vec![entity("MYC", "Gene", &["amplified"])])
                .unwrap();
        }
        let reloaded = GraphManager::load("persist", dir.path()).unwrap();
        assert_eq!(reloaded.data().entities[0].name, "MYC");
    }

    #[test]
    fn test_scopes_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = GraphManager::load("scope_a", dir.path()).unwrap();
        a.create_entities(vec![entity("BRAF", "Gene", &[])]).unwrap();

        let b = GraphManager::load("scope_b", dir.path()).unwrap();
        assert!(b.data().entities.is_empty());
    }

    #[test]
    fn test_manager_cache_shares_and_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let first = manager("cached", dir.path()).unwrap();
        first
            .lock()
            .unwrap()
            .create_entities(vec![entity("PTEN", "Gene", &[])])
            .unwrap();

        let second = manager("cached", dir.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        clear_manager_cache(Some(dir.path()));
        let third = manager("cached", dir.path()).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        // Reloaded from disk, data survives eviction.
        assert_eq!(third.lock().unwrap().data().entities.len(), 1);
    }

    #[test]
    fn test_text_overview_groups_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("overview", dir.path()).unwrap();
        manager
            .create_entities(vec![
                entity("BRCA1", "Gene", &["a", "b", "c"]),
                entity("Tamoxifen", "Drug", &["SERM"]),
            ])
            .unwrap();
        manager
            .create_relations(vec![relation("Tamoxifen", "BRCA1", "TARGETS")])
            .unwrap();

        let overview = manager.text_overview(&OverviewOptions {
            max_observations_per_entity: 2,
            ..Default::default()
        });
        assert!(overview.contains("2 entities, 1 relations"));
        assert!(overview.contains("## Gene"));
        assert!(overview.contains("## Drug"));
        assert!(overview.contains("... 1 more observations"));
        assert!(overview.contains("Tamoxifen -[TARGETS]-> BRCA1"));
    }

    #[test]
    fn test_clear_empties_scope() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = GraphManager::load("clearable", dir.path()).unwrap();
        manager
            .create_entities(vec![entity("ALK", "Gene", &[])])
            .unwrap();
        manager.clear().unwrap();
        assert!(manager.data().entities.is_empty());

        let reloaded = GraphManager::load("clearable", dir.path()).unwrap();
        assert!(reloaded.data().entities.is_empty());
    }
}
