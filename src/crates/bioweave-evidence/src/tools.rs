//! Evidence-graph tools: `add_to_graph` and `retrieve_from_graph`.
//!
//! Both tools are scoped to a `(database_name, cache_dir)` pair and speak
//! JSON payloads. Inputs are mappings with string keys; typed-but-wrong
//! shapes are rejected with a structured `{"success": false, "error": ...}`
//! payload rather than a tool exception, so a confused model sees exactly
//! what was malformed and can adapt. Store failures come back the same
//! way; these tools never abort the graph.

use crate::store::{self, Entity, OverviewOptions, Relation};
use async_trait::async_trait;
use bioweave_graph::tool::{Tool, ToolOutput, ToolResult};
use serde_json::{json, Value};
use std::path::PathBuf;

fn error_payload(message: impl std::fmt::Display) -> ToolOutput {
    ToolOutput::Text(
        json!({"success": false, "error": message.to_string()}).to_string(),
    )
}

fn parse_entity(value: &Value) -> std::result::Result<Entity, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("Invalid entity format: expected mapping, got {}", value))?;
    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Entity missing required field 'name': {}", value))?;
    let entity_type = obj
        .get("entity_type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Entity missing required field 'entity_type': {}", value))?;
    let observations = obj
        .get("observations")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();
    Ok(Entity {
        name: name.to_string(),
        entity_type: entity_type.to_string(),
        observations,
    })
}

fn parse_relation(value: &Value) -> std::result::Result<Relation, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("Invalid relation format: expected mapping, got {}", value))?;
    let field = |key: &str| {
        obj.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
            format!(
                "Relation missing required field '{}': {}",
                key, value
            )
        })
    };
    Ok(Relation {
        from_entity: field("from_entity")?.to_string(),
        to_entity: field("to_entity")?.to_string(),
        relation_type: field("relation_type")?.to_string(),
    })
}

/// Tool writing entities, relations, and observations into a scope.
pub struct AddToGraph {
    database_name: String,
    cache_dir: PathBuf,
}

impl AddToGraph {
    /// Create a tool bound to a scope and cache directory
    pub fn new(database_name: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_name: database_name.into(),
            cache_dir: cache_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for AddToGraph {
    fn name(&self) -> &str {
        "add_to_graph"
    }

    fn description(&self) -> &str {
        "Add information to the evidence knowledge graph: create entities, \
         define relations between entities, or append observations to an \
         existing entity. Use this to store and organize research findings \
         into a structured knowledge base during the research process."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entities": {
                    "type": "array",
                    "description": "Entities to create: {name, entity_type, observations}",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "entity_type": {"type": "string"},
                            "observations": {"type": "array", "items": {"type": "string"}},
                        },
                        "required": ["name", "entity_type"],
                    },
                },
                "relations": {
                    "type": "array",
                    "description": "Relations to create: {from_entity, to_entity, relation_type}",
                    "items": {
                        "type": "object",
                        "properties": {
                            "from_entity": {"type": "string"},
                            "to_entity": {"type": "string"},
                            "relation_type": {"type": "string"},
                        },
                        "required": ["from_entity", "to_entity", "relation_type"],
                    },
                },
                "observations": {
                    "type": "object",
                    "description": "Observations to append: {name, observations}",
                    "properties": {
                        "name": {"type": "string"},
                        "observations": {"type": "array", "items": {"type": "string"}},
                    },
                    "required": ["name", "observations"],
                },
            },
        })
    }

    async fn run(&self, args: Value) -> ToolResult {
        let manager = match store::manager(&self.database_name, &self.cache_dir) {
            Ok(manager) => manager,
            Err(e) => return Ok(error_payload(format!("Error adding to graph: {}", e))),
        };

        let mut results = serde_json::Map::new();

        if let Some(entities) = args.get("entities").filter(|v| !v.is_null()) {
            let list = match entities.as_array() {
                Some(list) => list,
                None => {
                    return Ok(error_payload(format!(
                        "Invalid entities format: expected list, got {}",
                        entities
                    )))
                }
            };
            let mut parsed = Vec::new();
            for value in list {
                match parse_entity(value) {
                    Ok(entity) => parsed.push(entity),
                    Err(e) => return Ok(error_payload(e)),
                }
            }
            let created = {
                let mut guard = match manager.lock() {
                    Ok(guard) => guard,
                    Err(_) => return Ok(error_payload("graph store lock poisoned")),
                };
                match guard.create_entities(parsed) {
                    Ok(created) => created,
                    Err(e) => return Ok(error_payload(format!("Error adding to graph: {}", e))),
                }
            };
            results.insert(
                "entities_created".to_string(),
                json!({"count": created.len(), "entities": created}),
            );
        }

        if let Some(relations) = args.get("relations").filter(|v| !v.is_null()) {
            let list = match relations.as_array() {
                Some(list) => list,
                None => {
                    return Ok(error_payload(format!(
                        "Invalid relations format: expected list, got {}",
                        relations
                    )))
                }
            };
            let mut parsed = Vec::new();
            for value in list {
                match parse_relation(value) {
                    Ok(relation) => parsed.push(relation),
                    Err(e) => return Ok(error_payload(e)),
                }
            }
            let created = {
                let mut guard = match manager.lock() {
                    Ok(guard) => guard,
                    Err(_) => return Ok(error_payload("graph store lock poisoned")),
                };
                match guard.create_relations(parsed) {
                    Ok(created) => created,
                    Err(e) => return Ok(error_payload(format!("Error adding to graph: {}", e))),
                }
            };
            results.insert(
                "relations_created".to_string(),
                json!({"count": created.len(), "relations": created}),
            );
        }

        if let Some(observations) = args.get("observations").filter(|v| !v.is_null()) {
            let obj = match observations.as_object() {
                Some(obj) => obj,
                None => {
                    return Ok(error_payload(format!(
                        "Invalid observations format: expected mapping, got {}",
                        observations
                    )))
                }
            };
            let name = match obj.get("name").and_then(|v| v.as_str()) {
                Some(name) => name.to_string(),
                None => {
                    return Ok(error_payload(format!(
                        "Observations missing required field 'name': {}",
                        observations
                    )))
                }
            };
            let contents: Vec<String> = match obj.get("observations").and_then(|v| v.as_array()) {
                Some(arr) => arr
                    .iter()
                    .filter_map(|o| o.as_str().map(|s| s.to_string()))
                    .collect(),
                None => {
                    return Ok(error_payload(format!(
                        "Observations missing required field 'observations': {}",
                        observations
                    )))
                }
            };
            let added = {
                let mut guard = match manager.lock() {
                    Ok(guard) => guard,
                    Err(_) => return Ok(error_payload("graph store lock poisoned")),
                };
                match guard.add_observations(vec![(name, contents)]) {
                    Ok(added) => added,
                    Err(e) => return Ok(error_payload(format!("Error adding to graph: {}", e))),
                }
            };
            let added_view: Vec<Value> = added
                .into_iter()
                .map(|(name, contents)| json!({"entityName": name, "addedObservations": contents}))
                .collect();
            results.insert("observations_added".to_string(), json!(added_view));
        }

        if results.is_empty() {
            return Ok(error_payload(
                "No data provided. Please provide at least one of: entities, relations, or observations",
            ));
        }

        Ok(ToolOutput::Text(
            json!({"success": true, "results": results}).to_string(),
        ))
    }
}

/// Tool reading from a scope: full map, query search, or named lookup.
pub struct RetrieveFromGraph {
    database_name: String,
    cache_dir: PathBuf,
}

impl RetrieveFromGraph {
    /// Create a tool bound to a scope and cache directory
    pub fn new(database_name: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_name: database_name.into(),
            cache_dir: cache_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for RetrieveFromGraph {
    fn name(&self) -> &str {
        "retrieve_from_graph"
    }

    fn description(&self) -> &str {
        "Retrieve information from the evidence knowledge graph: the full \
         text representation of the graph (get_full_map=true), a natural \
         language search over entities and relations (query), or specific \
         entities by exact name with their connections (entity_names)."
    }

    fn args_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language search query",
                },
                "entity_names": {
                    "type": "string",
                    "description": "JSON string list of exact entity names, e.g. '[\"BRCA1\"]'",
                },
                "get_full_map": {
                    "type": "boolean",
                    "description": "Return a full text representation of the graph",
                },
                "top_k": {
                    "type": "integer",
                    "description": "Maximum search results (query mode only)",
                },
                "max_entities": {
                    "type": "integer",
                    "description": "Maximum entities in the full map (full map mode only)",
                },
                "max_observations_per_entity": {
                    "type": "integer",
                    "description": "Observations shown per entity in the full map",
                },
            },
        })
    }

    async fn run(&self, args: Value) -> ToolResult {
        let manager = match store::manager(&self.database_name, &self.cache_dir) {
            Ok(manager) => manager,
            Err(e) => {
                return Ok(error_payload(format!("Error retrieving from graph: {}", e)))
            }
        };
        let guard = match manager.lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(error_payload("graph store lock poisoned")),
        };

        if args.get("get_full_map").and_then(|v| v.as_bool()).unwrap_or(false) {
            let options = OverviewOptions {
                max_entities: args
                    .get("max_entities")
                    .and_then(|v| v.as_u64())
                    .map(|v| v as usize),
                max_observations_per_entity: args
                    .get("max_observations_per_entity")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(5) as usize,
                ..Default::default()
            };
            return Ok(ToolOutput::Text(guard.text_overview(&options)));
        }

        if let Some(query) = args.get("query").and_then(|v| v.as_str()) {
            let top_k = args.get("top_k").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
            let results = guard.search_nodes(query, top_k);
            return Ok(ToolOutput::Text(
                json!({"success": true, "search_query": query, "results": results}).to_string(),
            ));
        }

        if let Some(entity_names) = args.get("entity_names").and_then(|v| v.as_str()) {
            let names: Vec<String> = match serde_json::from_str(entity_names) {
                Ok(names) => names,
                Err(e) => {
                    return Ok(error_payload(format!("Invalid JSON format: {}", e)))
                }
            };
            let results = guard.open_nodes(&names);
            return Ok(ToolOutput::Text(
                json!({"success": true, "requested_entities": names, "results": results})
                    .to_string(),
            ));
        }

        Ok(error_payload(
            "Please provide one of: 'get_full_map=true' for the full map, 'query' for searching, or 'entity_names' for specific entities",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioweave_graph::tool::Tool;

    fn text_of(output: ToolOutput) -> String {
        match output {
            ToolOutput::Text(s) => s,
            _ => panic!("expected text output"),
        }
    }

    #[tokio::test]
    async fn test_add_then_retrieve_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let add = AddToGraph::new("e2e", dir.path());
        let retrieve = RetrieveFromGraph::new("e2e", dir.path());

        let payload = json!({
            "entities": [{"name": "BRCA1", "entity_type": "Gene", "observations": ["tumor suppressor"]}],
            "relations": [{"from_entity": "BRCA1", "to_entity": "Breast Cancer", "relation_type": "ASSOCIATED_WITH"}],
        });
        let first = text_of(add.run(payload.clone()).await.unwrap());
        assert!(first.contains("\"success\":true"));

        // Second identical add is a no-op.
        text_of(add.run(payload).await.unwrap());

        let result = text_of(
            retrieve
                .run(json!({"entity_names": "[\"BRCA1\"]"}))
                .await
                .unwrap(),
        );
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["results"]["entities"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["results"]["relations"].as_array().unwrap().len(), 1);
        assert_eq!(
            parsed["results"]["relations"][0]["relation_type"],
            "ASSOCIATED_WITH"
        );
    }

    #[tokio::test]
    async fn test_wrong_shape_rejected_with_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        let add = AddToGraph::new("shapes", dir.path());

        let result = text_of(
            add.run(json!({"entities": ["BRCA1"]})).await.unwrap(),
        );
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["success"], false);
        assert!(parsed["error"].as_str().unwrap().contains("expected mapping"));

        let result = text_of(
            add.run(json!({"entities": [{"name": "BRCA1"}]})).await.unwrap(),
        );
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("entity_type"));
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let add = AddToGraph::new("empty", dir.path());
        let result = text_of(add.run(json!({})).await.unwrap());
        assert!(result.contains("No data provided"));
    }

    #[tokio::test]
    async fn test_retrieve_search_mode() {
        let dir = tempfile::tempdir().unwrap();
        let add = AddToGraph::new("search", dir.path());
        let retrieve = RetrieveFromGraph::new("search", dir.path());

        add.run(json!({
            "entities": [
                {"name": "BRCA1", "entity_type": "Gene", "observations": ["repair"]},
                {"name": "Aspirin", "entity_type": "Drug", "observations": []},
            ],
        }))
        .await
        .unwrap();

        let result = text_of(
            retrieve
                .run(json!({"query": "brca1 repair", "top_k": 5}))
                .await
                .unwrap(),
        );
        let parsed: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(parsed["results"]["entities"][0]["name"], "BRCA1");
    }

    #[tokio::test]
    async fn test_retrieve_full_map_mode() {
        let dir = tempfile::tempdir().unwrap();
        let add = AddToGraph::new("map", dir.path());
        let retrieve = RetrieveFromGraph::new("map", dir.path());

        add.run(json!({
            "entities": [{"name": "EGFR", "entity_type": "Gene", "observations": ["receptor"]}],
        }))
        .await
        .unwrap();

        let result = text_of(retrieve.run(json!({"get_full_map": true})).await.unwrap());
        assert!(result.contains("EGFR"));
        assert!(result.contains("1 entities"));
    }
}
