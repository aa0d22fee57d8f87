//! State schema and reducers for graph workflows
//!
//! Graph state is a JSON object merged field-by-field through a
//! [`StateSchema`]. When a node returns a partial state, each field is
//! combined with the current value by that field's [`Reducer`]:
//!
//! | Reducer | Behavior | Use case |
//! |---------|----------|----------|
//! | [`OverwriteReducer`] | Last write wins | Counters, stage tags, scalars |
//! | [`AppendReducer`] | Concatenate arrays | Code execution logs, study lists |
//! | [`SumReducer`] | Add numbers | Token totals |
//! | [`MessageReducer`] | [`add_messages`] merge | The conversation log |
//!
//! The append-only message log plus replace-otherwise merge is the minimum
//! discipline that keeps conversation history monotone while letting scalar
//! progress counters move forward in one step.
//!
//! # Example
//!
//! ```rust
//! use bioweave_graph::state::{StateSchema, AppendReducer, OverwriteReducer};
//! use serde_json::json;
//!
//! let mut schema = StateSchema::new();
//! schema.add_field("code_execution_results", Box::new(AppendReducer));
//! schema.add_field("workflow_stage", Box::new(OverwriteReducer));
//!
//! let mut state = json!({"code_execution_results": [], "workflow_stage": "search"});
//! schema
//!     .apply(&mut state, &json!({"workflow_stage": "screening"}))
//!     .unwrap();
//! assert_eq!(state["workflow_stage"], "screening");
//! ```

use crate::messages::{add_messages, Message};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from state merge operations
#[derive(Debug, Error)]
pub enum StateError {
    /// State or update was not a JSON object
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A reducer received incompatible value types
    #[error("Reducer error: {0}")]
    ReducerError(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Trait for merging a field update into the current value
pub trait Reducer: Send + Sync {
    /// Combine the current value (possibly null) with an update
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value>;

    /// Human-readable reducer name for diagnostics
    fn name(&self) -> &str;
}

/// Replaces the current value with the update. The default for scalars.
#[derive(Debug, Clone)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Concatenates array updates onto the current array.
///
/// A scalar update appends as a single element; a null current value
/// initializes from the update.
#[derive(Debug, Clone)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Array(curr), Value::Array(upd)) => {
                let mut result = curr.clone();
                result.extend_from_slice(upd);
                Ok(Value::Array(result))
            }
            (Value::Null, Value::Array(upd)) => Ok(Value::Array(upd.clone())),
            (Value::Array(curr), single) => {
                let mut result = curr.clone();
                result.push(single.clone());
                Ok(Value::Array(result))
            }
            (Value::Null, single) => Ok(Value::Array(vec![single.clone()])),
            _ => Err(StateError::ReducerError(
                "AppendReducer requires array values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Adds numeric updates to the current value.
#[derive(Debug, Clone)]
pub struct SumReducer;

impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                    Ok(Value::Number((a + b).into()))
                } else if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                    Ok(serde_json::Number::from_f64(a + b)
                        .map(Value::Number)
                        .unwrap_or(Value::Null))
                } else {
                    Err(StateError::ReducerError(
                        "Cannot add non-numeric values".to_string(),
                    ))
                }
            }
            (Value::Null, Value::Number(_)) => Ok(update.clone()),
            _ => Err(StateError::ReducerError(
                "SumReducer requires numeric values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// Merges message lists via [`add_messages`]: append, deduplicated by id.
///
/// Both sides deserialize as `Vec<Message>`; a failure to parse either side
/// is a reducer error so malformed updates surface at the merge point
/// instead of corrupting the log.
#[derive(Debug, Clone)]
pub struct MessageReducer;

impl Reducer for MessageReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        let left: Vec<Message> = match current {
            Value::Null => Vec::new(),
            other => serde_json::from_value(other.clone())
                .map_err(|e| StateError::ReducerError(format!("bad message list: {}", e)))?,
        };
        let right: Vec<Message> = serde_json::from_value(update.clone())
            .map_err(|e| StateError::ReducerError(format!("bad message update: {}", e)))?;
        serde_json::to_value(add_messages(left, right))
            .map_err(|e| StateError::ReducerError(e.to_string()))
    }

    fn name(&self) -> &str {
        "add_messages"
    }
}

/// Schema mapping state fields to their reducers.
///
/// Fields without an explicit reducer fall back to the default reducer, or
/// to overwrite when no default is set.
#[derive(Default)]
pub struct StateSchema {
    fields: HashMap<String, Box<dyn Reducer>>,
    default_reducer: Option<Box<dyn Reducer>>,
}

impl StateSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the schema every agent state starts from: a `messages` field
    /// with the [`MessageReducer`].
    pub fn with_messages() -> Self {
        let mut schema = Self::new();
        schema.add_field("messages", Box::new(MessageReducer));
        schema
    }

    /// Register a field with a specific reducer
    pub fn add_field(&mut self, field: impl Into<String>, reducer: Box<dyn Reducer>) {
        self.fields.insert(field.into(), reducer);
    }

    /// Builder-style variant of [`add_field`](Self::add_field)
    pub fn field(mut self, field: impl Into<String>, reducer: Box<dyn Reducer>) -> Self {
        self.add_field(field, reducer);
        self
    }

    /// Set the default reducer for unregistered fields
    pub fn with_default_reducer(mut self, reducer: Box<dyn Reducer>) -> Self {
        self.default_reducer = Some(reducer);
        self
    }

    fn get_reducer(&self, field: &str) -> Option<&dyn Reducer> {
        self.fields
            .get(field)
            .map(|r| r.as_ref())
            .or_else(|| self.default_reducer.as_ref().map(|r| r.as_ref()))
    }

    /// Merge a partial update into `state` in place.
    pub fn apply(&self, state: &mut Value, update: &Value) -> Result<()> {
        let state_obj = state
            .as_object_mut()
            .ok_or_else(|| StateError::InvalidState("State must be an object".to_string()))?;
        let update_obj = update
            .as_object()
            .ok_or_else(|| StateError::InvalidState("Update must be an object".to_string()))?;

        for (field, update_value) in update_obj {
            let current = state_obj.get(field).cloned().unwrap_or(Value::Null);
            let reduced = match self.get_reducer(field) {
                Some(reducer) => reducer.reduce(&current, update_value)?,
                None => update_value.clone(),
            };
            state_obj.insert(field.clone(), reduced);
        }
        Ok(())
    }

    /// Project a state down to the given keys.
    ///
    /// This is how a sub-graph exposes a narrower output shape than it uses
    /// internally: the executor filters the final state through the output
    /// projection before returning it to the caller.
    pub fn project(state: &Value, keys: &[String]) -> Value {
        match state.as_object() {
            Some(obj) => {
                let mut out = serde_json::Map::new();
                for key in keys {
                    if let Some(v) = obj.get(key) {
                        out.insert(key.clone(), v.clone());
                    }
                }
                Value::Object(out)
            }
            None => state.clone(),
        }
    }
}
