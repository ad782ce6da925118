use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::services::Services;

pub mod builtin;
pub mod executor;

pub use executor::ToolExecutor;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    /// Tools that edit playlists report an `outcome` on every response.
    fn mutates(&self) -> bool {
        false
    }

    async fn execute(&self, params: Value, cancel: CancellationToken) -> Result<Value>;
}

pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry with every TIDAL tool.
    pub fn with_services(services: &Services) -> Self {
        let mut registry = Self::new();
        for tool in builtin::all(services) {
            registry.register(tool);
        }
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Sorted by name.
    pub fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Deserializes tool arguments; a missing argument object counts as `{}`.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|e| Error::invalid(format!("invalid arguments: {}", e)))
}

/// JSON schema of a parameter struct, as sent to the agent.
pub fn schema_for<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

/// Numeric TIDAL track id, accepted as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawId", into = "String")]
pub struct TrackId(String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_strings(ids: Vec<TrackId>) -> Vec<String> {
        ids.into_iter().map(|id| id.0).collect()
    }
}

impl TryFrom<RawId> for TrackId {
    type Error = String;

    fn try_from(raw: RawId) -> std::result::Result<Self, Self::Error> {
        let text = match raw {
            RawId::Number(n) => return Ok(TrackId(n.to_string())),
            RawId::Text(text) => text.trim().to_string(),
        };
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{}' is not a TIDAL track id", text));
        }
        Ok(TrackId(text))
    }
}

impl From<TrackId> for String {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

impl JsonSchema for TrackId {
    fn schema_name() -> String {
        "TrackId".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        Schema::Object(SchemaObject {
            instance_type: Some(SingleOrVec::Vec(vec![
                InstanceType::String,
                InstanceType::Integer,
            ])),
            ..Default::default()
        })
    }
}

/// TIDAL playlist UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlaylistId(String);

impl PlaylistId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlaylistId {
    type Error = String;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        let id = raw.trim();
        if id.is_empty() {
            return Err("playlist id cannot be empty".to_string());
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
            return Err(format!("'{}' is not a TIDAL playlist id", id));
        }
        Ok(PlaylistId(id.to_string()))
    }
}

impl From<PlaylistId> for String {
    fn from(id: PlaylistId) -> Self {
        id.0
    }
}

impl JsonSchema for PlaylistId {
    fn schema_name() -> String {
        "PlaylistId".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}
