//! Graph data model: entities, direct relationships and mapped relationships.
//!
//! Serialized field names follow the host platform's generic schema
//! (`_key`, `_type`, `_class`, ...). Type-specific attributes are flattened
//! next to the reserved fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Type-specific attribute set of an entity or relationship.
///
/// A `BTreeMap` keeps serialized output ordered, which keeps snapshot
/// digests stable across runs.
pub type Properties = BTreeMap<String, Value>;

// ============================================================================
// Entity
// ============================================================================

/// A typed node in the output graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub entity_type: String,
    #[serde(rename = "_class")]
    pub class: Vec<String>,
    #[serde(flatten)]
    pub properties: Properties,
    /// The source record, kept for steps that derive further entities from it.
    #[serde(rename = "_rawData", default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Value>,
}

impl Entity {
    pub fn new(key: impl Into<String>, entity_type: impl Into<String>, class: &[&str]) -> Self {
        Self {
            key: key.into(),
            entity_type: entity_type.into(),
            class: class.iter().map(|c| c.to_string()).collect(),
            properties: Properties::new(),
            raw_data: None,
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_raw_data(mut self, raw_data: Value) -> Self {
        self.raw_data = Some(raw_data);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn str_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(Value::as_str)
    }

    pub fn bool_property(&self, name: &str) -> Option<bool> {
        self.properties.get(name).and_then(Value::as_bool)
    }

    /// Decode the retained source record.
    ///
    /// Returns `None` when no raw data was attached or it no longer matches `T`.
    pub fn raw_data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.raw_data
            .as_ref()
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }
}

// ============================================================================
// Relationship vocabulary
// ============================================================================

/// Semantic edge type. Closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipClass {
    Has,
    Identified,
    Manages,
    Assigned,
    Installed,
}

impl RelationshipClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipClass::Has => "HAS",
            RelationshipClass::Identified => "IDENTIFIED",
            RelationshipClass::Manages => "MANAGES",
            RelationshipClass::Assigned => "ASSIGNED",
            RelationshipClass::Installed => "INSTALLED",
        }
    }
}

impl fmt::Display for RelationshipClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a mapped relationship relative to its local source entity.
///
/// `Reverse` means the resolved external entity is the "from" side
/// (e.g. `microsoft_tenant HAS intune_account`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipDirection {
    Forward,
    Reverse,
}

// ============================================================================
// Relationship
// ============================================================================

/// A typed directed edge between two entities of the same run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub relationship_type: String,
    #[serde(rename = "_class")]
    pub class: RelationshipClass,
    #[serde(rename = "_fromEntityKey")]
    pub from_key: String,
    #[serde(rename = "_toEntityKey")]
    pub to_key: String,
    #[serde(flatten)]
    pub properties: Properties,
}

/// Declarative target of a mapped relationship, resolved by the host by
/// matching `target_filter_properties` against entities of `target_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMapping {
    pub direction: RelationshipDirection,
    pub source_entity_key: String,
    pub target_type: String,
    pub target_filter_properties: Properties,
    /// When true the host must not create a placeholder target if no match exists.
    pub skip_target_creation: bool,
}

/// A relationship to an entity owned by a different ingestion system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRelationship {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_type")]
    pub relationship_type: String,
    #[serde(rename = "_class")]
    pub class: RelationshipClass,
    #[serde(rename = "_mapping")]
    pub mapping: RelationshipMapping,
    #[serde(flatten)]
    pub properties: Properties,
}
