//! In-memory [`JobState`] used for a single ingestion run.

use crate::model::{Entity, MappedRelationship, Relationship};
use crate::snapshot::GraphSnapshot;
use crate::{FindOrInsert, JobState, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Storage tables guarded by one lock.
#[derive(Debug, Default)]
struct GraphTables {
    entities: Vec<Entity>,
    entity_index: HashMap<String, usize>,
    by_type: HashMap<String, Vec<usize>>,
    relationships: Vec<Relationship>,
    mapped_relationships: Vec<MappedRelationship>,
    /// Every key in use, across entities and both relationship kinds.
    keys: HashSet<String>,
}

impl GraphTables {
    fn find(&self, key: &str) -> Option<&Entity> {
        self.entity_index.get(key).map(|&idx| &self.entities[idx])
    }

    fn claim_key(&mut self, key: &str) -> StoreResult<()> {
        if !self.keys.insert(key.to_string()) {
            tracing::debug!(key, "key already in use");
            return Err(StoreError::DuplicateKey {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn insert_entity(&mut self, entity: Entity) -> StoreResult<Entity> {
        self.claim_key(&entity.key)?;
        let idx = self.entities.len();
        self.entity_index.insert(entity.key.clone(), idx);
        self.by_type
            .entry(entity.entity_type.clone())
            .or_default()
            .push(idx);
        self.entities.push(entity.clone());
        tracing::debug!(key = %entity.key, entity_type = %entity.entity_type, "entity added");
        Ok(entity)
    }

    fn find_or_insert(&mut self, candidate: Entity) -> StoreResult<FindOrInsert> {
        if let Some(existing) = self.find(&candidate.key) {
            return Ok(FindOrInsert::Found(existing.clone()));
        }
        self.insert_entity(candidate).map(FindOrInsert::Inserted)
    }

    fn require_entity(&self, relationship_key: &str, endpoint_key: &str) -> StoreResult<()> {
        if self.entity_index.contains_key(endpoint_key) {
            Ok(())
        } else {
            Err(StoreError::MissingEndpoint {
                relationship_key: relationship_key.to_string(),
                endpoint_key: endpoint_key.to_string(),
            })
        }
    }

    fn insert_relationship(&mut self, relationship: Relationship) -> StoreResult<()> {
        self.require_entity(&relationship.key, &relationship.from_key)?;
        self.require_entity(&relationship.key, &relationship.to_key)?;
        self.claim_key(&relationship.key)?;
        tracing::debug!(key = %relationship.key, "relationship added");
        self.relationships.push(relationship);
        Ok(())
    }

    fn insert_mapped(&mut self, relationship: MappedRelationship) -> StoreResult<()> {
        self.require_entity(&relationship.key, &relationship.mapping.source_entity_key)?;
        self.claim_key(&relationship.key)?;
        tracing::debug!(
            key = %relationship.key,
            target_type = %relationship.mapping.target_type,
            "mapped relationship added"
        );
        self.mapped_relationships.push(relationship);
        Ok(())
    }

    fn of_type(&self, entity_type: &str) -> Vec<Entity> {
        self.by_type
            .get(entity_type)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&idx| self.entities[idx].clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Append-only in-memory store.
///
/// Cloning is cheap and every clone shares the same tables.
#[derive(Debug, Clone)]
pub struct InMemoryJobState {
    run_id: Uuid,
    started_on: DateTime<Utc>,
    tables: Arc<RwLock<GraphTables>>,
}

impl InMemoryJobState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_on: Utc::now(),
            tables: Arc::new(RwLock::new(GraphTables::default())),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn entity_count(&self) -> usize {
        self.tables.read().entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        let tables = self.tables.read();
        tables.relationships.len() + tables.mapped_relationships.len()
    }
}

impl Default for InMemoryJobState {
    fn default() -> Self {
        Self::new()
    }
}

// No lock guard is held across an await point.
#[async_trait]
impl JobState for InMemoryJobState {
    async fn has_key(&self, key: &str) -> StoreResult<bool> {
        Ok(self.tables.read().keys.contains(key))
    }

    async fn find_entity(&self, key: &str) -> StoreResult<Option<Entity>> {
        Ok(self.tables.read().find(key).cloned())
    }

    async fn add_entity(&self, entity: Entity) -> StoreResult<Entity> {
        self.tables.write().insert_entity(entity)
    }

    async fn find_or_insert_entity(&self, candidate: Entity) -> StoreResult<FindOrInsert> {
        self.tables.write().find_or_insert(candidate)
    }

    async fn add_relationship(&self, relationship: Relationship) -> StoreResult<()> {
        self.tables.write().insert_relationship(relationship)
    }

    async fn add_mapped_relationship(&self, relationship: MappedRelationship) -> StoreResult<()> {
        self.tables.write().insert_mapped(relationship)
    }

    async fn entities_of_type(&self, entity_type: &str) -> StoreResult<Vec<Entity>> {
        Ok(self.tables.read().of_type(entity_type))
    }

    async fn snapshot(&self) -> StoreResult<GraphSnapshot> {
        let tables = self.tables.read();
        Ok(GraphSnapshot {
            run_id: self.run_id,
            started_on: self.started_on,
            collected_on: Utc::now(),
            entities: tables.entities.clone(),
            relationships: tables.relationships.clone(),
            mapped_relationships: tables.mapped_relationships.clone(),
        })
    }
}
