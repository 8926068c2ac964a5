//! Run snapshots: the serialized output of one ingestion run.

use crate::model::{Entity, MappedRelationship, Relationship};
use crate::StoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Prefix used in serialized snapshot digests.
pub const SNAPSHOT_DIGEST_PREFIX: &str = "sha256:";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub run_id: Uuid,
    pub started_on: DateTime<Utc>,
    pub collected_on: DateTime<Utc>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub mapped_relationships: Vec<MappedRelationship>,
}

/// The content a digest is computed over. Run id and timestamps are excluded.
#[derive(Serialize)]
struct DigestContent<'a> {
    entities: &'a [Entity],
    relationships: &'a [Relationship],
    mapped_relationships: &'a [MappedRelationship],
}

impl GraphSnapshot {
    /// Digest of the graph content.
    ///
    /// Two runs over the same source data produce the same digest.
    pub fn digest(&self) -> StoreResult<String> {
        let bytes = serde_json::to_vec(&DigestContent {
            entities: &self.entities,
            relationships: &self.relationships,
            mapped_relationships: &self.mapped_relationships,
        })?;
        let digest = Sha256::digest(&bytes);
        let mut out = String::with_capacity(SNAPSHOT_DIGEST_PREFIX.len() + 64);
        out.push_str(SNAPSHOT_DIGEST_PREFIX);
        for b in digest.iter() {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Ok(out)
    }

    pub fn entity(&self, key: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.key == key)
    }

    pub fn relationship(&self, key: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.key == key)
    }

    /// Entity counts per `_type`.
    pub fn entity_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entity in &self.entities {
            *counts.entry(entity.entity_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Relationship counts per `_type`, mapped relationships included.
    pub fn relationship_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        let types = self
            .relationships
            .iter()
            .map(|r| &r.relationship_type)
            .chain(self.mapped_relationships.iter().map(|r| &r.relationship_type));
        for relationship_type in types {
            *counts.entry(relationship_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn write_to(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(
            path = %path.display(),
            entities = self.entities.len(),
            relationships = self.relationships.len() + self.mapped_relationships.len(),
            "wrote graph snapshot"
        );
        Ok(())
    }

    pub fn read_from(path: &Path) -> StoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
