//! Intune Graph Job State
//!
//! The per-run, append-only store that ingestion steps write into:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         JOB STATE (one run)                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────┐  find_or_insert  ┌──────────────┐                  │
//! │  │  Step N  │─────────────────►│   Entities   │◄──── by type ──┐ │
//! │  └──────────┘  has_key/add     │  (by _key)   │                │ │
//! │       │                        └──────┬───────┘                │ │
//! │       │                               │ endpoints must exist   │ │
//! │       │                        ┌──────▼───────┐         ┌──────┴┐│
//! │       └───────────────────────►│ Relationships│         │Step N+k│
//! │                                │  + mapped    │         └───────┘│
//! │                                └──────┬───────┘                  │
//! │                                       ▼                          │
//! │                                ┌──────────────┐                  │
//! │                                │   Snapshot   │ (.json + digest) │
//! │                                └──────────────┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **One key namespace**: entity and relationship keys never collide.
//! - **Append-only**: nothing is mutated or removed once inserted.
//! - **Atomic find-or-insert**: the existence check and the insert for one key
//!   happen under a single write lock, so two callers cannot both create it.
//! - **Valid edges only**: a relationship whose endpoint is not in the store is
//!   rejected rather than stored.

pub mod memory;
pub mod model;
pub mod snapshot;

#[cfg(test)]
mod tests;

use async_trait::async_trait;

pub use memory::InMemoryJobState;
pub use model::{
    Entity, MappedRelationship, Properties, Relationship, RelationshipClass,
    RelationshipDirection, RelationshipMapping,
};
pub use snapshot::GraphSnapshot;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {key}")]
    DuplicateKey { key: String },
    #[error("relationship {relationship_key} references missing entity {endpoint_key}")]
    MissingEndpoint {
        relationship_key: String,
        endpoint_key: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of [`JobState::find_or_insert_entity`].
#[derive(Debug, Clone, PartialEq)]
pub enum FindOrInsert {
    /// An entity with the same key already existed; the candidate was discarded.
    Found(Entity),
    /// The candidate was inserted.
    Inserted(Entity),
}

impl FindOrInsert {
    pub fn entity(&self) -> &Entity {
        match self {
            FindOrInsert::Found(entity) | FindOrInsert::Inserted(entity) => entity,
        }
    }

    pub fn into_entity(self) -> Entity {
        match self {
            FindOrInsert::Found(entity) | FindOrInsert::Inserted(entity) => entity,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, FindOrInsert::Inserted(_))
    }
}

// ============================================================================
// Store contract
// ============================================================================

/// Store shared by every step of a run.
///
/// All mutation goes through this trait. Implementations must treat each call
/// as atomic with respect to a single key.
#[async_trait]
pub trait JobState: Send + Sync {
    /// True if any entity or relationship (direct or mapped) uses `key`.
    async fn has_key(&self, key: &str) -> StoreResult<bool>;

    async fn find_entity(&self, key: &str) -> StoreResult<Option<Entity>>;

    /// Insert a new entity. Fails with [`StoreError::DuplicateKey`] if the key is taken.
    async fn add_entity(&self, entity: Entity) -> StoreResult<Entity>;

    /// Return the entity stored under `candidate.key`, inserting `candidate` if absent.
    ///
    /// Fails with [`StoreError::DuplicateKey`] only if the key belongs to a relationship.
    async fn find_or_insert_entity(&self, candidate: Entity) -> StoreResult<FindOrInsert>;

    /// Insert a relationship. Both endpoints must already be stored entities.
    async fn add_relationship(&self, relationship: Relationship) -> StoreResult<()>;

    /// Insert a mapped relationship. Its local source entity must already be stored.
    async fn add_mapped_relationship(&self, relationship: MappedRelationship) -> StoreResult<()>;

    /// Entities of one `_type`, in insertion order.
    async fn entities_of_type(&self, entity_type: &str) -> StoreResult<Vec<Entity>>;

    /// Everything stored so far.
    async fn snapshot(&self) -> StoreResult<GraphSnapshot>;
}
