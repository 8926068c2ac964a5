//! Intune Graph Ingestion
//!
//! Turns Microsoft Intune device-management data (via Microsoft Graph) into a
//! typed entity/relationship graph:
//!
//! ```text
//! ┌──────────────┐   pages    ┌────────────────────────────────────────────┐
//! │ GraphSource  │───────────►│                 StepRunner                 │
//! │ (fixture or  │            │  create-account ─► fetch-users ─► devices  │
//! │  live API)   │            │        │                          │        │
//! └──────────────┘            │        ▼                          ▼        │
//!                             │  policies ─► policy states   apps ─► detected
//!                             └──────────────────┬─────────────────────────┘
//!                                                │ converters + keys
//!                                                ▼ relationships
//!                                      ┌──────────────────┐
//!                                      │    JobState      │──► GraphSnapshot
//!                                      └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`keys`]: every entity and relationship key
//! - [`records`]: Graph source record shapes
//! - [`converters`]: record → entity, pure and total
//! - [`relationships`]: edge builders, including mapped relationships
//! - [`steps`]: step declarations and the per-step reconciliation loops
//! - [`runner`]: dependency ordering and execution
//! - [`outcome`]: warnings and reports
//!
//! ## Example
//!
//! ```ignore
//! use intune_graph_ingest::{FixtureSource, IntegrationConfig, StepRunner};
//! use intune_graph_store::{InMemoryJobState, JobState};
//!
//! let source = FixtureSource::from_path("fixtures/contoso.json")?;
//! let job_state = InMemoryJobState::new();
//! let report = StepRunner::new(IntegrationConfig::from_env())
//!     .run(&source, &job_state)
//!     .await?;
//! job_state.snapshot().await?.write_to("graph.json")?;
//! ```

pub mod config;
pub mod converters;
pub mod keys;
pub mod outcome;
pub mod records;
pub mod relationships;
pub mod runner;
pub mod schema;
pub mod source;
pub mod steps;

pub use config::{ConfigError, IntegrationConfig};
pub use outcome::{Outcome, RunReport, StepReport, Warning, WarningKind};
pub use runner::{plan_steps, StepRunner};
pub use source::{FixtureSource, GraphSource, Page, Resource, SourceError, TenantFixture};
pub use steps::{integration_steps, StepDefinition, StepId};

use intune_graph_store::StoreError;

// ============================================================================
// Errors
// ============================================================================

/// Fatal failures. Tolerable data anomalies are [`Warning`]s instead.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Step {step_id} failed: {source}")]
    Step {
        step_id: String,
        #[source]
        source: Box<IngestError>,
    },
}

pub type IngestResult<T> = Result<T, IngestError>;
