//! Per-unit outcomes and the reports aggregated from them.
//!
//! Tolerable data anomalies are values, not errors: each skipped unit of work
//! yields one [`Warning`] that is both logged and kept in the step's report.
//! Fatal failures travel as `Err` through `?` instead.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// An entity or relationship key was already taken; the write was skipped.
    DuplicateKey,
    /// A relationship endpoint was not in the job state; the edge was dropped.
    MissingEndpoint,
    /// An entity lacked the raw data a derivation needed.
    MissingRawData,
    /// Neither a local endpoint nor enough data for a mapped relationship.
    UnidentifiableEndpoint,
    /// A source record had no usable id.
    MissingIdentifier,
    /// A source record could not be decoded.
    MalformedRecord,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::DuplicateKey => "duplicate_key",
            WarningKind::MissingEndpoint => "missing_endpoint",
            WarningKind::MissingRawData => "missing_raw_data",
            WarningKind::UnidentifiableEndpoint => "unidentifiable_endpoint",
            WarningKind::MissingIdentifier => "missing_identifier",
            WarningKind::MalformedRecord => "malformed_record",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A skipped unit of work and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.context.insert(name.to_string(), value.to_string());
        self
    }

    /// `k=v` pairs for a single log field.
    pub fn context_string(&self) -> String {
        self.context
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if !self.context.is_empty() {
            write!(f, " ({})", self.context_string())?;
        }
        Ok(())
    }
}

/// Result of one unit of work that did not fail fatally.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T = ()> {
    Success(T),
    Skipped(Warning),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn warning(&self) -> Option<&Warning> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Skipped(warning) => Some(warning),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step_id: String,
    pub entities_created: usize,
    pub relationships_created: usize,
    pub mapped_relationships_created: usize,
    pub warnings: Vec<Warning>,
}

impl StepReport {
    pub fn new(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            ..Default::default()
        }
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn step(&self, step_id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn total_entities(&self) -> usize {
        self.steps.iter().map(|s| s.entities_created).sum()
    }

    pub fn total_relationships(&self) -> usize {
        self.steps
            .iter()
            .map(|s| s.relationships_created + s.mapped_relationships_created)
            .sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.steps.iter().flat_map(|s| s.warnings.iter())
    }

    /// Warning counts by kind across all steps.
    pub fn warning_counts(&self) -> BTreeMap<WarningKind, usize> {
        let mut counts = BTreeMap::new();
        for warning in self.warnings() {
            *counts.entry(warning.kind).or_insert(0) += 1;
        }
        counts
    }

    /// A run that finished with warnings succeeded but is incomplete.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.warnings.is_empty())
    }
}
