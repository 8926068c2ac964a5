//! Dependency-ordered step execution.
//!
//! ```text
//!   IntegrationConfig ──validate──► plan_steps ──► [step, step, ...]
//!                                   │ duplicate id     │
//!                                   │ unknown dep      ▼ one at a time, each at most once
//!                                   │ cycle         StepContext ──► StepReport
//!                                   ▼                                 │
//!                              ConfigError                            ▼
//!                                                                RunReport
//! ```
//!
//! Everything that can be wrong with the configuration or the declarations
//! is reported before the first step runs.

use crate::config::{ConfigError, IntegrationConfig};
use crate::outcome::RunReport;
use crate::source::GraphSource;
use crate::steps::{execute, integration_steps, StepContext, StepDefinition, StepId};
use crate::{IngestError, IngestResult};
use intune_graph_store::JobState;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Validate declarations and order them so every step follows its
/// dependencies. Ties keep declaration order.
///
/// With a non-empty `only`, the plan holds just those steps and everything
/// they transitively depend on.
pub fn plan_steps(
    steps: &[StepDefinition],
    only: &[String],
) -> Result<Vec<StepDefinition>, ConfigError> {
    let mut by_id: HashMap<&str, &StepDefinition> = HashMap::new();
    for step in steps {
        if by_id.insert(step.id, step).is_some() {
            return Err(ConfigError::DuplicateStep(step.id.to_string()));
        }
    }
    for step in steps {
        if let Some(dependency) = step.depends_on.iter().find(|d| !by_id.contains_key(*d)) {
            return Err(ConfigError::UnknownDependency {
                step: step.id.to_string(),
                dependency: dependency.to_string(),
            });
        }
    }

    let selected = if only.is_empty() {
        steps.iter().map(|s| s.id).collect::<HashSet<_>>()
    } else {
        let mut selected = HashSet::new();
        let mut stack = Vec::new();
        for id in only {
            let step = by_id
                .get(id.as_str())
                .ok_or_else(|| ConfigError::UnknownStep(id.clone()))?;
            stack.push(step.id);
        }
        while let Some(id) = stack.pop() {
            if selected.insert(id) {
                stack.extend(by_id[id].depends_on.iter().copied());
            }
        }
        selected
    };

    let mut pending: Vec<&StepDefinition> =
        steps.iter().filter(|s| selected.contains(s.id)).collect();
    let mut done: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let Some(pos) = pending
            .iter()
            .position(|s| s.depends_on.iter().all(|d| done.contains(d)))
        else {
            return Err(ConfigError::DependencyCycle(
                pending.iter().map(|s| s.id.to_string()).collect(),
            ));
        };
        let step = pending.remove(pos);
        done.insert(step.id);
        ordered.push(step.clone());
    }
    Ok(ordered)
}

/// Runs the Intune steps against one source and one job state.
#[derive(Debug, Clone)]
pub struct StepRunner {
    config: IntegrationConfig,
    steps: Vec<StepDefinition>,
    only: Vec<String>,
}

impl StepRunner {
    pub fn new(config: IntegrationConfig) -> Self {
        Self {
            config,
            steps: integration_steps(),
            only: Vec::new(),
        }
    }

    /// Restrict the run to these step ids and their dependencies.
    pub fn only(mut self, step_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.only = step_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// The steps that [`StepRunner::run`] would execute, in order.
    pub fn plan(&self) -> Result<Vec<StepDefinition>, ConfigError> {
        plan_steps(&self.steps, &self.only)
    }

    /// Validate, then execute every planned step once. A step failure stops
    /// the run; warnings never do.
    pub async fn run(
        &self,
        source: &dyn GraphSource,
        job_state: &dyn JobState,
    ) -> IngestResult<RunReport> {
        self.config.validate()?;
        let plan = self.plan()?;
        let step_ids = plan
            .iter()
            .map(|step| step.id.parse::<StepId>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = RunReport::default();
        for (definition, step_id) in plan.iter().zip(step_ids) {
            let started = Instant::now();
            tracing::info!(step = definition.id, name = definition.name, "Starting step");

            let mut ctx = StepContext::new(definition.id, &self.config, source, job_state);
            execute(step_id, &mut ctx)
                .await
                .map_err(|err| IngestError::Step {
                    step_id: definition.id.to_string(),
                    source: Box::new(err),
                })?;
            let step_report = ctx.into_report();

            tracing::info!(
                step = definition.id,
                entities = step_report.entities_created,
                relationships = step_report.relationships_created,
                mapped_relationships = step_report.mapped_relationships_created,
                warnings = step_report.warnings.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Finished step"
            );
            report.steps.push(step_report);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &'static str, depends_on: &[&'static str]) -> StepDefinition {
        StepDefinition {
            id,
            name: id,
            entity_types: Vec::new(),
            relationship_types: Vec::new(),
            mapped_relationship_types: Vec::new(),
            depends_on: depends_on.to_vec(),
        }
    }

    fn ids(plan: &[StepDefinition]) -> Vec<&'static str> {
        plan.iter().map(|s| s.id).collect()
    }

    #[test]
    fn dependencies_come_first_and_ties_keep_declaration_order() {
        let steps = vec![
            step("c", &["b"]),
            step("a", &[]),
            step("b", &["a"]),
            step("d", &[]),
        ];
        let plan = plan_steps(&steps, &[]).unwrap();
        assert_eq!(ids(&plan), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = plan_steps(&[step("a", &["ghost"])], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDependency { ref dependency, .. } if dependency == "ghost"));
    }

    #[test]
    fn duplicate_step_is_rejected() {
        let err = plan_steps(&[step("a", &[]), step("a", &[])], &[]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStep(_)));
    }

    #[test]
    fn cycle_is_rejected() {
        let steps = vec![step("a", &["b"]), step("b", &["a"]), step("c", &[])];
        match plan_steps(&steps, &[]) {
            Err(ConfigError::DependencyCycle(members)) => assert_eq!(members, vec!["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn filter_pulls_in_transitive_dependencies() {
        let plan = plan_steps(
            &integration_steps(),
            &["fetch-detected-applications".to_string()],
        )
        .unwrap();
        assert_eq!(
            ids(&plan),
            vec![
                "create-account",
                "fetch-users",
                "fetch-managed-devices",
                "fetch-managed-applications",
                "fetch-detected-applications",
            ]
        );
    }

    #[test]
    fn unknown_filter_step_is_rejected() {
        let err = plan_steps(&integration_steps(), &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStep(_)));
    }

    #[test]
    fn full_plan_orders_policy_states_after_policies() {
        let plan = plan_steps(&integration_steps(), &[]).unwrap();
        let order = ids(&plan);
        let position = |id: &str| order.iter().position(|s| *s == id).unwrap();
        assert!(position("fetch-compliance-policies") < position("fetch-compliance-policy-states"));
        assert!(position("fetch-managed-devices") < position("build-device-host-agent-relationships"));
        assert_eq!(order.len(), StepId::ALL.len());
    }
}
