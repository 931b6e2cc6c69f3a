//! Dispatch of scoped datasets to registered evaluators.
//!
//! Scopes are evaluated in the fixed order `both`, `baseline`, `followup`;
//! within a scope evaluators run in registration order. The MaxTargets
//! ceiling is last-writer-wins over that same order.

use crate::nonconformity::Nonconformity;
use crate::registry::DefinitionRegistry;
use crate::types::{TimepointDataSet, TimepointScope};

/// Datasets for the three logical timepoints of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedDataSets {
    pub baseline: TimepointDataSet,
    pub followup: TimepointDataSet,
    pub both: TimepointDataSet,
}

impl ScopedDataSets {
    /// Build all three scopes; `both` concatenates baseline then follow-up.
    pub fn new(baseline: TimepointDataSet, followup: TimepointDataSet) -> Self {
        let both = TimepointDataSet::merge(&baseline, &followup);
        Self {
            baseline,
            followup,
            both,
        }
    }

    pub fn get(&self, scope: TimepointScope) -> &TimepointDataSet {
        match scope {
            TimepointScope::Baseline => &self.baseline,
            TimepointScope::Followup => &self.followup,
            TimepointScope::Both => &self.both,
        }
    }
}

/// Outcome of evaluating every scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeEvaluation {
    pub nonconformities: Vec<Nonconformity>,
    pub max_targets: Option<u32>,
}

/// Evaluate every scope of a criteria type.
///
/// `on_max_targets` is called each time an evaluator reports a ceiling,
/// before that evaluator runs.
pub fn evaluate_scopes(
    registry: &DefinitionRegistry,
    key: &str,
    datasets: &ScopedDataSets,
    mut on_max_targets: impl FnMut(u32),
) -> ScopeEvaluation {
    let mut evaluation = ScopeEvaluation::default();

    for scope in TimepointScope::EVALUATION_ORDER {
        let data = datasets.get(scope);

        for evaluator in registry.evaluators(scope, key) {
            if let Some(ceiling) = evaluator.max_targets() {
                evaluation.max_targets = Some(ceiling);
                on_max_targets(ceiling);
            }

            let found = evaluator.evaluate(data);
            tracing::debug!(
                criteria = %key,
                scope = %scope,
                evaluator = evaluator.name(),
                nonconformities = found.len(),
                "Evaluator finished"
            );
            evaluation.nonconformities.extend(found);
        }
    }

    evaluation
}
