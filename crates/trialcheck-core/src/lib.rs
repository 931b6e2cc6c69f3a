//! # trialcheck-core
//!
//! Deterministic conformance evaluation for clinical-trial imaging
//! measurements.
//!
//! This crate holds everything that does not need I/O:
//! - The measurement/timepoint data model
//! - Declarative rule sets and the evaluators compiled from them
//! - The registry mapping a trial criteria type to per-scope evaluators
//! - Grouping of nonconformities for presentation
//!
//! Assembling datasets from the measurement store and re-validating on
//! change lives in `trialcheck-runtime`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use trialcheck_core::{DefinitionRegistry, DefinitionsFile, ScopedDataSets, evaluate_scopes};
//!
//! let registry = DefinitionRegistry::new();
//! registry.register_all(&DefinitionsFile::from_path("criteria.yaml")?)?;
//!
//! let datasets = ScopedDataSets::new(baseline, followup);
//! let result = evaluate_scopes(&registry, "recist", &datasets, |_| {});
//! let grouped = group_nonconformities(&result.nonconformities, &tool_groups);
//! ```

pub mod definitions;
pub mod dispatch;
pub mod evaluator;
pub mod grouping;
pub mod nonconformity;
pub mod registry;
pub mod report;
pub mod rules;
pub mod types;

// Re-export main types at crate root
pub use definitions::{DefinitionError, DefinitionSpec, DefinitionsFile};
pub use dispatch::{evaluate_scopes, ScopeEvaluation, ScopedDataSets};
pub use evaluator::{CriteriaEvaluator, RuleSetEvaluator};
pub use grouping::{
    group_nonconformities, GlobalGroup, GroupedNonConformities, MeasurementNumberEntry,
    ToolGroup, ToolGroupMap, GLOBALS_KEY,
};
pub use nonconformity::Nonconformity;
pub use registry::{DefinitionRegistry, EvaluationDefinition};
pub use report::ValidationReport;
pub use rules::{Rule, RuleCheck, RuleSet};
pub use types::{
    DataSetEntry, InstanceMetadata, Measurement, MeasurementKind, StudyMetadata, Timepoint,
    TimepointDataSet, TimepointScope, TimepointType, TrialCriteriaType,
};

use thiserror::Error;

/// Errors that can occur during conformance evaluation.
#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("Malformed trial criteria type: {0}")]
    MalformedCriteriaType(String),

    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Tool group name is reserved: {0}")]
    ReservedGroupName(String),
}
