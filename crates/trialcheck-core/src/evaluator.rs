//! Criteria evaluators.
//!
//! An evaluator runs one rule set against the dataset of one timepoint
//! scope. Evaluation is synchronous and never suspends.

use std::collections::BTreeMap;

use regex::Regex;

use crate::definitions::DefinitionError;
use crate::nonconformity::Nonconformity;
use crate::rules::{Rule, RuleCheck, RuleSet};
use crate::types::{DataSetEntry, Measurement, MeasurementKind, TimepointDataSet};

/// Trait for pluggable criteria evaluators.
///
/// # Contract
/// - MUST NOT block or perform I/O
/// - MUST return the same nonconformities for the same dataset
pub trait CriteriaEvaluator: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Evaluate the dataset of one timepoint scope.
    fn evaluate(&self, data: &TimepointDataSet) -> Vec<Nonconformity>;

    /// Target-count ceiling this evaluator enforces, if any.
    fn max_targets(&self) -> Option<u32> {
        None
    }
}

/// Evaluator backed by a declarative `RuleSet`.
///
/// Schemas and patterns are compiled once, at construction.
pub struct RuleSetEvaluator {
    name: String,
    max_targets: Option<u32>,
    rules: Vec<CompiledRule>,
}

struct CompiledRule {
    message: Option<String>,
    check: CompiledCheck,
}

enum CompiledCheck {
    MaxCount {
        kind: MeasurementKind,
        limit: u32,
    },
    MinCount {
        kind: MeasurementKind,
        min: u32,
    },
    MaxPerGroup {
        kind: Option<MeasurementKind>,
        field: String,
        limit: u32,
    },
    PayloadSchema {
        kind: Option<MeasurementKind>,
        validator: jsonschema::Validator,
    },
    Pattern {
        kind: Option<MeasurementKind>,
        field: String,
        regex: Regex,
    },
    Modality {
        kind: Option<MeasurementKind>,
        allowed: Vec<String>,
    },
    ConsistentModality {
        kind: Option<MeasurementKind>,
    },
}

impl RuleSetEvaluator {
    /// Compile a rule set.
    pub fn new(name: impl Into<String>, rule_set: &RuleSet) -> Result<Self, DefinitionError> {
        rule_set.validate()?;

        let rules = rule_set
            .rules
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.into(),
            max_targets: rule_set.max_targets(),
            rules,
        })
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn compile_rule(rule: &Rule) -> Result<CompiledRule, DefinitionError> {
    let check = match &rule.check {
        RuleCheck::MaxCount { kind, limit } => CompiledCheck::MaxCount {
            kind: *kind,
            limit: *limit,
        },
        RuleCheck::MinCount { kind, min } => CompiledCheck::MinCount {
            kind: *kind,
            min: *min,
        },
        RuleCheck::MaxPerGroup { kind, field, limit } => CompiledCheck::MaxPerGroup {
            kind: *kind,
            field: field.clone(),
            limit: *limit,
        },
        RuleCheck::PayloadSchema { kind, schema } => {
            let validator = jsonschema::options().build(schema).map_err(|e| {
                DefinitionError::InvalidSchema {
                    rule_id: rule.id.clone(),
                    message: e.to_string(),
                }
            })?;
            CompiledCheck::PayloadSchema {
                kind: *kind,
                validator,
            }
        }
        RuleCheck::Pattern {
            kind,
            field,
            pattern,
        } => {
            let regex = Regex::new(pattern).map_err(|source| DefinitionError::InvalidPattern {
                rule_id: rule.id.clone(),
                source,
            })?;
            CompiledCheck::Pattern {
                kind: *kind,
                field: field.clone(),
                regex,
            }
        }
        RuleCheck::Modality { kind, allowed } => CompiledCheck::Modality {
            kind: *kind,
            allowed: allowed.iter().map(|m| m.to_uppercase()).collect(),
        },
        RuleCheck::ConsistentModality { kind } => CompiledCheck::ConsistentModality { kind: *kind },
    };

    Ok(CompiledRule {
        message: rule.message.clone(),
        check,
    })
}

impl CriteriaEvaluator for RuleSetEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, data: &TimepointDataSet) -> Vec<Nonconformity> {
        self.rules
            .iter()
            .flat_map(|rule| rule.evaluate(data))
            .collect()
    }

    fn max_targets(&self) -> Option<u32> {
        self.max_targets
    }
}

impl CompiledRule {
    fn message_or(&self, default: impl FnOnce() -> String) -> String {
        self.message.clone().unwrap_or_else(default)
    }

    fn evaluate(&self, data: &TimepointDataSet) -> Vec<Nonconformity> {
        match &self.check {
            CompiledCheck::MaxCount { kind, limit } => {
                let count = data.entries(*kind).len();
                if count as u64 <= u64::from(*limit) {
                    return vec![];
                }
                vec![Nonconformity::global(self.message_or(|| {
                    format!(
                        "The number of {} ({}) exceeds the maximum of {}",
                        kind, count, limit
                    )
                }))]
            }

            CompiledCheck::MinCount { kind, min } => {
                let count = data.entries(*kind).len();
                if count as u64 >= u64::from(*min) {
                    return vec![];
                }
                vec![Nonconformity::global(self.message_or(|| {
                    format!("At least {} {} required, found {}", min, kind, count)
                }))]
            }

            CompiledCheck::MaxPerGroup { kind, field, limit } => {
                // BTreeMap keeps the output order stable across runs
                let mut by_value: BTreeMap<&str, Vec<&DataSetEntry>> = BTreeMap::new();
                for entry in data.select(*kind) {
                    if let Some(value) = entry.measurement.data_str(field) {
                        by_value.entry(value).or_default().push(entry);
                    }
                }

                by_value
                    .into_iter()
                    .filter(|(_, entries)| entries.len() as u64 > u64::from(*limit))
                    .map(|(value, entries)| {
                        Nonconformity::for_measurements(
                            self.message_or(|| {
                                format!(
                                    "More than {} measurements with {} '{}'",
                                    limit, field, value
                                )
                            }),
                            measurements_of(&entries),
                        )
                    })
                    .collect()
            }

            CompiledCheck::PayloadSchema { kind, validator } => data
                .select(*kind)
                .into_iter()
                .filter_map(|entry| {
                    let first_error = validator
                        .iter_errors(&entry.measurement.data)
                        .next()
                        .map(|e| format!("{} at {}", e, e.instance_path))?;
                    Some(Nonconformity::for_measurements(
                        self.message_or(|| format!("Invalid measurement data: {}", first_error)),
                        vec![entry.measurement.clone()],
                    ))
                })
                .collect(),

            CompiledCheck::Pattern { kind, field, regex } => data
                .select(*kind)
                .into_iter()
                .filter(|entry| {
                    !entry
                        .measurement
                        .data_str(field)
                        .map(|value| regex.is_match(value))
                        .unwrap_or(false)
                })
                .map(|entry| {
                    Nonconformity::for_measurements(
                        self.message_or(|| {
                            format!("Field '{}' does not match {}", field, regex.as_str())
                        }),
                        vec![entry.measurement.clone()],
                    )
                })
                .collect(),

            CompiledCheck::Modality { kind, allowed } => data
                .select(*kind)
                .into_iter()
                .filter_map(|entry| {
                    let modality = entry.metadata.modality.as_deref().map(str::to_uppercase);
                    let default = match &modality {
                        Some(m) if allowed.contains(m) => return None,
                        Some(m) => format!(
                            "Modality {} is not allowed (expected one of {})",
                            m,
                            allowed.join(", ")
                        ),
                        None => "Modality is missing".to_string(),
                    };
                    Some(Nonconformity::for_measurements(
                        self.message_or(|| default),
                        vec![entry.measurement.clone()],
                    ))
                })
                .collect(),

            CompiledCheck::ConsistentModality { kind } => {
                let mut lineages: BTreeMap<(&str, u32), Vec<&DataSetEntry>> = BTreeMap::new();
                for entry in data.select(*kind) {
                    let key = (
                        entry.measurement.tool_type.as_str(),
                        entry.measurement.measurement_number,
                    );
                    lineages.entry(key).or_default().push(entry);
                }

                lineages
                    .into_iter()
                    .filter(|(_, entries)| {
                        let mut modalities = entries
                            .iter()
                            .map(|e| e.metadata.modality.as_deref().map(str::to_uppercase));
                        match modalities.next() {
                            Some(first) => modalities.any(|m| m != first),
                            None => false,
                        }
                    })
                    .map(|((_, number), entries)| {
                        Nonconformity::for_measurements(
                            self.message_or(|| {
                                format!(
                                    "Measurement {} uses different modalities across timepoints",
                                    number
                                )
                            }),
                            measurements_of(&entries),
                        )
                    })
                    .collect()
            }
        }
    }
}

fn measurements_of(entries: &[&DataSetEntry]) -> Vec<Measurement> {
    entries.iter().map(|e| e.measurement.clone()).collect()
}
