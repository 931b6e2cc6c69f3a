//! Declarative rule sets.
//!
//! A rule set is what a criteria family declares for one timepoint scope.
//! Rules are plain data here; `RuleSetEvaluator` compiles them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::definitions::DefinitionError;
use crate::types::MeasurementKind;

/// Rules applied to the dataset of one timepoint scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A single rule with ID and check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier within the rule set (e.g., "B1")
    pub id: String,

    /// Message reported instead of the check's default
    #[serde(default)]
    pub message: Option<String>,

    #[serde(flatten)]
    pub check: RuleCheck,
}

/// What a rule checks.
///
/// `kind: None` means the check covers targets and non-targets alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum RuleCheck {
    /// At most `limit` measurements of `kind` (global)
    MaxCount { kind: MeasurementKind, limit: u32 },

    /// At least `min` measurements of `kind` (global)
    MinCount { kind: MeasurementKind, min: u32 },

    /// At most `limit` measurements sharing the same payload `field` value
    MaxPerGroup {
        #[serde(default)]
        kind: Option<MeasurementKind>,
        field: String,
        limit: u32,
    },

    /// Every payload validates against a JSON Schema
    PayloadSchema {
        #[serde(default)]
        kind: Option<MeasurementKind>,
        schema: serde_json::Value,
    },

    /// A payload string field matches a regular expression
    Pattern {
        #[serde(default)]
        kind: Option<MeasurementKind>,
        field: String,
        pattern: String,
    },

    /// The instance modality is one of `allowed`
    Modality {
        #[serde(default)]
        kind: Option<MeasurementKind>,
        allowed: Vec<String>,
    },

    /// A lesion keeps the same modality across timepoints
    ConsistentModality {
        #[serde(default)]
        kind: Option<MeasurementKind>,
    },
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Validate the rule set structure.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen = HashSet::new();

        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                return Err(DefinitionError::Validation("rule with empty id".to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(DefinitionError::Validation(format!(
                    "Duplicate rule ID: {}",
                    rule.id
                )));
            }
            rule.check.validate(&rule.id)?;
        }

        Ok(())
    }

    /// Ceiling declared by the first targets `max_count` rule.
    pub fn max_targets(&self) -> Option<u32> {
        self.rules.iter().find_map(|rule| match rule.check {
            RuleCheck::MaxCount {
                kind: MeasurementKind::Targets,
                limit,
            } => Some(limit),
            _ => None,
        })
    }
}

impl RuleCheck {
    fn validate(&self, rule_id: &str) -> Result<(), DefinitionError> {
        match self {
            RuleCheck::MaxPerGroup { field, .. } | RuleCheck::Pattern { field, .. }
                if field.trim().is_empty() =>
            {
                Err(DefinitionError::Validation(format!(
                    "rule {}: field must not be empty",
                    rule_id
                )))
            }
            RuleCheck::Modality { allowed, .. } if allowed.is_empty() => {
                Err(DefinitionError::Validation(format!(
                    "rule {}: allowed modalities must not be empty",
                    rule_id
                )))
            }
            _ => Ok(()),
        }
    }
}
