//! Evaluation definitions parsing from YAML/JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluator::RuleSetEvaluator;
use crate::registry::EvaluationDefinition;
use crate::rules::RuleSet;
use crate::types::TimepointScope;

/// Errors that can occur when loading evaluation definitions.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to read definitions file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid JSON Schema in rule {rule_id}: {message}")]
    InvalidSchema { rule_id: String, message: String },

    #[error("Invalid pattern in rule {rule_id}: {source}")]
    InvalidPattern {
        rule_id: String,
        #[source]
        source: regex::Error,
    },

    #[error("Definition validation failed: {0}")]
    Validation(String),
}

/// Rule sets of one criteria family, per timepoint scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSpec {
    /// Display name (e.g., "RECIST 1.1")
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub baseline: Option<RuleSet>,

    #[serde(default)]
    pub followup: Option<RuleSet>,

    #[serde(default)]
    pub both: Option<RuleSet>,
}

impl DefinitionSpec {
    pub fn rule_set(&self, scope: TimepointScope) -> Option<&RuleSet> {
        match scope {
            TimepointScope::Baseline => self.baseline.as_ref(),
            TimepointScope::Followup => self.followup.as_ref(),
            TimepointScope::Both => self.both.as_ref(),
        }
    }

    /// Compile every scope's rule set into an evaluation definition.
    pub fn build(&self, key: &str) -> Result<EvaluationDefinition, DefinitionError> {
        let mut definition = EvaluationDefinition::new();
        if let Some(name) = &self.name {
            definition = definition.with_name(name.clone());
        }

        for scope in TimepointScope::EVALUATION_ORDER {
            if let Some(rule_set) = self.rule_set(scope) {
                let evaluator = RuleSetEvaluator::new(format!("{}/{}", key, scope), rule_set)?;
                definition.push(scope, Arc::new(evaluator));
            }
        }

        Ok(definition)
    }
}

/// A definitions document: criteria key to per-scope rule sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionsFile {
    pub definitions: BTreeMap<String, DefinitionSpec>,
}

impl DefinitionsFile {
    /// Parse definitions from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        let file: DefinitionsFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    /// Parse definitions from JSON string.
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let file: DefinitionsFile = serde_json::from_str(json)?;
        file.validate()?;
        Ok(file)
    }

    /// Load definitions from a file, choosing the format by extension.
    ///
    /// `.json` files are parsed as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Validate keys and every rule set.
    fn validate(&self) -> Result<(), DefinitionError> {
        let mut seen = std::collections::HashSet::new();

        for (key, spec) in &self.definitions {
            let normalized = key.trim().to_lowercase();
            if normalized.is_empty() {
                return Err(DefinitionError::Validation(
                    "definition with empty key".to_string(),
                ));
            }
            if !seen.insert(normalized) {
                return Err(DefinitionError::Validation(format!(
                    "Duplicate definition key (case-insensitive): {}",
                    key
                )));
            }
            for scope in TimepointScope::EVALUATION_ORDER {
                if let Some(rule_set) = spec.rule_set(scope) {
                    rule_set.validate().map_err(|e| match e {
                        DefinitionError::Validation(msg) => {
                            DefinitionError::Validation(format!("{}/{}: {}", key, scope, msg))
                        }
                        other => other,
                    })?;
                }
            }
        }

        Ok(())
    }

    /// Criteria keys in the document.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
