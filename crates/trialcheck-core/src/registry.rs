//! Registry of evaluation definitions.
//!
//! Maps a trial-criteria-type key to the evaluators of each timepoint
//! scope. The registry is an explicit object handed to the orchestrator;
//! definitions may be added or replaced while it is shared.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = DefinitionRegistry::new();
//! registry.register_all(&DefinitionsFile::from_path("criteria.yaml")?)?;
//!
//! let evaluators = registry.evaluators(TimepointScope::Baseline, "recist");
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::definitions::{DefinitionError, DefinitionsFile};
use crate::evaluator::CriteriaEvaluator;
use crate::types::TimepointScope;

/// Evaluators of one criteria family, per timepoint scope.
#[derive(Clone, Default)]
pub struct EvaluationDefinition {
    name: Option<String>,
    scopes: BTreeMap<TimepointScope, Vec<Arc<dyn CriteriaEvaluator>>>,
}

impl EvaluationDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an evaluator to a scope, builder style.
    pub fn with_evaluator(
        mut self,
        scope: TimepointScope,
        evaluator: Arc<dyn CriteriaEvaluator>,
    ) -> Self {
        self.push(scope, evaluator);
        self
    }

    /// Append an evaluator; evaluators run in the order they were added.
    pub fn push(&mut self, scope: TimepointScope, evaluator: Arc<dyn CriteriaEvaluator>) {
        self.scopes.entry(scope).or_default().push(evaluator);
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn evaluators(&self, scope: TimepointScope) -> &[Arc<dyn CriteriaEvaluator>] {
        self.scopes.get(&scope).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl std::fmt::Debug for EvaluationDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scopes: BTreeMap<_, Vec<&str>> = self
            .scopes
            .iter()
            .map(|(scope, evaluators)| (scope, evaluators.iter().map(|e| e.name()).collect()))
            .collect();
        f.debug_struct("EvaluationDefinition")
            .field("name", &self.name)
            .field("scopes", &scopes)
            .finish()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Registry of evaluation definitions keyed by trimmed, lowercased criteria id.
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: RwLock<BTreeMap<String, EvaluationDefinition>>,
}

impl DefinitionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition.
    ///
    /// If a definition with the same key already exists, it will be replaced.
    pub fn register(&self, key: &str, definition: EvaluationDefinition) {
        let key = normalize_key(key);
        let replaced = self.definitions.write().insert(key.clone(), definition).is_some();
        tracing::debug!(criteria = %key, replaced, "Registered evaluation definition");
    }

    /// Compile and register every definition in a document.
    ///
    /// Nothing is registered if any definition fails to compile.
    pub fn register_all(&self, file: &DefinitionsFile) -> Result<usize, DefinitionError> {
        let built = file
            .definitions
            .iter()
            .map(|(key, spec)| spec.build(key).map(|definition| (key, definition)))
            .collect::<Result<Vec<_>, _>>()?;

        let count = built.len();
        for (key, definition) in built {
            self.register(key, definition);
        }
        Ok(count)
    }

    /// Evaluators registered for a scope of a criteria type.
    ///
    /// Unknown keys and scopes yield no evaluators.
    pub fn evaluators(&self, scope: TimepointScope, key: &str) -> Vec<Arc<dyn CriteriaEvaluator>> {
        self.definitions
            .read()
            .get(&normalize_key(key))
            .map(|definition| definition.evaluators(scope).to_vec())
            .unwrap_or_default()
    }

    /// Check if a criteria type is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.definitions.read().contains_key(&normalize_key(key))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    /// Get a copy of a registered definition.
    pub fn get(&self, key: &str) -> Option<EvaluationDefinition> {
        self.definitions.read().get(&normalize_key(key)).cloned()
    }

    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("criteria", &self.keys())
            .finish()
    }
}
