//! Validation reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::grouping::GroupedNonConformities;
use crate::nonconformity::Nonconformity;
use crate::types::TimepointScope;

/// Everything one validation run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Lowercased criteria key the run was evaluated against
    pub criteria: String,

    pub nonconformities: Vec<Nonconformity>,

    pub grouped: GroupedNonConformities,

    pub max_targets: Option<u32>,

    /// Number of dataset entries per scope
    pub dataset_sizes: BTreeMap<TimepointScope, usize>,

    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn is_conformant(&self) -> bool {
        self.nonconformities.is_empty()
    }

    pub fn global_count(&self) -> usize {
        self.nonconformities.iter().filter(|n| n.is_global()).count()
    }
}
