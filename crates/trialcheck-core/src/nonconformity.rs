//! Nonconformities produced by criteria evaluators.

use serde::{Deserialize, Serialize};

use crate::types::Measurement;

/// A detected violation of a conformance rule.
///
/// A nonconformity is either global or tied to the measurements that
/// violate the rule, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Nonconformity {
    /// Applies to the measurement set as a whole
    Global { message: String },

    /// Applies to specific measurements, in the order the evaluator listed them
    Measurements {
        message: String,
        measurements: Vec<Measurement>,
    },
}

impl Nonconformity {
    pub fn global(message: impl Into<String>) -> Self {
        Self::Global {
            message: message.into(),
        }
    }

    pub fn for_measurements(message: impl Into<String>, measurements: Vec<Measurement>) -> Self {
        Self::Measurements {
            message: message.into(),
            measurements,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Global { message } | Self::Measurements { message, .. } => message,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global { .. })
    }

    /// Offending measurements (empty for global nonconformities).
    pub fn measurements(&self) -> &[Measurement] {
        match self {
            Self::Global { .. } => &[],
            Self::Measurements { measurements, .. } => measurements,
        }
    }
}
