//! Core types for trialcheck.
//!
//! Wire names follow the measurement API (`studyInstanceUid`,
//! `measurementNumber`, `nonTargets`) so fixtures exported from a viewer
//! deserialize without translation.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ConformanceError;

/// The two measurement kinds tracked by oncology response criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementKind {
    /// Lesions tracked for response
    Targets,
    /// Lesions tracked for presence/absence only
    NonTargets,
}

impl MeasurementKind {
    /// All kinds, in the order datasets are assembled.
    pub const ALL: [MeasurementKind; 2] = [MeasurementKind::Targets, MeasurementKind::NonTargets];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::Targets => "targets",
            MeasurementKind::NonTargets => "nonTargets",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded measurement.
///
/// Owned by the measurement store; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Store identifier
    pub id: String,

    /// Study the measurement was taken on
    pub study_instance_uid: String,

    /// Timepoint the measurement belongs to, if already assigned
    #[serde(default)]
    pub timepoint_id: Option<String>,

    /// Tool that produced the measurement (e.g., "bidirectional")
    pub tool_type: String,

    /// Identity within a tool-type lineage across timepoints
    pub measurement_number: u32,

    /// Geometric/numeric payload, opaque to the pipeline
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Measurement {
    /// Look up a string field in the payload.
    pub fn data_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }
}

/// Clinical classification of a timepoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimepointType {
    Baseline,
    Followup,
}

impl TimepointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimepointType::Baseline => "baseline",
            TimepointType::Followup => "followup",
        }
    }
}

impl fmt::Display for TimepointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clinical visit/scan event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timepoint {
    pub timepoint_id: String,
    pub timepoint_type: TimepointType,
}

impl Timepoint {
    pub fn new(timepoint_id: impl Into<String>, timepoint_type: TimepointType) -> Self {
        Self {
            timepoint_id: timepoint_id.into(),
            timepoint_type,
        }
    }
}

/// The logical timepoint a dataset or rule set applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimepointScope {
    Baseline,
    Followup,
    Both,
}

impl TimepointScope {
    /// Fixed evaluation order. MaxTargets tie-breaks depend on it.
    pub const EVALUATION_ORDER: [TimepointScope; 3] = [
        TimepointScope::Both,
        TimepointScope::Baseline,
        TimepointScope::Followup,
    ];

    /// Whether a timepoint of the given type belongs to this scope.
    pub fn matches(&self, timepoint_type: TimepointType) -> bool {
        match self {
            TimepointScope::Both => true,
            TimepointScope::Baseline => timepoint_type == TimepointType::Baseline,
            TimepointScope::Followup => timepoint_type == TimepointType::Followup,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimepointScope::Baseline => "baseline",
            TimepointScope::Followup => "followup",
            TimepointScope::Both => "both",
        }
    }
}

impl fmt::Display for TimepointScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Imaging metadata of a single instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetadata {
    #[serde(default)]
    pub series_instance_uid: Option<String>,

    #[serde(default)]
    pub sop_instance_uid: Option<String>,

    /// DICOM modality (e.g., "CT", "MR")
    #[serde(default)]
    pub modality: Option<String>,

    /// Any other header attributes the metadata service exposes
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Metadata of a study, as resolved by the metadata service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyMetadata {
    pub study_instance_uid: String,

    #[serde(default)]
    pub instances: Vec<InstanceMetadata>,
}

impl StudyMetadata {
    /// The instance that represents the study in a dataset entry.
    pub fn first_instance(&self) -> Option<&InstanceMetadata> {
        self.instances.first()
    }
}

/// A measurement paired with its resolved metadata and timepoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSetEntry {
    pub measurement: Measurement,
    pub metadata: InstanceMetadata,
    pub timepoint: Timepoint,
}

/// The measurements of one timepoint scope, split by kind.
///
/// Built fresh for every validation run and never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimepointDataSet {
    pub targets: Vec<DataSetEntry>,
    pub non_targets: Vec<DataSetEntry>,
}

impl TimepointDataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the `both` view: baseline entries first, then follow-up,
    /// regardless of which fetch finished first.
    pub fn merge(baseline: &TimepointDataSet, followup: &TimepointDataSet) -> Self {
        let mut merged = baseline.clone();
        merged.targets.extend(followup.targets.iter().cloned());
        merged.non_targets.extend(followup.non_targets.iter().cloned());
        merged
    }

    pub fn entries(&self, kind: MeasurementKind) -> &[DataSetEntry] {
        match kind {
            MeasurementKind::Targets => &self.targets,
            MeasurementKind::NonTargets => &self.non_targets,
        }
    }

    pub fn entries_mut(&mut self, kind: MeasurementKind) -> &mut Vec<DataSetEntry> {
        match kind {
            MeasurementKind::Targets => &mut self.targets,
            MeasurementKind::NonTargets => &mut self.non_targets,
        }
    }

    /// Entries of one kind, or of every kind when `kind` is `None`.
    pub fn select(&self, kind: Option<MeasurementKind>) -> Vec<&DataSetEntry> {
        match kind {
            Some(kind) => self.entries(kind).iter().collect(),
            None => self.targets.iter().chain(self.non_targets.iter()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len() + self.non_targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.non_targets.is_empty()
    }
}

/// The rule family selected for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCriteriaType {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,
}

impl TrialCriteriaType {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Registry key for this criteria type.
    ///
    /// Fails when the identifier is blank.
    pub fn key(&self) -> Result<String, ConformanceError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ConformanceError::MalformedCriteriaType(
                "missing identifier".to_string(),
            ));
        }
        Ok(id.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, timepoint_type: TimepointType) -> DataSetEntry {
        DataSetEntry {
            measurement: Measurement {
                id: id.to_string(),
                study_instance_uid: "1.2.3".to_string(),
                timepoint_id: Some(format!("tp-{}", timepoint_type)),
                tool_type: "bidirectional".to_string(),
                measurement_number: 1,
                data: serde_json::Value::Null,
            },
            metadata: InstanceMetadata::default(),
            timepoint: Timepoint::new(format!("tp-{}", timepoint_type), timepoint_type),
        }
    }

    #[test]
    fn test_scope_matches() {
        assert!(TimepointScope::Both.matches(TimepointType::Baseline));
        assert!(TimepointScope::Both.matches(TimepointType::Followup));
        assert!(TimepointScope::Baseline.matches(TimepointType::Baseline));
        assert!(!TimepointScope::Baseline.matches(TimepointType::Followup));
        assert!(!TimepointScope::Followup.matches(TimepointType::Baseline));
    }

    #[test]
    fn test_merge_puts_baseline_first() {
        let baseline = TimepointDataSet {
            targets: vec![entry("m1", TimepointType::Baseline)],
            non_targets: vec![],
        };
        let followup = TimepointDataSet {
            targets: vec![entry("m3", TimepointType::Followup)],
            non_targets: vec![entry("m2", TimepointType::Followup)],
        };

        let merged = TimepointDataSet::merge(&baseline, &followup);
        let ids: Vec<_> = merged.targets.iter().map(|e| e.measurement.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
        assert_eq!(merged.non_targets.len(), 1);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_criteria_key_lowercases() {
        let criteria = TrialCriteriaType::new("RECIST");
        assert_eq!(criteria.key().unwrap(), "recist");
    }

    #[test]
    fn test_blank_criteria_is_malformed() {
        let criteria = TrialCriteriaType::new("  ");
        assert!(matches!(
            criteria.key(),
            Err(ConformanceError::MalformedCriteriaType(_))
        ));
    }

    #[test]
    fn test_measurement_wire_names() {
        let json = serde_json::json!({
            "id": "m1",
            "studyInstanceUid": "1.2.3",
            "timepointId": "TP1",
            "toolType": "bidirectional",
            "measurementNumber": 3,
            "data": { "location": "Liver" }
        });
        let measurement: Measurement = serde_json::from_value(json).unwrap();
        assert_eq!(measurement.measurement_number, 3);
        assert_eq!(measurement.data_str("location"), Some("Liver"));
    }
}
