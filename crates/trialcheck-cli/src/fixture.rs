//! Measurement fixtures.
//!
//! A fixture is a JSON snapshot of everything the pipeline reads from its
//! collaborators:
//!
//! ```json
//! {
//!   "measurements": { "targets": [...], "nonTargets": [...] },
//!   "timepoints": [{ "timepointId": "T1", "timepointType": "baseline" }],
//!   "studies": [{ "studyInstanceUid": "1.2.3", "instances": [{ "modality": "CT" }] }],
//!   "toolGroups": { "bidirectional": "targets" }
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use trialcheck_core::{Measurement, StudyMetadata, Timepoint, ToolGroupMap};
use trialcheck_runtime::{InMemoryMeasurementStore, InMemoryStudyMetadata, InMemoryTimepointRegistry};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    #[serde(default)]
    pub measurements: FixtureMeasurements,

    #[serde(default)]
    pub timepoints: Vec<Timepoint>,

    #[serde(default)]
    pub studies: Vec<StudyMetadata>,

    #[serde(default)]
    pub tool_groups: ToolGroupMap,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureMeasurements {
    #[serde(default)]
    pub targets: Vec<Measurement>,

    #[serde(default)]
    pub non_targets: Vec<Measurement>,
}

impl Fixture {
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse fixture {}", path.display()))
    }

    /// Split the fixture into in-memory collaborators.
    pub fn into_sources(
        self,
    ) -> (
        InMemoryMeasurementStore,
        InMemoryTimepointRegistry,
        InMemoryStudyMetadata,
        ToolGroupMap,
    ) {
        (
            InMemoryMeasurementStore::with_measurements(
                self.measurements.targets,
                self.measurements.non_targets,
            ),
            self.timepoints.into_iter().collect(),
            self.studies.into_iter().collect(),
            self.tool_groups,
        )
    }
}
