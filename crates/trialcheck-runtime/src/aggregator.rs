//! Assembly of per-timepoint datasets.
//!
//! For a requested scope, every measurement whose timepoint resolves to
//! that scope is paired with its study's first-instance metadata. Entries
//! are appended as their lookups complete, so only set membership is
//! stable between runs, not order.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use trialcheck_core::{
    DataSetEntry, Measurement, MeasurementKind, TimepointDataSet, TimepointScope,
};

use crate::sources::{MeasurementStore, StudyMetadataService, TimepointRegistry};
use crate::RuntimeError;

/// Builds timepoint datasets from the external collaborators.
#[derive(Clone)]
pub struct DataAggregator {
    measurements: Arc<dyn MeasurementStore>,
    timepoints: Arc<dyn TimepointRegistry>,
    metadata: Arc<dyn StudyMetadataService>,
}

impl DataAggregator {
    pub fn new(
        measurements: Arc<dyn MeasurementStore>,
        timepoints: Arc<dyn TimepointRegistry>,
        metadata: Arc<dyn StudyMetadataService>,
    ) -> Self {
        Self {
            measurements,
            timepoints,
            metadata,
        }
    }

    /// The measurement store this aggregator reads from.
    pub fn measurement_store(&self) -> &Arc<dyn MeasurementStore> {
        &self.measurements
    }

    /// Build the dataset of one scope.
    ///
    /// Measurements without a timepoint, with an unknown timepoint, or with
    /// a timepoint outside `scope` are skipped. Any failed lookup fails the
    /// whole call; no partial dataset is returned.
    pub async fn get_data(&self, scope: TimepointScope) -> Result<TimepointDataSet, RuntimeError> {
        let mut pending = FuturesUnordered::new();

        for kind in MeasurementKind::ALL {
            for measurement in self.measurements.fetch(kind).await? {
                pending.push(self.resolve(scope, kind, measurement));
            }
        }

        let mut data = TimepointDataSet::new();
        while let Some(resolved) = pending.next().await {
            if let Some((kind, entry)) = resolved? {
                data.entries_mut(kind).push(entry);
            }
        }

        tracing::debug!(
            scope = %scope,
            targets = data.targets.len(),
            non_targets = data.non_targets.len(),
            "Dataset assembled"
        );

        Ok(data)
    }

    async fn resolve(
        &self,
        scope: TimepointScope,
        kind: MeasurementKind,
        measurement: Measurement,
    ) -> Result<Option<(MeasurementKind, DataSetEntry)>, RuntimeError> {
        let Some(timepoint_id) = measurement.timepoint_id.as_deref() else {
            return Ok(None);
        };

        let timepoint = match self.timepoints.find_by_identifier(timepoint_id).await? {
            Some(timepoint) if scope.matches(timepoint.timepoint_type) => timepoint,
            _ => return Ok(None),
        };

        let study = self
            .metadata
            .retrieve_by_study_identifier(&measurement.study_instance_uid)
            .await?;
        let metadata = study
            .first_instance()
            .cloned()
            .ok_or_else(|| RuntimeError::EmptyStudy(measurement.study_instance_uid.clone()))?;

        Ok(Some((
            kind,
            DataSetEntry {
                measurement,
                metadata,
                timepoint,
            },
        )))
    }
}
