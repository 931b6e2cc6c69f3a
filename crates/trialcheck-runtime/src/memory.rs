//! In-memory collaborators.
//!
//! Used by the CLI to validate fixture files and by tests. The measurement
//! store bumps its change signal on every mutation, so it can drive the
//! re-validation trigger directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use trialcheck_core::{Measurement, MeasurementKind, StudyMetadata, Timepoint};

use crate::sources::{MeasurementStore, SourceError, StudyMetadataService, TimepointRegistry};

/// Measurement store held in memory.
pub struct InMemoryMeasurementStore {
    targets: RwLock<Vec<Measurement>>,
    non_targets: RwLock<Vec<Measurement>>,
    changes: watch::Sender<u64>,
}

impl InMemoryMeasurementStore {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            targets: RwLock::new(Vec::new()),
            non_targets: RwLock::new(Vec::new()),
            changes,
        }
    }

    /// Create a store pre-filled with measurements.
    pub fn with_measurements(targets: Vec<Measurement>, non_targets: Vec<Measurement>) -> Self {
        let store = Self::new();
        *store.targets.write() = targets;
        *store.non_targets.write() = non_targets;
        store
    }

    fn list(&self, kind: MeasurementKind) -> &RwLock<Vec<Measurement>> {
        match kind {
            MeasurementKind::Targets => &self.targets,
            MeasurementKind::NonTargets => &self.non_targets,
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Add a measurement.
    pub fn add(&self, kind: MeasurementKind, measurement: Measurement) {
        self.list(kind).write().push(measurement);
        self.notify();
    }

    /// Replace a measurement with the same id, or add it.
    pub fn upsert(&self, kind: MeasurementKind, measurement: Measurement) {
        {
            let mut list = self.list(kind).write();
            match list.iter_mut().find(|m| m.id == measurement.id) {
                Some(existing) => *existing = measurement,
                None => list.push(measurement),
            }
        }
        self.notify();
    }

    /// Remove a measurement by id from either kind.
    pub fn remove(&self, id: &str) -> bool {
        let mut removed = false;
        for kind in MeasurementKind::ALL {
            let mut list = self.list(kind).write();
            let before = list.len();
            list.retain(|m| m.id != id);
            removed |= list.len() != before;
        }
        if removed {
            self.notify();
        }
        removed
    }

    /// Number of stored measurements of a kind.
    pub fn count(&self, kind: MeasurementKind) -> usize {
        self.list(kind).read().len()
    }
}

impl Default for InMemoryMeasurementStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementStore for InMemoryMeasurementStore {
    async fn fetch(&self, kind: MeasurementKind) -> Result<Vec<Measurement>, SourceError> {
        Ok(self.list(kind).read().clone())
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

/// Timepoint registry held in memory.
#[derive(Default)]
pub struct InMemoryTimepointRegistry {
    timepoints: RwLock<HashMap<String, Timepoint>>,
}

impl InMemoryTimepointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, timepoint: Timepoint) {
        self.timepoints
            .write()
            .insert(timepoint.timepoint_id.clone(), timepoint);
    }
}

impl FromIterator<Timepoint> for InMemoryTimepointRegistry {
    fn from_iter<I: IntoIterator<Item = Timepoint>>(iter: I) -> Self {
        let registry = Self::new();
        for timepoint in iter {
            registry.insert(timepoint);
        }
        registry
    }
}

#[async_trait]
impl TimepointRegistry for InMemoryTimepointRegistry {
    async fn find_by_identifier(
        &self,
        timepoint_id: &str,
    ) -> Result<Option<Timepoint>, SourceError> {
        Ok(self.timepoints.read().get(timepoint_id).cloned())
    }
}

/// Study metadata held in memory.
///
/// Unknown studies fail with `SourceError::NotFound`.
#[derive(Default)]
pub struct InMemoryStudyMetadata {
    studies: RwLock<HashMap<String, StudyMetadata>>,
    retrievals: AtomicUsize,
}

impl InMemoryStudyMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, study: StudyMetadata) {
        self.studies
            .write()
            .insert(study.study_instance_uid.clone(), study);
    }

    /// Number of retrievals served so far, hits and misses.
    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }
}

impl FromIterator<StudyMetadata> for InMemoryStudyMetadata {
    fn from_iter<I: IntoIterator<Item = StudyMetadata>>(iter: I) -> Self {
        let service = Self::new();
        for study in iter {
            service.insert(study);
        }
        service
    }
}

#[async_trait]
impl StudyMetadataService for InMemoryStudyMetadata {
    async fn retrieve_by_study_identifier(
        &self,
        study_instance_uid: &str,
    ) -> Result<StudyMetadata, SourceError> {
        self.retrievals.fetch_add(1, Ordering::SeqCst);
        self.studies
            .read()
            .get(study_instance_uid)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("study {}", study_instance_uid)))
    }
}
