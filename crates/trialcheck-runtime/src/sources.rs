//! Collaborator abstractions for trialcheck-runtime.
//!
//! The pipeline reads from three external systems: the measurement store,
//! the timepoint registry and the study metadata service. Each is a trait
//! so the viewer, a server, or the in-memory implementations in
//! [`crate::memory`] can back it.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use trialcheck_core::{Measurement, MeasurementKind, StudyMetadata, Timepoint};

/// Errors from external collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Source of recorded measurements.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Fetch every measurement of a kind.
    async fn fetch(&self, kind: MeasurementKind) -> Result<Vec<Measurement>, SourceError>;

    /// Change signal; the value is bumped on every mutation.
    fn changes(&self) -> watch::Receiver<u64>;
}

/// Lookup of timepoints by identifier.
#[async_trait]
pub trait TimepointRegistry: Send + Sync {
    /// Resolve a timepoint, `Ok(None)` when it is unknown.
    async fn find_by_identifier(&self, timepoint_id: &str)
        -> Result<Option<Timepoint>, SourceError>;
}

/// Retrieval of study metadata.
#[async_trait]
pub trait StudyMetadataService: Send + Sync {
    async fn retrieve_by_study_identifier(
        &self,
        study_instance_uid: &str,
    ) -> Result<StudyMetadata, SourceError>;
}
