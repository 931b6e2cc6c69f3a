//! # trialcheck-runtime
//!
//! Async runtime around `trialcheck-core`.
//!
//! This crate assembles per-timepoint datasets from external collaborators,
//! runs the deterministic evaluation, publishes the results as observable
//! values, and re-runs validation when the inputs change.
//!
//! ## Example
//!
//! ```rust,ignore
//! use trialcheck_runtime::{ConformanceOrchestratorBuilder, Revalidator};
//!
//! let orchestrator = Arc::new(
//!     ConformanceOrchestratorBuilder::new()
//!         .measurements(store)
//!         .timepoints(timepoints)
//!         .metadata(metadata)
//!         .build()?,
//! );
//!
//! let nonconformities = orchestrator
//!     .validate(&TrialCriteriaType::new("RECIST"))
//!     .await?;
//!
//! // Re-validate on every change, 300ms after the last one
//! let revalidator = Revalidator::spawn(orchestrator.clone(), triggers, config.debounce);
//! ```

use thiserror::Error;
use trialcheck_core::ConformanceError;

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod memory;
pub mod observable;
pub mod orchestrator;
pub mod revalidate;
pub mod sources;

pub use aggregator::DataAggregator;
pub use cache::CachedMetadataService;
pub use config::{MetadataCacheConfig, RuntimeConfig};
pub use memory::{InMemoryMeasurementStore, InMemoryStudyMetadata, InMemoryTimepointRegistry};
pub use observable::Observable;
pub use orchestrator::{ConformanceOrchestrator, ConformanceOrchestratorBuilder};
pub use revalidate::{RevalidationTriggers, Revalidator};
pub use sources::{MeasurementStore, SourceError, StudyMetadataService, TimepointRegistry};

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Data fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("Study {0} has no instances")]
    EmptyStudy(String),

    #[error(transparent)]
    Conformance(#[from] ConformanceError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
