//! Validation orchestrator.
//!
//! The orchestrator runs one validation:
//! - Parallel fan-out: baseline and follow-up datasets via tokio::join!
//! - Merge into the `both` view (baseline first)
//! - Deterministic fan-in: scopes evaluated in the fixed order both, baseline, followup
//! - Grouping and publication of the outputs
//!
//! A failed run publishes nothing; the previous outputs stay in place.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use trialcheck_core::{
    evaluate_scopes, group_nonconformities, DefinitionRegistry, EvaluationDefinition,
    GroupedNonConformities, Nonconformity, ScopedDataSets, TimepointScope, ToolGroupMap,
    TrialCriteriaType, ValidationReport,
};

use crate::aggregator::DataAggregator;
use crate::cache::CachedMetadataService;
use crate::config::MetadataCacheConfig;
use crate::observable::Observable;
use crate::sources::{MeasurementStore, StudyMetadataService, TimepointRegistry};
use crate::RuntimeError;

/// The orchestrator validates measurements against registered criteria.
///
/// # Architecture
/// - Fan-out: both timepoint datasets are assembled concurrently
/// - Fan-in: evaluators are synchronous and run strictly in sequence
/// - Outputs: flat list, grouped structure and MaxTargets, each observable
pub struct ConformanceOrchestrator {
    /// Dataset assembly
    aggregator: DataAggregator,

    /// Evaluation definitions, shared with whoever registers them
    registry: Arc<DefinitionRegistry>,

    /// Tool type to display group
    tool_groups: ToolGroupMap,

    nonconformities: Observable<Option<Arc<Vec<Nonconformity>>>>,
    grouped: Observable<Option<Arc<GroupedNonConformities>>>,
    max_targets: Observable<Option<u32>>,

    /// Serializes evaluation and publication so the three outputs always
    /// come from the same run
    publish: Mutex<()>,

    /// Successful runs so far
    runs_completed: AtomicU64,
}

impl ConformanceOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        aggregator: DataAggregator,
        registry: Arc<DefinitionRegistry>,
        tool_groups: ToolGroupMap,
    ) -> Self {
        Self {
            aggregator,
            registry,
            tool_groups,
            nonconformities: Observable::new(None),
            grouped: Observable::new(None),
            max_targets: Observable::new(None),
            publish: Mutex::new(()),
            runs_completed: AtomicU64::new(0),
        }
    }

    /// Register (or replace) the definition of a criteria type.
    pub fn set_evaluation_definitions(&self, key: &str, definition: EvaluationDefinition) {
        self.registry.register(key, definition);
    }

    /// Validate and return the flat nonconformity list.
    pub async fn validate(
        &self,
        criteria: &TrialCriteriaType,
    ) -> Result<Vec<Nonconformity>, RuntimeError> {
        Ok(self.validate_report(criteria).await?.nonconformities)
    }

    /// Validate and return everything the run produced.
    ///
    /// # Execution Flow
    /// 1. Resolve the registry key (fails fast on a blank id)
    /// 2. Fan-out: assemble baseline and follow-up datasets
    /// 3. Merge into the `both` dataset
    /// 4. Reset MaxTargets, evaluate every scope
    /// 5. Group and publish
    pub async fn validate_report(
        &self,
        criteria: &TrialCriteriaType,
    ) -> Result<ValidationReport, RuntimeError> {
        let key = criteria.key()?;

        // Fan-out: both datasets settle before either error is reported
        let (baseline, followup) = tokio::join!(
            self.aggregator.get_data(TimepointScope::Baseline),
            self.aggregator.get_data(TimepointScope::Followup),
        );
        let baseline = baseline.inspect_err(|e| {
            tracing::warn!(criteria = %key, scope = "baseline", error = %e, "Dataset assembly failed");
        })?;
        let followup = followup.inspect_err(|e| {
            tracing::warn!(criteria = %key, scope = "followup", error = %e, "Dataset assembly failed");
        })?;

        let datasets = ScopedDataSets::new(baseline, followup);
        let dataset_sizes: BTreeMap<TimepointScope, usize> = TimepointScope::EVALUATION_ORDER
            .iter()
            .map(|scope| (*scope, datasets.get(*scope).len()))
            .collect();

        if !self.registry.contains(&key) {
            tracing::debug!(criteria = %key, "No evaluation definition registered");
        }

        // Fan-in: deterministic evaluation. No await while the lock is held.
        let (evaluation, grouped) = {
            let _publish = self.publish.lock();

            self.max_targets.set(None);
            let evaluation = evaluate_scopes(&self.registry, &key, &datasets, |ceiling| {
                self.max_targets.set(Some(ceiling));
            });

            let grouped = group_nonconformities(&evaluation.nonconformities, &self.tool_groups);

            self.nonconformities
                .set(Some(Arc::new(evaluation.nonconformities.clone())));
            self.grouped.set(Some(Arc::new(grouped.clone())));
            self.runs_completed.fetch_add(1, Ordering::SeqCst);

            (evaluation, grouped)
        };

        tracing::info!(
            criteria = %key,
            nonconformities = evaluation.nonconformities.len(),
            max_targets = ?evaluation.max_targets,
            "Validation complete"
        );

        Ok(ValidationReport {
            criteria: key,
            nonconformities: evaluation.nonconformities,
            grouped,
            max_targets: evaluation.max_targets,
            dataset_sizes,
            validated_at: Utc::now(),
        })
    }

    /// Published flat nonconformities (`None` until the first successful run).
    pub fn nonconformities(&self) -> &Observable<Option<Arc<Vec<Nonconformity>>>> {
        &self.nonconformities
    }

    /// Published grouped nonconformities.
    pub fn grouped_nonconformities(&self) -> &Observable<Option<Arc<GroupedNonConformities>>> {
        &self.grouped
    }

    /// Published MaxTargets ceiling.
    pub fn max_targets(&self) -> &Observable<Option<u32>> {
        &self.max_targets
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    pub fn aggregator(&self) -> &DataAggregator {
        &self.aggregator
    }

    /// Number of runs that published their outputs.
    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::SeqCst)
    }
}

/// Builder for ConformanceOrchestrator.
pub struct ConformanceOrchestratorBuilder {
    measurements: Option<Arc<dyn MeasurementStore>>,
    timepoints: Option<Arc<dyn TimepointRegistry>>,
    metadata: Option<Arc<dyn StudyMetadataService>>,
    metadata_cache: Option<MetadataCacheConfig>,
    registry: Arc<DefinitionRegistry>,
    tool_groups: ToolGroupMap,
}

impl ConformanceOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            measurements: None,
            timepoints: None,
            metadata: None,
            metadata_cache: None,
            registry: Arc::new(DefinitionRegistry::new()),
            tool_groups: ToolGroupMap::new(),
        }
    }

    /// Set the measurement store.
    pub fn measurements(mut self, store: Arc<dyn MeasurementStore>) -> Self {
        self.measurements = Some(store);
        self
    }

    /// Set the timepoint registry.
    pub fn timepoints(mut self, registry: Arc<dyn TimepointRegistry>) -> Self {
        self.timepoints = Some(registry);
        self
    }

    /// Set the study metadata service.
    pub fn metadata(mut self, service: Arc<dyn StudyMetadataService>) -> Self {
        self.metadata = Some(service);
        self
    }

    /// Cache study metadata in front of the configured service.
    pub fn metadata_cache(mut self, config: MetadataCacheConfig) -> Self {
        self.metadata_cache = Some(config);
        self
    }

    /// Share an existing definitions registry.
    pub fn registry(mut self, registry: Arc<DefinitionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the tool-group mapping.
    pub fn tool_groups(mut self, tool_groups: ToolGroupMap) -> Self {
        self.tool_groups = tool_groups;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<ConformanceOrchestrator, RuntimeError> {
        let measurements = self
            .measurements
            .ok_or_else(|| RuntimeError::NotConfigured("No measurement store set".to_string()))?;
        let timepoints = self
            .timepoints
            .ok_or_else(|| RuntimeError::NotConfigured("No timepoint registry set".to_string()))?;
        let mut metadata = self
            .metadata
            .ok_or_else(|| RuntimeError::NotConfigured("No metadata service set".to_string()))?;

        if let Some(config) = &self.metadata_cache {
            metadata = Arc::new(CachedMetadataService::new(metadata, config));
        }

        Ok(ConformanceOrchestrator::new(
            DataAggregator::new(measurements, timepoints, metadata),
            self.registry,
            self.tool_groups,
        ))
    }
}

impl Default for ConformanceOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryMeasurementStore, InMemoryStudyMetadata, InMemoryTimepointRegistry};
    use crate::sources::SourceError;
    use std::sync::atomic::AtomicU32;
    use trialcheck_core::{
        ConformanceError, CriteriaEvaluator, InstanceMetadata, Measurement, MeasurementKind,
        StudyMetadata, Timepoint, TimepointDataSet, TimepointType,
    };

    struct Ceiling {
        name: &'static str,
        ceiling: Option<u32>,
    }

    impl CriteriaEvaluator for Ceiling {
        fn name(&self) -> &str {
            self.name
        }

        fn evaluate(&self, data: &TimepointDataSet) -> Vec<Nonconformity> {
            vec![Nonconformity::global(format!("{}:{}", self.name, data.targets.len()))]
        }

        fn max_targets(&self) -> Option<u32> {
            self.ceiling
        }
    }

    /// Every run sees a new ceiling and reports it back as its message.
    #[derive(Default)]
    struct RunCounter {
        runs: AtomicU32,
    }

    impl CriteriaEvaluator for RunCounter {
        fn name(&self) -> &str {
            "run-counter"
        }

        fn evaluate(&self, _data: &TimepointDataSet) -> Vec<Nonconformity> {
            vec![Nonconformity::global(format!("run:{}", self.runs.load(Ordering::SeqCst)))]
        }

        fn max_targets(&self) -> Option<u32> {
            Some(self.runs.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn measurement(id: &str, study: &str, timepoint: &str) -> Measurement {
        Measurement {
            id: id.to_string(),
            study_instance_uid: study.to_string(),
            timepoint_id: Some(timepoint.to_string()),
            tool_type: "bidirectional".to_string(),
            measurement_number: 1,
            data: serde_json::Value::Null,
        }
    }

    fn orchestrator(studies: Vec<&str>) -> ConformanceOrchestrator {
        let store = InMemoryMeasurementStore::with_measurements(
            vec![
                measurement("M1", "S1", "T1"),
                measurement("M3", "S2", "T2"),
            ],
            vec![measurement("M2", "S2", "T2")],
        );
        let timepoints: InMemoryTimepointRegistry = [
            Timepoint::new("T1", TimepointType::Baseline),
            Timepoint::new("T2", TimepointType::Followup),
        ]
        .into_iter()
        .collect();
        let metadata: InMemoryStudyMetadata = studies
            .into_iter()
            .map(|uid| StudyMetadata {
                study_instance_uid: uid.to_string(),
                instances: vec![InstanceMetadata::default()],
            })
            .collect();

        ConformanceOrchestratorBuilder::new()
            .measurements(Arc::new(store))
            .timepoints(Arc::new(timepoints))
            .metadata(Arc::new(metadata))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = ConformanceOrchestratorBuilder::new().build();
        assert!(matches!(result, Err(RuntimeError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn test_scopes_in_fixed_order() {
        let orchestrator = orchestrator(vec!["S1", "S2"]);
        orchestrator.set_evaluation_definitions(
            "recist",
            EvaluationDefinition::new()
                .with_evaluator(TimepointScope::Followup, Arc::new(Ceiling { name: "followup", ceiling: None }))
                .with_evaluator(TimepointScope::Baseline, Arc::new(Ceiling { name: "baseline", ceiling: None }))
                .with_evaluator(TimepointScope::Both, Arc::new(Ceiling { name: "both", ceiling: None })),
        );

        let result = orchestrator
            .validate(&TrialCriteriaType::new("RECIST"))
            .await
            .unwrap();

        let messages: Vec<_> = result.iter().map(|n| n.message()).collect();
        assert_eq!(messages, vec!["both:2", "baseline:1", "followup:1"]);
        assert_eq!(orchestrator.nonconformities().get().unwrap().len(), 3);
        assert_eq!(
            orchestrator.grouped_nonconformities().get().unwrap().global_messages().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_max_targets_last_writer_wins() {
        let orchestrator = orchestrator(vec!["S1", "S2"]);
        orchestrator.set_evaluation_definitions(
            "recist",
            EvaluationDefinition::new()
                .with_evaluator(TimepointScope::Followup, Arc::new(Ceiling { name: "f", ceiling: Some(3) }))
                .with_evaluator(TimepointScope::Followup, Arc::new(Ceiling { name: "g", ceiling: None }))
                .with_evaluator(TimepointScope::Both, Arc::new(Ceiling { name: "b", ceiling: Some(10) })),
        );

        let report = orchestrator
            .validate_report(&TrialCriteriaType::new("recist"))
            .await
            .unwrap();

        assert_eq!(report.max_targets, Some(3));
        assert_eq!(orchestrator.max_targets().get(), Some(3));
        assert_eq!(report.dataset_sizes[&TimepointScope::Both], 3);
    }

    #[tokio::test]
    async fn test_unregistered_criteria_yields_nothing() {
        let orchestrator = orchestrator(vec!["S1", "S2"]);
        let report = orchestrator
            .validate_report(&TrialCriteriaType::new("who"))
            .await
            .unwrap();

        assert!(report.is_conformant());
        assert!(report.grouped.is_empty());
        assert_eq!(orchestrator.max_targets().get(), None);
        assert_eq!(orchestrator.runs_completed(), 1);
    }

    #[tokio::test]
    async fn test_malformed_criteria_fails_fast() {
        let orchestrator = orchestrator(vec![]);
        let result = orchestrator.validate(&TrialCriteriaType::new("")).await;

        assert!(matches!(
            result,
            Err(RuntimeError::Conformance(ConformanceError::MalformedCriteriaType(_)))
        ));
        assert_eq!(orchestrator.runs_completed(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_publish_matching_outputs() {
        let orchestrator = Arc::new(orchestrator(vec!["S1", "S2"]));
        orchestrator.set_evaluation_definitions(
            "recist",
            EvaluationDefinition::new()
                .with_evaluator(TimepointScope::Followup, Arc::new(RunCounter::default())),
        );

        let runs: Vec<_> = (0..32)
            .map(|_| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .validate(&TrialCriteriaType::new("recist"))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for run in runs {
            run.await.unwrap();
        }

        let flat = orchestrator.nonconformities().get().unwrap();
        let grouped = orchestrator.grouped_nonconformities().get().unwrap();
        let max_targets = orchestrator.max_targets().get().unwrap();

        assert_eq!(orchestrator.runs_completed(), 32);
        assert_eq!(*grouped, group_nonconformities(&flat, &ToolGroupMap::new()));
        assert_eq!(flat[0].message(), format!("run:{max_targets}"));
    }

    #[tokio::test]
    async fn test_failed_run_keeps_previous_outputs() {
        let store = Arc::new(InMemoryMeasurementStore::with_measurements(
            vec![measurement("M1", "S1", "T1")],
            vec![],
        ));
        let timepoints: InMemoryTimepointRegistry =
            [Timepoint::new("T1", TimepointType::Baseline)].into_iter().collect();
        let metadata = InMemoryStudyMetadata::from_iter([StudyMetadata {
            study_instance_uid: "S1".to_string(),
            instances: vec![InstanceMetadata::default()],
        }]);
        let orchestrator = ConformanceOrchestratorBuilder::new()
            .measurements(store.clone())
            .timepoints(Arc::new(timepoints))
            .metadata(Arc::new(metadata))
            .build()
            .unwrap();
        orchestrator.set_evaluation_definitions(
            "recist",
            EvaluationDefinition::new()
                .with_evaluator(TimepointScope::Baseline, Arc::new(Ceiling { name: "baseline", ceiling: Some(5) })),
        );

        let criteria = TrialCriteriaType::new("recist");
        orchestrator.validate(&criteria).await.unwrap();
        let published = orchestrator.nonconformities().get();

        // A measurement on an unknown study breaks the next run
        store.add(MeasurementKind::Targets, measurement("M9", "S404", "T1"));
        let result = orchestrator.validate(&criteria).await;

        assert!(matches!(result, Err(RuntimeError::Source(SourceError::NotFound(_)))));
        assert_eq!(orchestrator.nonconformities().get(), published);
        assert_eq!(orchestrator.max_targets().get(), Some(5));
        assert_eq!(orchestrator.runs_completed(), 1);
    }

    #[tokio::test]
    async fn test_metadata_cache_in_front_of_service() {
        let store = InMemoryMeasurementStore::with_measurements(
            vec![measurement("M1", "S1", "T1"), measurement("M2", "S1", "T1")],
            vec![],
        );
        let timepoints: InMemoryTimepointRegistry =
            [Timepoint::new("T1", TimepointType::Baseline)].into_iter().collect();
        let metadata = Arc::new(InMemoryStudyMetadata::from_iter([StudyMetadata {
            study_instance_uid: "S1".to_string(),
            instances: vec![InstanceMetadata::default()],
        }]));

        let orchestrator = ConformanceOrchestratorBuilder::new()
            .measurements(Arc::new(store))
            .timepoints(Arc::new(timepoints))
            .metadata(metadata.clone())
            .metadata_cache(MetadataCacheConfig::default())
            .build()
            .unwrap();

        let criteria = TrialCriteriaType::new("recist");
        orchestrator.validate(&criteria).await.unwrap();
        orchestrator.validate(&criteria).await.unwrap();

        assert_eq!(metadata.retrievals(), 1);
    }
}
