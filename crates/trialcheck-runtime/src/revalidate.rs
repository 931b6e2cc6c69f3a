//! Debounced re-validation.
//!
//! A background task watches the active criteria type and the measurement
//! store. Every change restarts the quiescence window; once the window
//! elapses with a change pending, one validation is started, provided the
//! measurements are ready and a criteria type is selected.
//!
//! Readiness is read when the window elapses. A readiness change on its own
//! does not start a run. The task also fires once at start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use trialcheck_core::TrialCriteriaType;

use crate::orchestrator::ConformanceOrchestrator;

/// Inputs the re-validation task reacts to.
pub struct RevalidationTriggers {
    /// The active criteria type, `None` while nothing is selected
    pub criteria: watch::Receiver<Option<TrialCriteriaType>>,

    /// Whether measurements have finished loading
    pub ready: watch::Receiver<bool>,
}

/// Handle to the background re-validation task.
///
/// Dropping the handle stops the task. Runs already started are left to
/// finish.
pub struct Revalidator {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Revalidator {
    /// Start watching. Must be called from within a tokio runtime.
    pub fn spawn(
        orchestrator: Arc<ConformanceOrchestrator>,
        triggers: RevalidationTriggers,
        debounce: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let changes = orchestrator.aggregator().measurement_store().changes();

        let task = tokio::spawn(watch_loop(
            orchestrator,
            triggers,
            changes,
            debounce,
            shutdown_rx,
        ));

        Self {
            shutdown: Some(shutdown),
            task,
        }
    }

    /// Stop watching and wait for the task to exit.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for Revalidator {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn watch_loop(
    orchestrator: Arc<ConformanceOrchestrator>,
    triggers: RevalidationTriggers,
    mut changes: watch::Receiver<u64>,
    debounce: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let RevalidationTriggers {
        mut criteria,
        ready,
    } = triggers;

    let window = time::sleep(debounce);
    tokio::pin!(window);

    let mut pending = true;
    let mut criteria_open = true;
    let mut changes_open = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            changed = criteria.changed(), if criteria_open => match changed {
                Ok(()) => {
                    pending = true;
                    window.as_mut().reset(Instant::now() + debounce);
                }
                Err(_) => criteria_open = false,
            },

            changed = changes.changed(), if changes_open => match changed {
                Ok(()) => {
                    pending = true;
                    window.as_mut().reset(Instant::now() + debounce);
                }
                Err(_) => changes_open = false,
            },

            () = &mut window, if pending => {
                pending = false;
                start_run(&orchestrator, &criteria, &ready);
            }
        }
    }

    tracing::debug!("Re-validation stopped");
}

fn start_run(
    orchestrator: &Arc<ConformanceOrchestrator>,
    criteria: &watch::Receiver<Option<TrialCriteriaType>>,
    ready: &watch::Receiver<bool>,
) {
    if !*ready.borrow() {
        tracing::debug!("Measurements not ready, skipping validation");
        return;
    }

    let Some(criteria) = criteria.borrow().clone() else {
        tracing::debug!("No criteria type selected, skipping validation");
        return;
    };

    let orchestrator = Arc::clone(orchestrator);
    tokio::spawn(async move {
        if let Err(e) = orchestrator.validate(&criteria).await {
            tracing::warn!(criteria = %criteria.id, error = %e, "Validation failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryMeasurementStore, InMemoryStudyMetadata, InMemoryTimepointRegistry};
    use crate::orchestrator::ConformanceOrchestratorBuilder;
    use trialcheck_core::{
        InstanceMetadata, Measurement, MeasurementKind, StudyMetadata, Timepoint, TimepointType,
    };

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn measurement(id: &str) -> Measurement {
        Measurement {
            id: id.to_string(),
            study_instance_uid: "S1".to_string(),
            timepoint_id: Some("T1".to_string()),
            tool_type: "bidirectional".to_string(),
            measurement_number: 1,
            data: serde_json::Value::Null,
        }
    }

    fn setup() -> (Arc<InMemoryMeasurementStore>, Arc<ConformanceOrchestrator>) {
        let store = Arc::new(InMemoryMeasurementStore::new());
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
        (store, Arc::new(orchestrator))
    }

    fn triggers(
        criteria: Option<&str>,
        ready: bool,
    ) -> (
        watch::Sender<Option<TrialCriteriaType>>,
        watch::Sender<bool>,
        RevalidationTriggers,
    ) {
        let (criteria_tx, criteria_rx) = watch::channel(criteria.map(TrialCriteriaType::new));
        let (ready_tx, ready_rx) = watch::channel(ready);
        (
            criteria_tx,
            ready_tx,
            RevalidationTriggers {
                criteria: criteria_rx,
                ready: ready_rx,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_run() {
        let (_store, orchestrator) = setup();
        let (_criteria, _ready, triggers) = triggers(Some("recist"), true);
        let _revalidator = Revalidator::spawn(orchestrator.clone(), triggers, DEBOUNCE);

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(orchestrator.runs_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_run() {
        let (store, orchestrator) = setup();
        let (_criteria, _ready, triggers) = triggers(Some("recist"), true);
        let _revalidator = Revalidator::spawn(orchestrator.clone(), triggers, DEBOUNCE);

        for i in 0..5 {
            store.add(MeasurementKind::Targets, measurement(&format!("M{i}")));
            time::sleep(Duration::from_millis(50)).await;
        }
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(orchestrator.runs_completed(), 1);
        assert_eq!(orchestrator.nonconformities().get().unwrap().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_restarts_window() {
        let (store, orchestrator) = setup();
        let (_criteria, _ready, triggers) = triggers(Some("recist"), true);
        let _revalidator = Revalidator::spawn(orchestrator.clone(), triggers, DEBOUNCE);

        time::sleep(Duration::from_millis(250)).await;
        store.add(MeasurementKind::Targets, measurement("M1"));

        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(orchestrator.runs_completed(), 0);

        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(orchestrator.runs_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_skips_run() {
        let (store, orchestrator) = setup();
        let (_criteria, ready, triggers) = triggers(Some("recist"), false);
        let _revalidator = Revalidator::spawn(orchestrator.clone(), triggers, DEBOUNCE);

        store.add(MeasurementKind::Targets, measurement("M1"));
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.runs_completed(), 0);

        // Readiness alone is not a trigger
        ready.send_replace(true);
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.runs_completed(), 0);

        store.add(MeasurementKind::Targets, measurement("M2"));
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.runs_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_criteria_change_triggers_run() {
        let (_store, orchestrator) = setup();
        let (criteria, _ready, triggers) = triggers(None, true);
        let _revalidator = Revalidator::spawn(orchestrator.clone(), triggers, DEBOUNCE);

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.runs_completed(), 0);

        criteria.send_replace(Some(TrialCriteriaType::new("irRC")));
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.runs_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_watching() {
        let (store, orchestrator) = setup();
        let (_criteria, _ready, triggers) = triggers(Some("recist"), true);
        let revalidator = Revalidator::spawn(orchestrator.clone(), triggers, DEBOUNCE);

        time::sleep(Duration::from_secs(1)).await;
        revalidator.shutdown().await;

        store.add(MeasurementKind::Targets, measurement("M1"));
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orchestrator.runs_completed(), 1);
    }
}
