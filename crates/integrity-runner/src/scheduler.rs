//! Task scheduler - fires task definitions against the shared worker pool.
//!
//! Every firing becomes an independent invocation with its own id, result
//! sink and aggregator. Invocations of the same definition may overlap; they
//! share nothing but the work queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use integrity_core::{DefinitionId, InvocationId, Report, Task, TaskDefinition};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::aggregator::{aggregate, AggregateError};
use crate::dispatcher::{dispatch, DispatchError};
use crate::pool::WorkQueue;
use crate::reporter::Reporter;
use crate::source::{DefinitionError, DefinitionSource};

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("task definition {id} failed to load: {source}")]
    Definition {
        id: DefinitionId,
        #[source]
        source: DefinitionError,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("schedule interval for definition {0} must be greater than zero")]
    InvalidInterval(DefinitionId),

    #[error("invocation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Scheduler settings.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Upper bound on how long an invocation waits for its results.
    pub aggregation_timeout: Option<Duration>,
}

/// Trigger handle of one registered definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerState {
    /// Period between firings.
    pub every: Duration,

    /// Number of invocations started.
    pub fired: u64,

    /// Most recent invocation, if any.
    pub last_invocation: Option<InvocationId>,
}

/// A running invocation.
pub struct Invocation {
    pub id: InvocationId,
    pub definition_id: DefinitionId,
    handle: JoinHandle<Result<Report, AggregateError>>,
}

impl Invocation {
    /// Wait for the invocation's report. It has already been handed to the reporter.
    pub async fn join(self) -> Result<Report, SchedulerError> {
        Ok(self.handle.await??)
    }
}

/// Fires task definitions and tracks their invocations.
pub struct Scheduler {
    queue: WorkQueue,
    source: Arc<dyn DefinitionSource>,
    reporter: Arc<dyn Reporter>,
    config: SchedulerConfig,
    next_invocation: AtomicU64,
    triggers: RwLock<HashMap<DefinitionId, TriggerState>>,
    in_flight: TaskTracker,
}

impl Scheduler {
    /// Create a new Scheduler.
    pub fn new(
        queue: WorkQueue,
        source: Arc<dyn DefinitionSource>,
        reporter: Arc<dyn Reporter>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            source,
            reporter,
            config,
            next_invocation: AtomicU64::new(1),
            triggers: RwLock::new(HashMap::new()),
            in_flight: TaskTracker::new(),
        }
    }

    /// Schedule `id` to fire every `every`.
    pub async fn register(&self, id: DefinitionId, every: Duration) -> Result<(), SchedulerError> {
        if every.is_zero() {
            return Err(SchedulerError::InvalidInterval(id));
        }

        let mut triggers = self.triggers.write().await;
        triggers.insert(
            id,
            TriggerState {
                every,
                fired: 0,
                last_invocation: None,
            },
        );
        info!(definition_id = %id, every_secs = every.as_secs_f64(), "Registered task definition");
        Ok(())
    }

    /// Registered definition ids, ascending.
    pub async fn definitions(&self) -> Vec<DefinitionId> {
        let mut ids: Vec<_> = self.triggers.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Trigger handle of `id`.
    pub async fn trigger_state(&self, id: DefinitionId) -> Option<TriggerState> {
        self.triggers.read().await.get(&id).cloned()
    }

    /// Number of invocations whose reports are not yet out.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Load definition `id` and start an invocation of it.
    pub async fn trigger(&self, id: DefinitionId) -> Result<Invocation, SchedulerError> {
        let definition = self
            .source
            .load(id)
            .await
            .map_err(|source| SchedulerError::Definition { id, source })?;
        self.run_task(id, definition).await
    }

    /// Start an invocation of an already loaded definition.
    ///
    /// Returns once every work item is queued; aggregation and reporting
    /// continue in the background.
    pub async fn run_task(
        &self,
        id: DefinitionId,
        definition: TaskDefinition,
    ) -> Result<Invocation, SchedulerError> {
        let task = Task::new(self.allocate_invocation_id(), id, definition);
        self.record_firing(id, task.id).await;

        info!(
            definition_id = %id,
            invocation_id = %task.id,
            targets = task.targets.len(),
            tests = task.tests.len(),
            "Running task"
        );

        let dispatched = dispatch(&task, &self.queue).await?;

        let reporter = self.reporter.clone();
        let deadline = self.config.aggregation_timeout;
        let invocation_id = task.id;
        let handle = self.in_flight.spawn(async move {
            match aggregate(dispatched, deadline).await {
                Ok(report) => {
                    reporter.report(&report).await;
                    Ok(report)
                }
                Err(e) => {
                    error!(
                        definition_id = %id,
                        invocation_id = %invocation_id,
                        error = %e,
                        "Task aggregation failed"
                    );
                    Err(e)
                }
            }
        });

        Ok(Invocation {
            id: task.id,
            definition_id: id,
            handle,
        })
    }

    /// Fire every registered definition once and wait for all reports.
    pub async fn run_once(&self) -> Vec<(DefinitionId, Result<Report, SchedulerError>)> {
        let mut invocations = Vec::new();
        for id in self.definitions().await {
            invocations.push((id, self.trigger(id).await));
        }

        let mut reports = Vec::with_capacity(invocations.len());
        for (id, invocation) in invocations {
            let report = match invocation {
                Ok(invocation) => invocation.join().await,
                Err(e) => Err(e),
            };
            reports.push((id, report));
        }
        reports
    }

    /// Fire registered definitions on their schedules until `cancel` fires,
    /// then wait for in-flight invocations to report.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let slots: Vec<_> = self
            .triggers
            .read()
            .await
            .iter()
            .map(|(id, state)| (*id, state.every))
            .collect();

        info!(definitions = slots.len(), "Scheduler started");

        let mut loops = JoinSet::new();
        for (id, every) in slots {
            let scheduler = self.clone();
            let cancel = cancel.clone();
            loops.spawn(async move { scheduler.run_slot(id, every, cancel).await });
        }
        while loops.join_next().await.is_some() {}

        info!(in_flight = self.in_flight(), "Scheduler stopping, waiting for in-flight tasks");
        self.drain().await;
        info!("Scheduler stopped");
    }

    /// Wait until every started invocation has reported.
    pub async fn drain(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
        self.in_flight.reopen();
    }

    async fn run_slot(&self, id: DefinitionId, every: Duration, cancel: CancellationToken) {
        // First firing after one full period.
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Dispatch may wait on a full work queue; shutdown must not.
                    match cancel.run_until_cancelled(self.trigger(id)).await {
                        Some(Ok(invocation)) => {
                            debug!(
                                definition_id = %id,
                                invocation_id = %invocation.id,
                                "Task triggered"
                            );
                        }
                        Some(Err(e)) => {
                            error!(definition_id = %id, error = %e, "Failed to trigger task");
                        }
                        None => {
                            debug!(definition_id = %id, "Schedule slot cancelled during dispatch, exiting");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!(definition_id = %id, "Schedule slot received shutdown signal, exiting");
                    break;
                }
            }
        }
    }

    fn allocate_invocation_id(&self) -> InvocationId {
        InvocationId::new(self.next_invocation.fetch_add(1, Ordering::Relaxed))
    }

    async fn record_firing(&self, id: DefinitionId, invocation: InvocationId) {
        let mut triggers = self.triggers.write().await;
        if let Some(state) = triggers.get_mut(&id) {
            state.fired += 1;
            state.last_invocation = Some(invocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use integrity_core::Completion;

    use std::sync::atomic::AtomicUsize;

    use crate::pool::{work_queue, WorkerPool};
    use crate::probe::{ProbeError, ProbeOutcome, Prober};
    use crate::source::StaticDefinitionSource;

    /// Never answers.
    struct StalledProber;

    #[async_trait]
    impl Prober for StalledProber {
        async fn probe(&self, _path: &str, _target: &str) -> Result<ProbeOutcome, ProbeError> {
            std::future::pending().await
        }
    }

    /// Fails the first load, then serves `definition`.
    struct FlakySource {
        loads: AtomicUsize,
        definition: TaskDefinition,
    }

    #[async_trait]
    impl DefinitionSource for FlakySource {
        async fn load(&self, id: DefinitionId) -> Result<TaskDefinition, DefinitionError> {
            if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(DefinitionError::UnknownDefinition(id));
            }
            Ok(self.definition.clone())
        }
    }

    /// Passes target "a", times out everything else after a short delay.
    struct FakeProber;

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, _path: &str, target: &str) -> Result<ProbeOutcome, ProbeError> {
            tokio::time::sleep(Duration::from_millis(target.len() as u64)).await;
            if target == "a" {
                Ok(ProbeOutcome::new(true, "ok"))
            } else {
                Ok(ProbeOutcome::new(false, "timeout"))
            }
        }
    }

    #[derive(Default)]
    struct CollectingReporter {
        reports: Mutex<Vec<Report>>,
    }

    impl CollectingReporter {
        fn reports(&self) -> Vec<Report> {
            self.reports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Reporter for CollectingReporter {
        async fn report(&self, report: &Report) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    fn definition(targets: &[&str]) -> TaskDefinition {
        targets
            .iter()
            .fold(TaskDefinition::new(), |def, t| def.with_target(*t))
            .with_test("ping", "http://x/%s")
    }

    fn setup(
        source: StaticDefinitionSource,
        workers: usize,
    ) -> (Arc<Scheduler>, WorkerPool, Arc<CollectingReporter>) {
        let (queue, receiver) = work_queue(8).unwrap();
        let pool = WorkerPool::start(workers, receiver, Arc::new(FakeProber)).unwrap();
        let reporter = Arc::new(CollectingReporter::default());
        let scheduler = Scheduler::new(
            queue,
            Arc::new(source),
            reporter.clone(),
            SchedulerConfig::default(),
        );
        (Arc::new(scheduler), pool, reporter)
    }

    #[tokio::test]
    async fn test_end_to_end_report() {
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), definition(&["a", "b"]));
        let (scheduler, pool, reporter) = setup(source, 5);

        let invocation = scheduler.trigger(DefinitionId::new(1)).await.unwrap();
        let report = invocation.join().await.unwrap();

        assert_eq!(report.completion, Completion::Complete);
        assert_eq!(report.results.len(), 2);
        for r in &report.results {
            match r.target.as_str() {
                "a" => assert!(r.result && r.note == "ok"),
                "b" => assert!(!r.result && r.note == "timeout"),
                other => panic!("unexpected target {other}"),
            }
        }
        assert_eq!(reporter.reports(), vec![report]);

        drop(scheduler);
        pool.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_definitions_do_not_mix() {
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), definition(&["a", "bb", "ccc"]))
            .with_definition(DefinitionId::new(2), definition(&["dddd", "a"]));
        let (scheduler, _pool, _reporter) = setup(source, 3);

        let first = scheduler.trigger(DefinitionId::new(1)).await.unwrap();
        let second = scheduler.trigger(DefinitionId::new(2)).await.unwrap();
        assert_ne!(first.id, second.id);
        let (first_id, second_id) = (first.id, second.id);

        let first = first.join().await.unwrap();
        let second = second.join().await.unwrap();

        assert_eq!(first.results.len(), 3);
        assert_eq!(second.results.len(), 2);
        assert!(first.results.iter().all(|r| r.task_id == first_id));
        assert!(second.results.iter().all(|r| r.task_id == second_id));
        assert_eq!(second.definition_id, DefinitionId::new(2));
    }

    #[tokio::test]
    async fn test_overlapping_invocations_of_one_definition() {
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), definition(&["a", "b"]));
        let (scheduler, _pool, reporter) = setup(source, 2);
        scheduler
            .register(DefinitionId::new(1), Duration::from_secs(10))
            .await
            .unwrap();

        let invocations = vec![
            scheduler.trigger(DefinitionId::new(1)).await.unwrap(),
            scheduler.trigger(DefinitionId::new(1)).await.unwrap(),
            scheduler.trigger(DefinitionId::new(1)).await.unwrap(),
        ];
        let ids: HashSet<_> = invocations.iter().map(|i| i.id).collect();
        assert_eq!(ids.len(), 3);

        for invocation in invocations {
            let id = invocation.id;
            let report = invocation.join().await.unwrap();
            assert_eq!(report.task_id, id);
            assert_eq!(report.results.len(), 2);
        }
        assert_eq!(reporter.reports().len(), 3);

        let state = scheduler.trigger_state(DefinitionId::new(1)).await.unwrap();
        assert_eq!(state.fired, 3);
        assert_eq!(state.last_invocation, Some(InvocationId::new(3)));
    }

    #[tokio::test]
    async fn test_empty_definition_reports_immediately() {
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), TaskDefinition::new().with_target("a"));
        let (scheduler, _pool, reporter) = setup(source, 1);

        let report = scheduler
            .trigger(DefinitionId::new(1))
            .await
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(report.completion, Completion::Complete);
        assert!(report.results.is_empty());
        assert_eq!(reporter.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_load_failure_is_returned_to_caller() {
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), definition(&["a"]));
        let (scheduler, _pool, reporter) = setup(source, 1);

        let err = scheduler.trigger(DefinitionId::new(9)).await.err().unwrap();
        assert!(matches!(
            err,
            SchedulerError::Definition {
                source: DefinitionError::UnknownDefinition(_),
                ..
            }
        ));

        // Other definitions keep working.
        let report = scheduler
            .trigger(DefinitionId::new(1))
            .await
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(reporter.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_when_pool_gone() {
        let (queue, receiver) = work_queue(1).unwrap();
        drop(receiver);
        let scheduler = Scheduler::new(
            queue,
            Arc::new(StaticDefinitionSource::new()),
            Arc::new(CollectingReporter::default()),
            SchedulerConfig::default(),
        );

        let err = scheduler
            .run_task(DefinitionId::new(1), definition(&["a"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SchedulerError::Dispatch(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_zero_interval() {
        let (scheduler, _pool, _reporter) = setup(StaticDefinitionSource::new(), 1);

        let err = scheduler
            .register(DefinitionId::new(1), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInterval(_)));
        assert!(scheduler.definitions().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_once() {
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), definition(&["a"]))
            .with_definition(DefinitionId::new(2), definition(&["a", "b"]));
        let (scheduler, _pool, reporter) = setup(source, 2);
        for id in [1, 2, 3] {
            scheduler
                .register(DefinitionId::new(id), Duration::from_secs(10))
                .await
                .unwrap();
        }

        let outcomes = scheduler.run_once().await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].1.as_ref().unwrap().results.len(), 1);
        assert_eq!(outcomes[1].1.as_ref().unwrap().results.len(), 2);
        assert!(outcomes[2].1.is_err());
        assert_eq!(reporter.reports().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_run_until_cancelled() {
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), definition(&["a", "b"]))
            .with_definition(DefinitionId::new(2), definition(&["a"]));
        let (scheduler, pool, reporter) = setup(source, 5);
        for id in [1, 2] {
            scheduler
                .register(DefinitionId::new(id), Duration::from_secs(10))
                .await
                .unwrap();
        }

        let cancel = CancellationToken::new();
        let running = tokio::spawn(scheduler.clone().run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        running.await.unwrap();

        for id in [1, 2] {
            let state = scheduler.trigger_state(DefinitionId::new(id)).await.unwrap();
            assert_eq!(state.fired, 2);
        }
        let reports = reporter.reports();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.completion == Completion::Complete));
        assert_eq!(scheduler.in_flight(), 0);

        drop(scheduler);
        let processed = pool.join().await.unwrap();
        assert_eq!(processed.iter().sum::<usize>(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_run_survives_load_failure() {
        let (queue, receiver) = work_queue(8).unwrap();
        let _pool = WorkerPool::start(2, receiver, Arc::new(FakeProber)).unwrap();
        let reporter = Arc::new(CollectingReporter::default());
        let source = FlakySource {
            loads: AtomicUsize::new(0),
            definition: definition(&["a", "b"]),
        };
        let scheduler = Arc::new(Scheduler::new(
            queue,
            Arc::new(source),
            reporter.clone(),
            SchedulerConfig::default(),
        ));
        scheduler
            .register(DefinitionId::new(1), Duration::from_secs(10))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let running = tokio::spawn(scheduler.clone().run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        running.await.unwrap();

        let state = scheduler.trigger_state(DefinitionId::new(1)).await.unwrap();
        assert_eq!(state.fired, 1);
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_blocked_dispatch() {
        let (queue, receiver) = work_queue(1).unwrap();
        let _pool = WorkerPool::start(1, receiver, Arc::new(StalledProber)).unwrap();
        let reporter = Arc::new(CollectingReporter::default());
        let source = StaticDefinitionSource::new()
            .with_definition(DefinitionId::new(1), definition(&["a", "b", "c", "d", "e"]));
        let scheduler = Arc::new(Scheduler::new(
            queue,
            Arc::new(source),
            reporter.clone(),
            SchedulerConfig::default(),
        ));
        scheduler
            .register(DefinitionId::new(1), Duration::from_secs(10))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let running = tokio::spawn(scheduler.clone().run(cancel.clone()));

        // Fires at 10 s and stays blocked on the full queue.
        tokio::time::sleep(Duration::from_secs(15)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("scheduler did not stop while dispatch was blocked")
            .unwrap();

        let state = scheduler.trigger_state(DefinitionId::new(1)).await.unwrap();
        assert_eq!(state.fired, 1);
        assert!(reporter.reports().is_empty());
        assert_eq!(scheduler.in_flight(), 0);
    }
}
