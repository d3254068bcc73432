// Launch gateway: admits launch requests and runs each execution on its own task

use crate::errors::LaunchError;
use crate::history::ExecutionHistory;
use crate::job::{JobExecutor, JobRegistry};
use crate::models::{CompletionRecord, JobExecution, JobLaunchRequest};
use crate::telemetry;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Receives one record per terminal execution
#[async_trait]
pub trait CompletionListener: Send + Sync {
    async fn on_complete(&self, record: &CompletionRecord);
}

/// Writes completion records to the log at INFO
#[derive(Debug, Default)]
pub struct LogCompletionListener;

#[async_trait]
impl CompletionListener for LogCompletionListener {
    async fn on_complete(&self, record: &CompletionRecord) {
        info!(
            execution_id = %record.execution_id,
            job_name = %record.job_name,
            parameters = %record.parameters,
            status = %record.status,
            duration_ms = record.duration_ms,
            "Job execution finished"
        );
    }
}

/// Caller-side view of an admitted execution
#[derive(Clone)]
pub struct JobExecutionHandle {
    id: Uuid,
    state: watch::Receiver<JobExecution>,
}

impl JobExecutionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest known state. RUNNING until the execution reaches a terminal status.
    pub fn snapshot(&self) -> JobExecution {
        self.state.borrow().clone()
    }

    /// Resolve once the execution is COMPLETED or FAILED
    pub async fn wait(mut self) -> JobExecution {
        if let Ok(done) = self.state.wait_for(|e| e.status.is_terminal()).await {
            return done.clone();
        }
        self.state.borrow().clone()
    }
}

pub struct LaunchGateway {
    registry: Arc<JobRegistry>,
    executor: Arc<JobExecutor>,
    history: Arc<dyn ExecutionHistory>,
    permits: Arc<Semaphore>,
    listeners: Arc<Vec<Arc<dyn CompletionListener>>>,
    accepting: AtomicBool,
    tasks: Mutex<JoinSet<()>>,
}

impl LaunchGateway {
    /// Gateway running at most `max_concurrent` executions at once, logging completions
    pub fn new(
        registry: Arc<JobRegistry>,
        history: Arc<dyn ExecutionHistory>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            registry,
            executor: Arc::new(JobExecutor::new(Arc::clone(&history))),
            history,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            listeners: Arc::new(vec![Arc::new(LogCompletionListener) as Arc<dyn CompletionListener>]),
            accepting: AtomicBool::new(true),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Add a completion listener; must be called before the first launch
    pub fn with_listener(mut self, listener: Arc<dyn CompletionListener>) -> Self {
        let mut listeners: Vec<_> = self.listeners.iter().cloned().collect();
        listeners.push(listener);
        self.listeners = Arc::new(listeners);
        self
    }

    /// Admit a launch request and return without waiting for the job to run.
    ///
    /// Fails without spawning anything when the job is unknown, the gateway
    /// is shutting down, or the RUNNING execution cannot be recorded in
    /// history. The task set is locked only around the final admission check
    /// and the spawn, so concurrent launches write history in parallel.
    #[instrument(skip(self, request), fields(job_name = %request.job_name))]
    pub async fn launch(&self, request: JobLaunchRequest) -> Result<JobExecutionHandle, LaunchError> {
        let job = self
            .registry
            .get(&request.job_name)
            .ok_or_else(|| LaunchError::UnknownJob(request.job_name.clone()))?;
        if !self.is_accepting() {
            return Err(LaunchError::ShuttingDown);
        }

        let mut execution = JobExecution::start(job.name(), request.parameters);
        self.history.create(&execution).await?;

        let id = execution.id;
        let (tx, rx) = watch::channel(execution.clone());
        let executor = Arc::clone(&self.executor);
        let permits = Arc::clone(&self.permits);
        let listeners = Arc::clone(&self.listeners);

        let mut tasks = self.tasks.lock().await;
        // Shutdown may have started while history was being written
        if !self.is_accepting() {
            drop(tasks);
            execution.fail("Launch gateway shut down before the execution started");
            if let Err(e) = self.history.update(&execution).await {
                error!(execution_id = %id, error = %e, "Failed to record rejected execution");
            }
            return Err(LaunchError::ShuttingDown);
        }

        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            let finished = executor.run(&job, execution).await;

            let record = CompletionRecord::from(&finished);
            telemetry::record_job_outcome(&record.job_name, record.status, record.duration_ms);
            for listener in listeners.iter() {
                listener.on_complete(&record).await;
            }
            tx.send_replace(finished);
        });

        // Reap finished tasks so the set only tracks in-flight work
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Execution task aborted");
            }
        }
        let in_flight = tasks.len();
        drop(tasks);

        info!(execution_id = %id, in_flight, "Job execution admitted");
        Ok(JobExecutionHandle { id, state: rx })
    }

    /// Stop admitting new launches and wait for in-flight executions to finish
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        // Later launches see the flag under the lock and never reach this set
        let mut draining = std::mem::take(&mut *self.tasks.lock().await);
        info!(in_flight = draining.len(), "Launch gateway draining");

        while let Some(result) = draining.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Execution task aborted");
            }
        }
        info!("Launch gateway drained");
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{DatabaseError, StepExecutionError};
    use crate::history::{InMemoryExecutionHistory, MockExecutionHistory};
    use crate::job::{Job, RepeatStatus, StepContext, Tasklet, TaskletStep};
    use crate::models::{ExecutionStatus, JobParameters};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Tasklet that blocks until the test hands out a permit
    struct GatedTasklet {
        started: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl Tasklet for GatedTasklet {
        async fn execute(&self, _context: &StepContext) -> Result<RepeatStatus, StepExecutionError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StepExecutionError::Tasklet(e.to_string()))?;
            permit.forget();
            Ok(RepeatStatus::Finished)
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        records: std::sync::Mutex<Vec<CompletionRecord>>,
    }

    #[async_trait]
    impl CompletionListener for RecordingListener {
        async fn on_complete(&self, record: &CompletionRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    /// History whose first `create` blocks until the test opens the gate
    struct GatedHistory {
        inner: InMemoryExecutionHistory,
        gate: Semaphore,
        first: AtomicBool,
    }

    impl GatedHistory {
        fn new() -> Self {
            Self {
                inner: InMemoryExecutionHistory::new(),
                gate: Semaphore::new(0),
                first: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl ExecutionHistory for GatedHistory {
        async fn create(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
            if self.first.swap(false, Ordering::SeqCst) {
                self.gate.acquire().await.unwrap().forget();
            }
            self.inner.create(execution).await
        }

        async fn update(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
            self.inner.update(execution).await
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, DatabaseError> {
            self.inner.find_by_id(id).await
        }
    }

    fn registry_with(job: Job) -> Arc<JobRegistry> {
        let mut registry = JobRegistry::new();
        registry.register(job).unwrap();
        Arc::new(registry)
    }

    fn gated_job(started: &Arc<AtomicUsize>, gate: &Arc<Semaphore>) -> Job {
        Job::builder("gatedJob")
            .step(TaskletStep::new(
                "wait",
                Arc::new(GatedTasklet {
                    started: Arc::clone(started),
                    gate: Arc::clone(gate),
                }),
            ))
            .build()
            .unwrap()
    }

    fn quick_job() -> Job {
        Job::builder("quickJob")
            .step(TaskletStep::from_fn("only", |_| Ok(RepeatStatus::Finished)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_job_creates_nothing() {
        let history = Arc::new(InMemoryExecutionHistory::new());
        let gateway = LaunchGateway::new(registry_with(quick_job()), history.clone(), 4);

        let err = gateway
            .launch(JobLaunchRequest::new("missingJob", JobParameters::new()))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, LaunchError::UnknownJob(name) if name == "missingJob"));
        assert!(history.is_empty().await);
    }

    #[tokio::test]
    async fn test_launch_returns_before_completion() {
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let history = Arc::new(InMemoryExecutionHistory::new());
        let gateway = LaunchGateway::new(registry_with(gated_job(&started, &gate)), history.clone(), 4);

        let handle = gateway
            .launch(JobLaunchRequest::new("gatedJob", JobParameters::new()))
            .await
            .unwrap();

        assert_eq!(handle.snapshot().status, ExecutionStatus::Running);
        let stored = history.find_by_id(handle.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);

        gate.add_permits(1);
        let finished = handle.wait().await;
        assert_eq!(finished.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_history_failure_at_admission() {
        let mut history = MockExecutionHistory::new();
        history
            .expect_create()
            .returning(|_| Err(DatabaseError::ConnectionFailed("down".to_string())));
        history.expect_update().never();

        let gateway = LaunchGateway::new(registry_with(quick_job()), Arc::new(history), 4);
        let err = gateway
            .launch(JobLaunchRequest::new("quickJob", JobParameters::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LaunchError::History(_)));
    }

    #[tokio::test]
    async fn test_listener_receives_completion() {
        let listener = Arc::new(RecordingListener::default());
        let gateway = LaunchGateway::new(
            registry_with(quick_job()),
            Arc::new(InMemoryExecutionHistory::new()),
            4,
        )
        .with_listener(listener.clone());

        let params = JobParameters::new().with("file_path", "/tmp/in.txt");
        let handle = gateway
            .launch(JobLaunchRequest::new("quickJob", params.clone()))
            .await
            .unwrap();
        let id = handle.id();
        handle.wait().await;
        gateway.shutdown().await;

        let records = listener.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].execution_id, id);
        assert_eq!(records[0].parameters, params);
        assert_eq!(records[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrency_limit_queues_executions() {
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let gateway = LaunchGateway::new(
            registry_with(gated_job(&started, &gate)),
            Arc::new(InMemoryExecutionHistory::new()),
            1,
        );

        let first = gateway
            .launch(JobLaunchRequest::new("gatedJob", JobParameters::new()))
            .await
            .unwrap();
        let second = gateway
            .launch(JobLaunchRequest::new("gatedJob", JobParameters::new()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(second.snapshot().status, ExecutionStatus::Running);

        gate.add_permits(2);
        assert_eq!(first.wait().await.status, ExecutionStatus::Completed);
        assert_eq!(second.wait().await.status, ExecutionStatus::Completed);
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects() {
        let started = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let gateway = Arc::new(LaunchGateway::new(
            registry_with(gated_job(&started, &gate)),
            Arc::new(InMemoryExecutionHistory::new()),
            4,
        ));

        let handle = gateway
            .launch(JobLaunchRequest::new("gatedJob", JobParameters::new()))
            .await
            .unwrap();

        let draining = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!gateway.is_accepting());
        assert!(!draining.is_finished());

        gate.add_permits(1);
        draining.await.unwrap();
        assert_eq!(handle.snapshot().status, ExecutionStatus::Completed);

        let err = gateway
            .launch(JobLaunchRequest::new("gatedJob", JobParameters::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LaunchError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_slow_history_write_does_not_block_other_launches() {
        let history = Arc::new(GatedHistory::new());
        let gateway = Arc::new(LaunchGateway::new(registry_with(quick_job()), history.clone(), 4));

        let slow = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                gateway
                    .launch(JobLaunchRequest::new("quickJob", JobParameters::new()))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!slow.is_finished());

        let fast = tokio::time::timeout(
            Duration::from_secs(1),
            gateway.launch(JobLaunchRequest::new("quickJob", JobParameters::new())),
        )
        .await
        .expect("second launch waited on the first history write")
        .unwrap();
        assert_eq!(fast.wait().await.status, ExecutionStatus::Completed);

        history.gate.add_permits(1);
        let slow = slow.await.unwrap().unwrap();
        assert_eq!(slow.wait().await.status, ExecutionStatus::Completed);
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_during_admission_rejects_recorded_execution() {
        let history = Arc::new(GatedHistory::new());
        let gateway = Arc::new(LaunchGateway::new(registry_with(quick_job()), history.clone(), 4));

        let pending = {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                gateway
                    .launch(JobLaunchRequest::new("quickJob", JobParameters::new()))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Draining does not wait for the launch stuck in its history write
        tokio::time::timeout(Duration::from_secs(1), gateway.shutdown())
            .await
            .expect("shutdown blocked on an in-progress launch");

        history.gate.add_permits(1);
        let err = pending.await.unwrap().err().unwrap();
        assert!(matches!(err, LaunchError::ShuttingDown));

        let recorded = history.inner.find_by_job("quickJob").await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].status, ExecutionStatus::Failed);
    }
}
