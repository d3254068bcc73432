// Job executor: runs the steps of one execution in order and records progress

use crate::errors::StepExecutionError;
use crate::history::ExecutionHistory;
use crate::job::step::{execute_step, StepContext};
use crate::job::Job;
use crate::models::{JobExecution, JobParameters, StepExecution};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub struct JobExecutor {
    history: Arc<dyn ExecutionHistory>,
}

impl JobExecutor {
    pub fn new(history: Arc<dyn ExecutionHistory>) -> Self {
        Self { history }
    }

    /// Create and run a fresh execution of `job`, returning it in a terminal state
    pub async fn execute(&self, job: &Job, parameters: JobParameters) -> JobExecution {
        let execution = JobExecution::start(job.name(), parameters);
        if let Err(e) = self.history.create(&execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to record new execution");
        }
        self.run(job, execution).await
    }

    /// Run every step of an already admitted execution.
    ///
    /// Steps run strictly in declaration order. The first failing step ends
    /// the execution as FAILED and later steps never start. History write
    /// failures are logged and do not affect the outcome.
    #[instrument(skip(self, job, execution), fields(
        execution_id = %execution.id,
        job_name = %execution.job_name,
    ))]
    pub async fn run(&self, job: &Job, mut execution: JobExecution) -> JobExecution {
        info!(parameters = %execution.parameters, "Job execution started");

        for step in job.steps() {
            execution.current_step = Some(step.name().to_string());
            self.persist(&execution).await;

            let context = StepContext::new(&execution, step.name());
            let mut stats = StepExecution::start(step.name());

            let outcome = AssertUnwindSafe(execute_step(step, &context, &mut stats))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(StepExecutionError::Panicked(panic_message(panic))));

            match outcome {
                Ok(()) => {
                    stats.complete();
                    info!(
                        step_name = %step.name(),
                        step_kind = step.kind(),
                        read_count = stats.read_count,
                        write_count = stats.write_count,
                        commit_count = stats.commit_count,
                        "Step completed"
                    );
                    execution.step_executions.push(stats);
                }
                Err(e) => {
                    warn!(step_name = %step.name(), error = %e, "Step failed");
                    stats.fail(e.to_string());
                    execution.step_executions.push(stats);
                    execution.fail(format!("Step '{}' failed: {}", step.name(), e));
                    self.persist(&execution).await;
                    error!(
                        status = %execution.status,
                        duration_ms = execution.duration_ms(),
                        "Job execution failed"
                    );
                    return execution;
                }
            }
        }

        execution.complete();
        self.persist(&execution).await;
        info!(
            status = %execution.status,
            duration_ms = execution.duration_ms(),
            "Job execution completed"
        );
        execution
    }

    async fn persist(&self, execution: &JobExecution) {
        if let Err(e) = self.history.update(execution).await {
            error!(execution_id = %execution.id, error = %e, "Failed to update execution history");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
