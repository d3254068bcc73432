// Step definitions: a step is either a tasklet or a chunk-oriented loop

use crate::errors::{JobDefinitionError, StepExecutionError};
use crate::job::chunk::ChunkStep;
use crate::models::{JobExecution, JobParameters, StepExecution};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// What a tasklet wants to happen after one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatStatus {
    Continue,
    Finished,
}

/// Read-only view of the running execution handed to tasklets and readers
#[derive(Debug, Clone)]
pub struct StepContext {
    pub execution_id: Uuid,
    pub job_name: String,
    pub step_name: String,
    parameters: JobParameters,
}

impl StepContext {
    pub fn new(execution: &JobExecution, step_name: impl Into<String>) -> Self {
        Self {
            execution_id: execution.id,
            job_name: execution.job_name.clone(),
            step_name: step_name.into(),
            parameters: execution.parameters.clone(),
        }
    }

    pub fn parameters(&self) -> &JobParameters {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key)
    }

    pub fn require_parameter(&self, key: &str) -> Result<&str, StepExecutionError> {
        self.parameters
            .get(key)
            .ok_or_else(|| StepExecutionError::MissingParameter(key.to_string()))
    }
}

/// A single unit of work run inside a tasklet step
#[async_trait]
pub trait Tasklet: Send + Sync {
    async fn execute(&self, context: &StepContext) -> Result<RepeatStatus, StepExecutionError>;
}

/// Adapts a plain closure into a tasklet
pub struct FnTasklet<F>(F);

impl<F> FnTasklet<F>
where
    F: Fn(&StepContext) -> Result<RepeatStatus, StepExecutionError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Tasklet for FnTasklet<F>
where
    F: Fn(&StepContext) -> Result<RepeatStatus, StepExecutionError> + Send + Sync,
{
    async fn execute(&self, context: &StepContext) -> Result<RepeatStatus, StepExecutionError> {
        (self.0)(context)
    }
}

pub struct TaskletStep {
    name: String,
    tasklet: Arc<dyn Tasklet>,
}

impl TaskletStep {
    pub fn new(name: impl Into<String>, tasklet: Arc<dyn Tasklet>) -> Self {
        Self {
            name: name.into(),
            tasklet,
        }
    }

    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&StepContext) -> Result<RepeatStatus, StepExecutionError> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(FnTasklet::new(f)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the tasklet until it reports `Finished`. Each invocation counts as one commit.
    pub async fn run(
        &self,
        context: &StepContext,
        stats: &mut StepExecution,
    ) -> Result<(), StepExecutionError> {
        loop {
            let status = self.tasklet.execute(context).await?;
            stats.commit_count += 1;
            match status {
                RepeatStatus::Finished => return Ok(()),
                RepeatStatus::Continue => {
                    debug!(step_name = %self.name, invocations = stats.commit_count, "Tasklet asked to continue");
                }
            }
        }
    }
}

/// One stage of a job
pub enum Step {
    Tasklet(TaskletStep),
    Chunk(ChunkStep),
}

impl Step {
    pub fn tasklet(name: impl Into<String>, tasklet: Arc<dyn Tasklet>) -> Self {
        Step::Tasklet(TaskletStep::new(name, tasklet))
    }

    pub fn name(&self) -> &str {
        match self {
            Step::Tasklet(step) => step.name(),
            Step::Chunk(step) => step.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::Tasklet(_) => "tasklet",
            Step::Chunk(_) => "chunk",
        }
    }
}

impl From<TaskletStep> for Step {
    fn from(step: TaskletStep) -> Self {
        Step::Tasklet(step)
    }
}

impl From<ChunkStep> for Step {
    fn from(step: ChunkStep) -> Self {
        Step::Chunk(step)
    }
}

/// Run one step of an execution, dispatching on its kind
pub async fn execute_step(
    step: &Step,
    context: &StepContext,
    stats: &mut StepExecution,
) -> Result<(), StepExecutionError> {
    match step {
        Step::Tasklet(tasklet) => tasklet.run(context, stats).await,
        Step::Chunk(chunk) => chunk.run(context, stats).await,
    }
}

pub(crate) fn ensure_name(name: &str) -> Result<(), JobDefinitionError> {
    if name.trim().is_empty() {
        return Err(JobDefinitionError::EmptyName);
    }
    Ok(())
}
