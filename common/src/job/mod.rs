// Job definitions, the job registry and the step engine

pub mod chunk;
pub mod executor;
pub mod io;
pub mod step;

pub use chunk::{
    ChunkStep, ItemProcessor, ItemReader, ItemReaderFactory, ItemWriter, PassThroughItemProcessor,
    RetryingItemWriter,
};
pub use executor::JobExecutor;
pub use io::{FileLineReaderFactory, LineItemWriter, ListItemReaderFactory};
pub use step::{execute_step, FnTasklet, RepeatStatus, Step, StepContext, Tasklet, TaskletStep};

use crate::errors::JobDefinitionError;
use std::collections::HashMap;
use std::sync::Arc;

/// A named, ordered list of steps
pub struct Job {
    name: String,
    steps: Vec<Step>,
}

impl Job {
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("steps", &self.steps.iter().map(Step::name).collect::<Vec<_>>())
            .finish()
    }
}

pub struct JobBuilder {
    name: String,
    steps: Vec<Step>,
}

impl JobBuilder {
    pub fn step(mut self, step: impl Into<Step>) -> Self {
        self.steps.push(step.into());
        self
    }

    pub fn build(self) -> Result<Job, JobDefinitionError> {
        step::ensure_name(&self.name)?;
        if self.steps.is_empty() {
            return Err(JobDefinitionError::NoSteps(self.name));
        }
        Ok(Job {
            name: self.name,
            steps: self.steps,
        })
    }
}

/// Static name-to-job lookup, filled once at startup
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: Job) -> Result<(), JobDefinitionError> {
        if self.jobs.contains_key(job.name()) {
            return Err(JobDefinitionError::DuplicateJob(job.name().to_string()));
        }
        self.jobs.insert(job.name().to_string(), Arc::new(job));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
