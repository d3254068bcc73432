// Built-in demonstration jobs

use crate::config::Settings;
use crate::errors::JobDefinitionError;
use crate::job::{
    ChunkStep, FileLineReaderFactory, ItemReaderFactory, ItemWriter, Job, JobRegistry,
    LineItemWriter, RepeatStatus, TaskletStep,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Default name of the line-printing job bound to the file trigger
pub const EXAMPLE_JOB: &str = "exampleJob";
/// Default name of the two-tasklet job bound to the record trigger
pub const DUMMY_JOB: &str = "dummyJob";

const EXAMPLE_CHUNK_SIZE: usize = 5;

/// Print every line of the file named by `parameter` to stdout, five lines
/// per chunk
pub fn example_job(job_name: &str, parameter: &str) -> Result<Job, JobDefinitionError> {
    example_job_with_writer(job_name, parameter, Arc::new(LineItemWriter::stdout()))
}

pub fn example_job_with_writer(
    job_name: &str,
    parameter: &str,
    writer: Arc<dyn ItemWriter<String>>,
) -> Result<Job, JobDefinitionError> {
    let reader: Arc<dyn ItemReaderFactory<String>> = Arc::new(FileLineReaderFactory::new(parameter));
    Job::builder(job_name)
        .step(ChunkStep::new("exampleStep", EXAMPLE_CHUNK_SIZE, reader, writer)?)
        .build()
}

/// A no-op step followed by one that logs the `parameter` value. A missing
/// value is logged, not treated as a failure.
pub fn dummy_job(job_name: &str, parameter: &str) -> Result<Job, JobDefinitionError> {
    let parameter = parameter.to_string();

    Job::builder(job_name)
        .step(TaskletStep::from_fn("dummyStep", |ctx| {
            info!(execution_id = %ctx.execution_id, "Dummy step executed");
            Ok(RepeatStatus::Finished)
        }))
        .step(TaskletStep::from_fn("extractStep", move |ctx| {
            match ctx.parameter(&parameter) {
                Some(end_date) => {
                    info!(execution_id = %ctx.execution_id, end_date, "Extract step received end date")
                }
                None => warn!(
                    execution_id = %ctx.execution_id,
                    parameter = %parameter,
                    "Extract step received no end date"
                ),
            }
            Ok(RepeatStatus::Finished)
        }))
        .build()
}

/// Registry holding both demonstration jobs, each under the job name and
/// parameter its trigger is bound to in `settings`
pub fn builtin_registry(settings: &Settings) -> Result<JobRegistry, JobDefinitionError> {
    let file = &settings.file_trigger;
    let record = &settings.record_trigger;

    let mut registry = JobRegistry::new();
    registry.register(example_job(&file.job_name, &file.parameter_name)?)?;
    registry.register(dummy_job(&record.job_name, &record.parameter_name)?)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryExecutionHistory;
    use crate::job::{JobExecutor, Step};
    use crate::models::{ExecutionStatus, JobParameters};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry(&Settings::default()).unwrap();
        assert_eq!(registry.names(), vec![DUMMY_JOB, EXAMPLE_JOB]);

        let example = registry.get(EXAMPLE_JOB).unwrap();
        match &example.steps()[0] {
            Step::Chunk(step) => assert_eq!(step.chunk_size(), 5),
            Step::Tasklet(_) => panic!("exampleStep should be a chunk step"),
        }
    }

    #[test]
    fn test_registry_follows_configured_job_names() {
        let mut settings = Settings::default();
        settings.file_trigger.job_name = "ingestJob".to_string();
        settings.record_trigger.job_name = "extractJob".to_string();

        let registry = builtin_registry(&settings).unwrap();
        assert_eq!(registry.names(), vec!["extractJob", "ingestJob"]);
        assert!(matches!(registry.get("ingestJob").unwrap().steps()[0], Step::Chunk(_)));
    }

    #[test]
    fn test_shared_job_name_is_rejected() {
        let mut settings = Settings::default();
        settings.record_trigger.job_name = EXAMPLE_JOB.to_string();
        assert!(matches!(
            builtin_registry(&settings),
            Err(JobDefinitionError::DuplicateJob(_))
        ));
    }

    #[tokio::test]
    async fn test_example_job_writes_every_line() {
        let mut file = NamedTempFile::new().unwrap();
        for i in 1..=7 {
            writeln!(file, "line {}", i).unwrap();
        }

        let writer = Arc::new(LineItemWriter::new(Vec::new()));
        let job = example_job_with_writer(EXAMPLE_JOB, "file_path", writer.clone()).unwrap();
        let execution = JobExecutor::new(Arc::new(InMemoryExecutionHistory::new()))
            .execute(
                &job,
                JobParameters::new().with("file_path", file.path().to_string_lossy()),
            )
            .await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        let step = execution.step("exampleStep").unwrap();
        assert_eq!(step.read_count, 7);
        assert_eq!(step.commit_count, 2);
        assert!(writer.contents().await.ends_with("line 6\nline 7\n"));
    }

    #[tokio::test]
    async fn test_dummy_job_tolerates_missing_end_date() {
        let executor = JobExecutor::new(Arc::new(InMemoryExecutionHistory::new()));
        let job = dummy_job(DUMMY_JOB, "end_date").unwrap();

        let with_date = executor
            .execute(&job, JobParameters::new().with("end_date", "2024-03-01T00:00:00Z"))
            .await;
        assert_eq!(with_date.status, ExecutionStatus::Completed);
        assert_eq!(with_date.step_executions.len(), 2);

        let without_date = executor.execute(&job, JobParameters::new()).await;
        assert_eq!(without_date.status, ExecutionStatus::Completed);
        assert_eq!(without_date.step_executions.len(), 2);
    }
}
