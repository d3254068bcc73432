// Bootstrap utilities for the launcher binary: turn settings into wired components

use crate::config::{HistoryBackend, Settings};
use crate::db::{DbPool, PgDeadLetterSink, PgExecutionHistory, PgRecordStore};
use crate::history::{ExecutionHistory, InMemoryExecutionHistory};
use crate::scheduler::TriggerFlow;
use crate::trigger::{
    DeadLetterSink, FileRequestBuilder, FileTrigger, FilenamePattern, RecordRequestBuilder,
    RecordStore, RecordTrigger,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Connect to Postgres and apply migrations
///
/// # Errors
/// Returns error if the pool cannot connect or a migration fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;
    db_pool
        .migrate()
        .await
        .context("Failed to apply database migrations")?;

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Pick the execution history backend named in settings
pub fn build_history(settings: &Settings, db_pool: Option<&DbPool>) -> Result<Arc<dyn ExecutionHistory>> {
    match settings.history.backend {
        HistoryBackend::Memory => Ok(Arc::new(InMemoryExecutionHistory::new())),
        HistoryBackend::Postgres => {
            let pool = db_pool.context("Postgres history requires a database connection")?;
            Ok(Arc::new(PgExecutionHistory::new(pool.clone())))
        }
    }
}

/// Build one trigger flow per enabled trigger source
#[tracing::instrument(skip(settings, db_pool))]
pub async fn build_trigger_flows(settings: &Settings, db_pool: Option<&DbPool>) -> Result<Vec<TriggerFlow>> {
    let mut flows = Vec::new();

    let file = &settings.file_trigger;
    if file.enabled {
        let pattern = FilenamePattern::new(&file.pattern).context("Invalid file trigger pattern")?;
        let trigger = FileTrigger::new(&file.directory, pattern)
            .await
            .context("Failed to prepare watched directory")?
            .with_max_events_per_poll(file.max_events_per_poll);

        info!(
            directory = %trigger.directory().display(),
            pattern = %file.pattern,
            job_name = %file.job_name,
            "File trigger enabled"
        );
        flows.push(TriggerFlow::new(
            "file",
            Box::new(trigger),
            Arc::new(FileRequestBuilder::new(&file.job_name, &file.parameter_name)),
            &file.poll,
        ));
    }

    let record = &settings.record_trigger;
    if record.enabled {
        let pool = db_pool.context("Record trigger requires a database connection")?;
        let store: Arc<dyn RecordStore> = Arc::new(
            PgRecordStore::new(pool.clone(), &record.table).context("Invalid record trigger table")?,
        );
        let dead_letters: Arc<dyn DeadLetterSink> = Arc::new(PgDeadLetterSink::new(pool.clone()));
        let trigger =
            RecordTrigger::new(store, dead_letters).with_max_events_per_poll(record.max_events_per_poll);

        info!(table = %record.table, job_name = %record.job_name, "Record trigger enabled");
        flows.push(TriggerFlow::new(
            "record",
            Box::new(trigger),
            Arc::new(RecordRequestBuilder::new(&record.job_name, &record.parameter_name)),
            &record.poll,
        ));
    }

    Ok(flows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_default_settings_build_file_flow_only() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.file_trigger.directory = dir.path().join("dropfolder");

        let flows = build_trigger_flows(&settings, None).await.unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].name(), "file");
        assert!(dir.path().join("dropfolder").is_dir());
    }

    #[tokio::test]
    async fn test_record_trigger_without_database_fails() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.file_trigger.directory = dir.path().to_path_buf();
        settings.record_trigger.enabled = true;

        assert!(build_trigger_flows(&settings, None).await.is_err());
    }

    #[test]
    fn test_history_backend_selection() {
        let mut settings = Settings::default();
        assert!(build_history(&settings, None).is_ok());

        settings.history.backend = HistoryBackend::Postgres;
        assert!(build_history(&settings, None).is_err());
    }
}
