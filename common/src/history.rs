// Execution history: where job executions are recorded as they progress

use crate::errors::DatabaseError;
use crate::models::JobExecution;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence for job executions. The executor writes through it on
/// admission, after every step and on completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionHistory: Send + Sync {
    async fn create(&self, execution: &JobExecution) -> Result<(), DatabaseError>;

    async fn update(&self, execution: &JobExecution) -> Result<(), DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, DatabaseError>;
}

/// Process-local history, lost on restart
#[derive(Default)]
pub struct InMemoryExecutionHistory {
    executions: RwLock<HashMap<Uuid, JobExecution>>,
}

impl InMemoryExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.executions.read().await.is_empty()
    }

    /// All executions of a job, oldest first
    pub async fn find_by_job(&self, job_name: &str) -> Vec<JobExecution> {
        let mut found: Vec<JobExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.job_name == job_name)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.started_at);
        found
    }
}

#[async_trait]
impl ExecutionHistory for InMemoryExecutionHistory {
    async fn create(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id) {
            return Err(DatabaseError::DuplicateKey(execution.id.to_string()));
        }
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &JobExecution) -> Result<(), DatabaseError> {
        match self.executions.write().await.get_mut(&execution.id) {
            Some(existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!(
                "Execution not found: {}",
                execution.id
            ))),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, DatabaseError> {
        Ok(self.executions.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStatus, JobParameters};

    #[tokio::test]
    async fn test_create_update_find() {
        let history = InMemoryExecutionHistory::new();
        let mut execution = JobExecution::start("exampleJob", JobParameters::new());

        history.create(&execution).await.unwrap();
        execution.complete();
        history.update(&execution).await.unwrap();

        let stored = history.find_by_id(execution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert_eq!(history.find_by_job("exampleJob").await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let history = InMemoryExecutionHistory::new();
        let execution = JobExecution::start("exampleJob", JobParameters::new());
        history.create(&execution).await.unwrap();
        assert!(matches!(
            history.create(&execution).await,
            Err(DatabaseError::DuplicateKey(_))
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_execution() {
        let history = InMemoryExecutionHistory::new();
        let execution = JobExecution::start("exampleJob", JobParameters::new());
        assert!(matches!(
            history.update(&execution).await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(history.is_empty().await);
    }
}
