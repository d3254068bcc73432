use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Trigger Models
// ============================================================================

/// Which kind of trigger source produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Record,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Record => write!(f, "record"),
        }
    }
}

/// Payload carried by a trigger event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerPayload {
    File { path: PathBuf },
    Record(ExternalRecord),
}

/// An observed external condition. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    payload: TriggerPayload,
    observed_at: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            payload: TriggerPayload::File { path: path.into() },
            observed_at: Utc::now(),
        }
    }

    pub fn record(record: ExternalRecord) -> Self {
        Self {
            payload: TriggerPayload::Record(record),
            observed_at: Utc::now(),
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self.payload {
            TriggerPayload::File { .. } => SourceKind::File,
            TriggerPayload::Record(_) => SourceKind::Record,
        }
    }

    pub fn payload(&self) -> &TriggerPayload {
        &self.payload
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Path of a file event, `None` for record events
    pub fn file_path(&self) -> Option<&Path> {
        match &self.payload {
            TriggerPayload::File { path } => Some(path),
            TriggerPayload::Record(_) => None,
        }
    }
}

/// Lifecycle state of a row in the external trigger table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Pending,
    Ready,
    Consumed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "PENDING"),
            RecordStatus::Ready => write!(f, "READY"),
            RecordStatus::Consumed => write!(f, "CONSUMED"),
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(RecordStatus::Pending),
            "READY" => Ok(RecordStatus::Ready),
            "CONSUMED" => Ok(RecordStatus::Consumed),
            other => Err(format!("Unknown record status: {}", other)),
        }
    }
}

/// A parsed row of the external trigger table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub id: i64,
    pub end_date: DateTime<Utc>,
    pub status: RecordStatus,
}

/// A claimed row exactly as the store returned it, before parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: i64,
    pub end_date: Option<String>,
    pub status: String,
}

impl RawRecord {
    pub fn new(id: i64, end_date: Option<&str>, status: impl Into<String>) -> Self {
        Self {
            id,
            end_date: end_date.map(str::to_string),
            status: status.into(),
        }
    }
}

// ============================================================================
// Launch Models
// ============================================================================

/// Immutable, ordered string parameters of one job execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobParameters(BTreeMap<String, String>);

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with one more parameter; the receiver is left untouched
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JobParameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl std::fmt::Display for JobParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

/// Request to launch one execution of a registered job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLaunchRequest {
    pub job_name: String,
    pub parameters: JobParameters,
}

impl JobLaunchRequest {
    pub fn new(job_name: impl Into<String>, parameters: JobParameters) -> Self {
        Self {
            job_name: job_name.into(),
            parameters,
        }
    }
}

// ============================================================================
// Execution Models
// ============================================================================

/// ExecutionStatus represents the status of a job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "RUNNING"),
            ExecutionStatus::Completed => write!(f, "COMPLETED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(ExecutionStatus::Running),
            "COMPLETED" => Ok(ExecutionStatus::Completed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            _ => Err(format!("Invalid execution status: {}", s)),
        }
    }
}

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

/// Bookkeeping for one step of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    pub status: StepStatus,
    pub read_count: u64,
    pub filter_count: u64,
    pub write_count: u64,
    pub commit_count: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl StepExecution {
    pub fn start(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Running,
            read_count: 0,
            filter_count: 0,
            write_count: 0,
            commit_count: 0,
            started_at: Utc::now(),
            ended_at: None,
            failure: None,
        }
    }

    pub fn complete(&mut self) {
        self.status = StepStatus::Completed;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.failure = Some(reason.into());
    }
}

/// JobExecution tracks one run of a job from admission to a terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_name: String,
    pub parameters: JobParameters,
    pub status: ExecutionStatus,
    pub current_step: Option<String>,
    pub step_executions: Vec<StepExecution>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub failure: Option<String>,
}

impl JobExecution {
    /// Create a RUNNING execution for the given job and parameter snapshot
    pub fn start(job_name: impl Into<String>, parameters: JobParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.into(),
            parameters,
            status: ExecutionStatus::Running,
            current_step: None,
            step_executions: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            failure: None,
        }
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.current_step = None;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.failure = Some(reason.into());
    }

    pub fn duration_ms(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0)
    }

    pub fn step(&self, name: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|s| s.step_name == name)
    }
}

/// The record handed to completion listeners once per terminal execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub execution_id: Uuid,
    pub job_name: String,
    pub parameters: JobParameters,
    pub status: ExecutionStatus,
    pub duration_ms: i64,
}

impl From<&JobExecution> for CompletionRecord {
    fn from(execution: &JobExecution) -> Self {
        Self {
            execution_id: execution.id,
            job_name: execution.job_name.clone(),
            parameters: execution.parameters.clone(),
            status: execution.status,
            duration_ms: execution.duration_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_are_ordered_by_key() {
        let params: JobParameters = [("b", "2"), ("a", "1")].into_iter().collect();
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(params.to_string(), "{a=1, b=2}");
    }

    #[test]
    fn test_parameters_serialize_as_plain_map() {
        let params = JobParameters::new().with("file_path", "/tmp/in.txt");
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({ "file_path": "/tmp/in.txt" }));
    }

    #[test]
    fn test_record_status_roundtrip() {
        for status in [RecordStatus::Pending, RecordStatus::Ready, RecordStatus::Consumed] {
            assert_eq!(status.to_string().parse::<RecordStatus>().unwrap(), status);
        }
        assert_eq!(" ready ".parse::<RecordStatus>().unwrap(), RecordStatus::Ready);
        assert!("FINISHED".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_execution_lifecycle() {
        let mut execution = JobExecution::start("exampleJob", JobParameters::new());
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(!execution.status.is_terminal());

        execution.fail("boom");
        assert!(execution.status.is_terminal());
        assert!(execution.ended_at.is_some());
        assert!(execution.duration_ms() >= 0);

        let record = CompletionRecord::from(&execution);
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.job_name, "exampleJob");
    }

    #[test]
    fn test_trigger_event_kind() {
        let event = TriggerEvent::file("/drop/a.txt");
        assert_eq!(event.source_kind(), SourceKind::File);
        assert_eq!(event.file_path(), Some(Path::new("/drop/a.txt")));
    }
}
