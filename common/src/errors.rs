// Error handling framework for triggers, launching and step execution

use thiserror::Error;

/// Failures while polling a trigger source. Always transient from the
/// poller's point of view: the tick is skipped and the next one retries.
#[derive(Error, Debug)]
pub enum TriggerPollError {
    #[error("Failed to list watched directory {path}: {reason}")]
    DirectoryListing { path: String, reason: String },

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Record claim failed: {0}")]
    ClaimFailed(String),
}

/// A raw trigger payload that could not be turned into a trigger event
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedEventError {
    #[error("Record {id} has no end_date")]
    MissingEndDate { id: i64 },

    #[error("Record {id} has unparseable end_date '{value}'")]
    InvalidEndDate { id: i64, value: String },

    #[error("Record {id} has unknown status '{value}'")]
    UnknownStatus { id: i64, value: String },
}

impl MalformedEventError {
    pub fn record_id(&self) -> i64 {
        match self {
            MalformedEventError::MissingEndDate { id }
            | MalformedEventError::InvalidEndDate { id, .. }
            | MalformedEventError::UnknownStatus { id, .. } => *id,
        }
    }
}

/// Errors surfaced synchronously by the launch gateway
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("No job registered under name '{0}'")]
    UnknownJob(String),

    #[error("Launch gateway is shutting down")]
    ShuttingDown,

    #[error("Failed to record job execution: {0}")]
    History(#[from] DatabaseError),
}

impl LaunchError {
    /// Whether the same request may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        !matches!(self, LaunchError::UnknownJob(_))
    }
}

/// Failures inside a tasklet or chunk step
#[derive(Error, Debug)]
pub enum StepExecutionError {
    #[error("Missing job parameter: {0}")]
    MissingParameter(String),

    #[error("Item read failed: {0}")]
    Read(String),

    #[error("Item processing failed: {0}")]
    Process(String),

    #[error("Chunk write failed: {0}")]
    Write(String),

    #[error("Tasklet failed: {0}")]
    Tasklet(String),

    #[error("Step panicked: {0}")]
    Panicked(String),
}

/// Errors in static job definitions, raised while wiring the registry
#[derive(Error, Debug, PartialEq)]
pub enum JobDefinitionError {
    #[error("Chunk size for step '{step}' must be positive")]
    InvalidChunkSize { step: String },

    #[error("Job '{0}' has no steps")]
    NoSteps(String),

    #[error("Job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("Job name cannot be empty")]
    EmptyName,
}

/// Validation errors
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Unexpected trigger event: expected {expected}, got {actual}")]
    UnexpectedEvent { expected: String, actual: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

/// Storage errors for the external record store and dead letters
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionFailed(err.to_string())
            }
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    DatabaseError::DuplicateKey(db_err.message().to_string())
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        DatabaseError::InvalidJson(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<StorageError> for TriggerPollError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(reason) => TriggerPollError::StoreUnavailable(reason),
            other => TriggerPollError::ClaimFailed(other.to_string()),
        }
    }
}
