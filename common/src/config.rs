// Configuration management with layered configuration (defaults, file, env)

use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub history: HistoryConfig,
    pub file_trigger: FileTriggerConfig,
    pub record_trigger: RecordTriggerConfig,
    pub launcher: LauncherConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_seconds: 30,
        }
    }
}

/// Where job executions are recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
}

/// Fixed-rate polling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub period_ms: u64,
    pub initial_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            period_ms: 5000,
            initial_delay_ms: 2000,
        }
    }
}

impl PollConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTriggerConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub pattern: String,
    pub job_name: String,
    pub parameter_name: String,
    pub max_events_per_poll: Option<usize>,
    pub poll: PollConfig,
}

impl Default for FileTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("dropfolder"),
            pattern: "*.txt".to_string(),
            job_name: "exampleJob".to_string(),
            parameter_name: "file_path".to_string(),
            max_events_per_poll: None,
            poll: PollConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordTriggerConfig {
    pub enabled: bool,
    pub table: String,
    pub job_name: String,
    pub parameter_name: String,
    pub max_events_per_poll: Option<usize>,
    pub poll: PollConfig,
}

impl Default for RecordTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            table: "external_batch_job_execution".to_string(),
            job_name: "dummyJob".to_string(),
            parameter_name: "end_date".to_string(),
            max_events_per_poll: Some(100),
            poll: PollConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub max_concurrent_executions: u32,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: Option<u16>,
    pub tracing_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: None,
            tracing_endpoint: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Whether any enabled component needs a Postgres connection
    pub fn requires_database(&self) -> bool {
        self.record_trigger.enabled || self.history.backend == HistoryBackend::Postgres
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.requires_database() && self.database.url.is_empty() {
            return Err(
                "Database URL is required when the record trigger or postgres history is enabled"
                    .to_string(),
            );
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.file_trigger.enabled {
            if self.file_trigger.pattern.is_empty() {
                return Err("File trigger pattern cannot be empty".to_string());
            }
            validate_binding(
                "file_trigger",
                &self.file_trigger.job_name,
                &self.file_trigger.parameter_name,
            )?;
            validate_poll("file_trigger", &self.file_trigger.poll)?;
        }

        if self.record_trigger.enabled {
            validate_binding(
                "record_trigger",
                &self.record_trigger.job_name,
                &self.record_trigger.parameter_name,
            )?;
            validate_poll("record_trigger", &self.record_trigger.poll)?;
            if !is_sql_identifier(&self.record_trigger.table) {
                return Err(format!(
                    "record_trigger table '{}' is not a valid SQL identifier",
                    self.record_trigger.table
                ));
            }
            if self.record_trigger.max_events_per_poll == Some(0) {
                return Err("record_trigger max_events_per_poll must be greater than 0".to_string());
            }
        }

        // Each trigger runs its own demonstration job, registered under this name
        if self.file_trigger.job_name == self.record_trigger.job_name {
            return Err(format!(
                "file_trigger and record_trigger cannot share job_name '{}'",
                self.file_trigger.job_name
            ));
        }

        if self.launcher.max_concurrent_executions == 0 {
            return Err("Launcher max_concurrent_executions must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn validate_binding(section: &str, job_name: &str, parameter_name: &str) -> Result<(), String> {
    if job_name.is_empty() {
        return Err(format!("{} job_name cannot be empty", section));
    }
    if parameter_name.is_empty() {
        return Err(format!("{} parameter_name cannot be empty", section));
    }
    Ok(())
}

fn validate_poll(section: &str, poll: &PollConfig) -> Result<(), String> {
    if poll.period_ms == 0 {
        return Err(format!("{} poll period_ms must be greater than 0", section));
    }
    Ok(())
}

/// Table names are interpolated into SQL, so only plain (optionally
/// schema-qualified) identifiers are accepted
pub fn is_sql_identifier(name: &str) -> bool {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}
