// Request builders: map a trigger event to a job launch request

use crate::errors::ValidationError;
use crate::models::{JobLaunchRequest, JobParameters, SourceKind, TriggerEvent, TriggerPayload};
use chrono::SecondsFormat;

/// Pure mapping from one kind of trigger event to a launch request for one job
pub trait RequestBuilder: Send + Sync {
    fn job_name(&self) -> &str;

    fn build(&self, event: &TriggerEvent) -> Result<JobLaunchRequest, ValidationError>;
}

fn unexpected(expected: SourceKind, event: &TriggerEvent) -> ValidationError {
    ValidationError::UnexpectedEvent {
        expected: expected.to_string(),
        actual: event.source_kind().to_string(),
    }
}

/// File event → `{job_name, {parameter: <absolute path>}}`
#[derive(Debug, Clone)]
pub struct FileRequestBuilder {
    job_name: String,
    parameter: String,
}

impl FileRequestBuilder {
    pub fn new(job_name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            parameter: parameter.into(),
        }
    }
}

impl Default for FileRequestBuilder {
    fn default() -> Self {
        Self::new("exampleJob", "file_path")
    }
}

impl RequestBuilder for FileRequestBuilder {
    fn job_name(&self) -> &str {
        &self.job_name
    }

    fn build(&self, event: &TriggerEvent) -> Result<JobLaunchRequest, ValidationError> {
        let path = match event.payload() {
            TriggerPayload::File { path } => path,
            TriggerPayload::Record(_) => return Err(unexpected(SourceKind::File, event)),
        };
        let path = path.to_str().ok_or_else(|| ValidationError::InvalidFieldValue {
            field: self.parameter.clone(),
            reason: format!("path is not valid UTF-8: {}", path.display()),
        })?;

        Ok(JobLaunchRequest::new(
            self.job_name.clone(),
            JobParameters::new().with(self.parameter.clone(), path),
        ))
    }
}

/// Record event → `{job_name, {parameter: <end date, RFC 3339 UTC seconds>}}`
#[derive(Debug, Clone)]
pub struct RecordRequestBuilder {
    job_name: String,
    parameter: String,
}

impl RecordRequestBuilder {
    pub fn new(job_name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            parameter: parameter.into(),
        }
    }
}

impl Default for RecordRequestBuilder {
    fn default() -> Self {
        Self::new("dummyJob", "end_date")
    }
}

impl RequestBuilder for RecordRequestBuilder {
    fn job_name(&self) -> &str {
        &self.job_name
    }

    fn build(&self, event: &TriggerEvent) -> Result<JobLaunchRequest, ValidationError> {
        let record = match event.payload() {
            TriggerPayload::Record(record) => record,
            TriggerPayload::File { .. } => return Err(unexpected(SourceKind::Record, event)),
        };

        Ok(JobLaunchRequest::new(
            self.job_name.clone(),
            JobParameters::new().with(
                self.parameter.clone(),
                record.end_date.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalRecord, RecordStatus};
    use chrono::{TimeZone, Utc};

    fn record_event() -> TriggerEvent {
        TriggerEvent::record(ExternalRecord {
            id: 7,
            end_date: Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap(),
            status: RecordStatus::Consumed,
        })
    }

    #[test]
    fn test_file_request() {
        let request = FileRequestBuilder::default()
            .build(&TriggerEvent::file("/data/drop/a.txt"))
            .unwrap();
        assert_eq!(request.job_name, "exampleJob");
        assert_eq!(request.parameters.get("file_path"), Some("/data/drop/a.txt"));
        assert_eq!(request.parameters.len(), 1);
    }

    #[test]
    fn test_record_request() {
        let request = RecordRequestBuilder::default().build(&record_event()).unwrap();
        assert_eq!(request.job_name, "dummyJob");
        assert_eq!(request.parameters.get("end_date"), Some("2024-03-01T10:15:00Z"));
    }

    #[test]
    fn test_custom_binding() {
        let builder = RecordRequestBuilder::new("reportJob", "cutoff");
        let request = builder.build(&record_event()).unwrap();
        assert_eq!(builder.job_name(), "reportJob");
        assert_eq!(request.parameters.get("cutoff"), Some("2024-03-01T10:15:00Z"));
    }

    #[test]
    fn test_wrong_variant_is_rejected() {
        let err = FileRequestBuilder::default().build(&record_event()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnexpectedEvent {
                expected: "file".to_string(),
                actual: "record".to_string()
            }
        );
        assert!(RecordRequestBuilder::default()
            .build(&TriggerEvent::file("/a.txt"))
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_is_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = std::path::Path::new(OsStr::from_bytes(b"/drop/\xff.txt"));
        let err = FileRequestBuilder::default()
            .build(&TriggerEvent::file(path))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFieldValue { .. }));
    }
}
