// Record trigger: claims READY rows of an external table and emits them as events

use crate::errors::{MalformedEventError, StorageError, TriggerPollError};
use crate::models::{ExternalRecord, RawRecord, RecordStatus, SourceKind, TriggerEvent};
use crate::telemetry;
use crate::trigger::TriggerSource;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// External table of trigger rows.
///
/// `claim_ready` must move rows from READY to CONSUMED and return them in one
/// atomic step, so that two overlapping claims never return the same row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn claim_ready(&self, limit: Option<usize>) -> Result<Vec<RawRecord>, StorageError>;
}

/// Destination for claimed rows that could not be parsed
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, raw: &RawRecord, error: &MalformedEventError);
}

#[derive(Debug, Default)]
pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn record(&self, raw: &RawRecord, error: &MalformedEventError) {
        warn!(
            record_id = raw.id,
            end_date = raw.end_date.as_deref(),
            status = %raw.status,
            error = %error,
            "Dropping malformed record"
        );
    }
}

/// Turn a claimed row into an ExternalRecord.
///
/// `end_date` accepts RFC 3339 timestamps, naive `YYYY-MM-DD HH:MM:SS`
/// timestamps (taken as UTC) and bare dates (midnight UTC).
pub fn parse_record(raw: &RawRecord) -> Result<ExternalRecord, MalformedEventError> {
    let value = raw
        .end_date
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(MalformedEventError::MissingEndDate { id: raw.id })?;

    let end_date = parse_end_date(value).ok_or_else(|| MalformedEventError::InvalidEndDate {
        id: raw.id,
        value: value.to_string(),
    })?;

    let status = raw
        .status
        .parse::<RecordStatus>()
        .map_err(|_| MalformedEventError::UnknownStatus {
            id: raw.id,
            value: raw.status.clone(),
        })?;

    Ok(ExternalRecord {
        id: raw.id,
        end_date,
        status,
    })
}

fn parse_end_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

pub struct RecordTrigger {
    store: Arc<dyn RecordStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    max_events_per_poll: Option<usize>,
}

impl RecordTrigger {
    pub fn new(store: Arc<dyn RecordStore>, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            store,
            dead_letters,
            max_events_per_poll: None,
        }
    }

    pub fn with_max_events_per_poll(mut self, limit: Option<usize>) -> Self {
        self.max_events_per_poll = limit;
        self
    }
}

#[async_trait]
impl TriggerSource for RecordTrigger {
    fn kind(&self) -> SourceKind {
        SourceKind::Record
    }

    #[instrument(skip(self))]
    async fn poll(&mut self) -> Result<Vec<TriggerEvent>, TriggerPollError> {
        let claimed = self.store.claim_ready(self.max_events_per_poll).await?;

        let mut events = Vec::with_capacity(claimed.len());
        for raw in &claimed {
            match parse_record(raw) {
                Ok(record) => events.push(TriggerEvent::record(record)),
                Err(e) => {
                    // Already acknowledged; the dead-letter sink is the only trace left
                    telemetry::record_dead_letter(SourceKind::Record);
                    self.dead_letters.record(raw, &e).await;
                }
            }
        }

        if !claimed.is_empty() {
            debug!(claimed = claimed.len(), emitted = events.len(), "Records claimed");
        }
        Ok(events)
    }
}

/// Process-local record table
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    rows: Mutex<Vec<RawRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row with the next id
    pub async fn insert(&self, end_date: Option<&str>, status: RecordStatus) -> i64 {
        let mut rows = self.rows.lock().await;
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        rows.push(RawRecord::new(id, end_date, status.to_string()));
        id
    }

    pub async fn status_of(&self, id: i64) -> Option<String> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.status.clone())
    }

    pub async fn set_status(&self, id: i64, status: RecordStatus) -> bool {
        match self.rows.lock().await.iter_mut().find(|r| r.id == id) {
            Some(row) => {
                row.status = status.to_string();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn claim_ready(&self, limit: Option<usize>) -> Result<Vec<RawRecord>, StorageError> {
        let mut rows = self.rows.lock().await;
        let limit = limit.unwrap_or(usize::MAX);

        let mut claimed = Vec::new();
        for row in rows.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if row.status.parse::<RecordStatus>() == Ok(RecordStatus::Ready) {
                row.status = RecordStatus::Consumed.to_string();
                claimed.push(row.clone());
            }
        }
        Ok(claimed)
    }
}
