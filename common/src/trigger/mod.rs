// Trigger sources and the builders that turn their events into launch requests

pub mod file;
pub mod record;
pub mod request;

pub use file::{FileTrigger, FilenamePattern};
pub use record::{
    parse_record, DeadLetterSink, InMemoryRecordStore, LogDeadLetterSink, RecordStore, RecordTrigger,
};
pub use request::{FileRequestBuilder, RecordRequestBuilder, RequestBuilder};

use crate::errors::TriggerPollError;
use crate::models::{SourceKind, TriggerEvent};
use async_trait::async_trait;

/// A source of trigger events, polled on a fixed schedule.
///
/// `poll` takes `&mut self` so a source can keep state between polls and is
/// never polled re-entrantly.
#[async_trait]
pub trait TriggerSource: Send {
    fn kind(&self) -> SourceKind;

    /// Events observed since the previous poll, possibly none
    async fn poll(&mut self) -> Result<Vec<TriggerEvent>, TriggerPollError>;

    /// Take back an emitted event whose launch was refused, so a later poll
    /// reports it again. Sources that acknowledge at claim time keep the
    /// default and cannot redeliver.
    fn release(&mut self, _event: &TriggerEvent) {}
}
