// Postgres adapters for the execution history and the record trigger

pub mod execution;
pub mod record;

pub use execution::PgExecutionHistory;
pub use record::{PgDeadLetterSink, PgRecordStore};
