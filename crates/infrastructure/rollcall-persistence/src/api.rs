use chrono::{DateTime, Utc};
use rollcall_core::{RecordId, ScanLogRecord, Student};

use crate::LogQuery;

pub const ROLLCALL_REDB_FILENAME: &str = "rollcall.redb";
pub const CURRENT_SCHEMA: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbState {
    Missing,
    Valid,
    Busy,
    Corrupt,
    NewerSchema { found: u32, supported: u32 },
}

pub type RecordFilter<'a> = &'a dyn Fn(&ScanLogRecord) -> bool;

/// Local scan-log store: the received archive on a receiver, the outbox on
/// a scanning device.
pub trait LogStore: Send + Sync {
    fn validate(&self) -> Result<DbState, crate::StorageError>;

    /// Stores received records verbatim. Ids already present are skipped, so
    /// a re-sent payload is harmless. Returns how many were new.
    fn append_logs(&self, records: &[ScanLogRecord]) -> Result<usize, crate::StorageError>;

    /// Stores a locally created record and queues it for the next transfer.
    fn record_local(&self, record: &ScanLogRecord) -> Result<(), crate::StorageError>;

    /// All records, newest first.
    fn load_logs(&self) -> Result<Vec<ScanLogRecord>, crate::StorageError>;

    fn logs_for_student(&self, student_id: &str)
        -> Result<Vec<ScanLogRecord>, crate::StorageError>;

    /// Queued records not yet acknowledged by a receiver, newest first.
    fn unsent_logs(&self) -> Result<Vec<ScanLogRecord>, crate::StorageError>;

    /// Dequeues `ids`. Returns how many were still queued.
    fn mark_sent(&self, ids: &[RecordId]) -> Result<usize, crate::StorageError>;

    fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, crate::StorageError>;

    /// Projected, sorted, paged rows.
    fn query(&self, query: &LogQuery) -> Result<Vec<serde_json::Value>, crate::StorageError>;

    /// Records matching an arbitrary predicate, newest first.
    fn query_where(
        &self,
        filter: RecordFilter<'_>,
    ) -> Result<Vec<ScanLogRecord>, crate::StorageError>;

    fn upsert_student(&self, student: &Student) -> Result<(), crate::StorageError>;

    fn student(&self, id: &str) -> Result<Option<Student>, crate::StorageError>;

    /// All students ordered by name.
    fn students(&self) -> Result<Vec<Student>, crate::StorageError>;
}
