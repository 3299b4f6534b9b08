//! Bridges from the log store and settings file to the narrow traits the
//! sync and dedup code depend on.

use std::sync::Arc;

use rollcall_core::{RecordId, ScanLogRecord, ScanLogSource, SchoolSettings, SchoolSettingsSource};
use rollcall_persistence::LogStore;
use rollcall_pipeline::Outbox;

use crate::ports::{LogSink, SettingsRepo};

#[derive(Clone)]
pub struct StoreAdapter(pub Arc<dyn LogStore>);

impl StoreAdapter {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self(store)
    }
}

impl LogSink for StoreAdapter {
    fn persist(&self, records: &[ScanLogRecord]) -> anyhow::Result<usize> {
        Ok(self.0.append_logs(records)?)
    }
}

impl Outbox for StoreAdapter {
    fn pending(&self) -> anyhow::Result<Vec<ScanLogRecord>> {
        Ok(self.0.unsent_logs()?)
    }

    fn mark_sent(&self, ids: &[RecordId]) -> anyhow::Result<usize> {
        Ok(self.0.mark_sent(ids)?)
    }
}

impl ScanLogSource for StoreAdapter {
    fn logs_for_student(&self, student_id: &str) -> anyhow::Result<Vec<ScanLogRecord>> {
        Ok(self.0.logs_for_student(student_id)?)
    }
}

/// Reads the settings file on every call so window edits apply immediately.
#[derive(Clone)]
pub struct SettingsSnapshot(pub Arc<dyn SettingsRepo>);

impl SchoolSettingsSource for SettingsSnapshot {
    fn current(&self) -> anyhow::Result<SchoolSettings> {
        Ok(self.0.load()?.school)
    }
}
