use std::sync::Arc;

use chrono::{DateTime, Utc};
use rollcall_core::{Direction, DuplicateScanDetector, ScanLogRecord};
use rollcall_persistence::{LogStore, StorageError};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Unknown student {0}")]
    UnknownStudent(String),
    #[error("Storage error: {0}")]
    Store(#[from] StorageError),
    #[error("Duplicate check failed: {0}")]
    Check(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded(ScanLogRecord),
    /// Already scanned in this direction during the current window.
    Duplicate,
}

/// Scanner-side entry point: one tap of a student card.
pub struct AttendanceRecorder {
    store: Arc<dyn LogStore>,
    detector: DuplicateScanDetector,
}

impl AttendanceRecorder {
    pub fn new(store: Arc<dyn LogStore>, detector: DuplicateScanDetector) -> Self {
        Self { store, detector }
    }

    pub fn record(
        &self,
        student_id: &str,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome, RecordError> {
        let student = self
            .store
            .student(student_id)?
            .ok_or_else(|| RecordError::UnknownStudent(student_id.to_string()))?;

        if self
            .detector
            .check(student_id, direction, now)
            .map_err(RecordError::Check)?
        {
            debug!("Duplicate {} scan for {}", direction, student_id);
            return Ok(RecordOutcome::Duplicate);
        }

        let record = ScanLogRecord::new(&student, direction.status(), now);
        self.store.record_local(&record)?;
        info!("Recorded {} for {} ({})", direction, student.name, record.id);
        Ok(RecordOutcome::Recorded(record))
    }
}
