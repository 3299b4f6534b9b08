//! Duplicate-scan detection inside the configured daily windows.
//!
//! A student may pass once per entry window and once per exit window each
//! day. Repeated taps inside the same window on the same day are duplicates;
//! outside any configured window nothing is deduplicated.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::settings::{minute_of_day, Direction, SchoolSettings};
use crate::ScanLogRecord;

/// Read side of the log store the detector consults.
pub trait ScanLogSource: Send + Sync {
    fn logs_for_student(&self, student_id: &str) -> anyhow::Result<Vec<ScanLogRecord>>;
}

/// Supplies the settings snapshot in force at the moment of a check.
pub trait SchoolSettingsSource: Send + Sync {
    fn current(&self) -> anyhow::Result<SchoolSettings>;
}

pub fn is_duplicate(
    student_id: &str,
    direction: Direction,
    existing: &[ScanLogRecord],
    settings: &SchoolSettings,
    now: DateTime<Utc>,
) -> bool {
    let Some(window) = settings.window_for(direction) else {
        return false;
    };

    let offset = settings.clock_offset();
    let local_now = now.with_timezone(&offset);
    if !window.contains(minute_of_day(&local_now)) {
        return false;
    }

    let today = local_now.date_naive();
    let status = direction.status();
    existing
        .iter()
        .filter(|r| r.student_id == student_id && r.entry_exit_status == status)
        .any(|r| {
            let at = r.timestamp.with_timezone(&offset);
            at.date_naive() == today && window.contains(minute_of_day(&at))
        })
}

/// Store-backed detector. Settings are re-read on every call so a changed
/// window applies to the very next scan.
#[derive(Clone)]
pub struct DuplicateScanDetector {
    logs: Arc<dyn ScanLogSource>,
    settings: Arc<dyn SchoolSettingsSource>,
}

impl DuplicateScanDetector {
    pub fn new(logs: Arc<dyn ScanLogSource>, settings: Arc<dyn SchoolSettingsSource>) -> Self {
        Self { logs, settings }
    }

    pub fn check(
        &self,
        student_id: &str,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let settings = self.settings.current()?;
        if settings.window_for(direction).is_none() {
            return Ok(false);
        }
        let existing = self.logs.logs_for_student(student_id)?;
        Ok(is_duplicate(student_id, direction, &existing, &settings, now))
    }
}
