use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod codec;
pub mod dedup;
pub mod radio;
pub mod settings;
pub mod token;

pub use codec::{ChunkCodec, CodecError};
pub use radio::SERVICE_UUID;
pub use dedup::{DuplicateScanDetector, ScanLogSource, SchoolSettingsSource};
pub use settings::{DedupWindow, Direction, SchoolSettings, SettingsError};
pub use token::{PairingToken, PairingTokenValidator, TokenError};

pub type RecordId = String;
pub type StudentId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryExitStatus {
    #[serde(alias = "IN", alias = "In")]
    In,
    #[serde(alias = "OUT", alias = "Out")]
    Out,
    #[serde(other)]
    Unknown,
}

impl EntryExitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryExitStatus::In => "in",
            EntryExitStatus::Out => "out",
            EntryExitStatus::Unknown => "unknown",
        }
    }
}

/// One attendance event as produced by the scanning device.
///
/// Records are immutable: the receiving side stores them verbatim and
/// identifies them by `id` only. Older payloads used short field names,
/// which are still accepted on input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogRecord {
    pub id: RecordId,
    #[serde(alias = "student_id")]
    pub student_id: StudentId,
    #[serde(alias = "name")]
    pub student_name: String,
    #[serde(alias = "grade", default)]
    pub grade_level: String,
    #[serde(default)]
    pub section: String,
    #[serde(alias = "status")]
    pub entry_exit_status: EntryExitStatus,
    #[serde(alias = "time")]
    pub timestamp: DateTime<Utc>,
}

impl ScanLogRecord {
    pub fn new(student: &Student, status: EntryExitStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            grade_level: student.grade_level.clone(),
            section: student.section.clone(),
            entry_exit_status: status,
            timestamp,
        }
    }
}

/// Sort newest first, the order used for display and for sync payloads.
pub fn sort_newest_first(records: &mut [ScanLogRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    #[serde(default)]
    pub grade_level: String,
    #[serde(default)]
    pub section: String,
}

/// A counterpart seen during one discovery cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub address: String,
    pub display_name: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn legacy_field_names_are_accepted() {
        let json = r#"{
            "id": "r1",
            "studentId": "s1",
            "name": "Ana Cruz",
            "grade": "7",
            "section": "Rizal",
            "status": "IN",
            "timestamp": "2024-05-02T08:05:00Z"
        }"#;
        let rec: ScanLogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.student_name, "Ana Cruz");
        assert_eq!(rec.grade_level, "7");
        assert_eq!(rec.entry_exit_status, EntryExitStatus::In);
    }

    #[test]
    fn unrecognised_status_maps_to_unknown() {
        let json = r#"{"id":"r1","studentId":"s1","studentName":"x","entryExitStatus":"late","timestamp":"2024-05-02T08:05:00Z"}"#;
        let rec: ScanLogRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.entry_exit_status, EntryExitStatus::Unknown);
        assert_eq!(rec.section, "");
    }

    #[test]
    fn newest_first_ordering() {
        let student = Student {
            id: "s1".into(),
            name: "Ana".into(),
            grade_level: "7".into(),
            section: "A".into(),
        };
        let early = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 5, 2, 15, 0, 0).unwrap();
        let mut recs = vec![
            ScanLogRecord::new(&student, EntryExitStatus::In, early),
            ScanLogRecord::new(&student, EntryExitStatus::Out, late),
        ];
        sort_newest_first(&mut recs);
        assert_eq!(recs[0].timestamp, late);
    }
}
