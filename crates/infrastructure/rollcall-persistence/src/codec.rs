use rollcall_core::{ScanLogRecord, Student};

use crate::StorageError;

pub fn encode_record(record: &ScanLogRecord) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(record)?)
}

pub fn decode_record(bytes: &[u8]) -> Result<ScanLogRecord, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_student(student: &Student) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(student)?)
}

pub fn decode_student(bytes: &[u8]) -> Result<Student, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}
