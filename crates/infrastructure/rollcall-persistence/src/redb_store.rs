use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use rollcall_core::{sort_newest_first, RecordId, ScanLogRecord, Student};
use tracing::debug;

use crate::api::{DbState, RecordFilter, CURRENT_SCHEMA, ROLLCALL_REDB_FILENAME};
use crate::codec::{decode_record, decode_student, encode_record, encode_student};
use crate::maintenance::quarantine_corrupt_file;
use crate::{LogQuery, LogStore, StorageError};

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const SCAN_LOGS: TableDefinition<&str, &[u8]> = TableDefinition::new("scan_logs");
/// Record id -> epoch millis it was queued at.
const OUTBOX: TableDefinition<&str, u64> = TableDefinition::new("outbox");
const STUDENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("students");

const META_FORMAT_KEY: &str = "format";
const META_FORMAT_VALUE: &str = "rollcall-redb";
const META_SCHEMA_VERSION: &str = "schema_version";
const META_CREATED_AT: &str = "created_at";
const META_LAST_SYNC_AT: &str = "last_sync_at";

/// redb-backed [`LogStore`] rooted at a data directory.
///
/// Handles to the same file are shared process-wide, so any number of
/// `RedbLogStore` values for one root can be used concurrently.
#[derive(Debug, Clone)]
pub struct RedbLogStore {
    root: Utf8PathBuf,
}

impl RedbLogStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for_root(root: &Utf8Path) -> Utf8PathBuf {
        root.join(ROLLCALL_REDB_FILENAME)
    }

    pub fn path(&self) -> Utf8PathBuf {
        Self::path_for_root(&self.root)
    }

    fn is_corrupt_open_error(err: &redb::DatabaseError) -> bool {
        match err {
            redb::DatabaseError::Storage(redb::StorageError::Corrupted(_)) => true,
            redb::DatabaseError::Storage(redb::StorageError::Io(ioe)) => matches!(
                ioe.kind(),
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    fn db_cache() -> MutexGuard<'static, HashMap<Utf8PathBuf, Arc<Database>>> {
        static CACHE: OnceLock<Mutex<HashMap<Utf8PathBuf, Arc<Database>>>> = OnceLock::new();
        CACHE
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open(&self) -> Result<Arc<Database>, StorageError> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut cache = Self::db_cache();
        if let Some(existing) = cache.get(&path) {
            if path.exists() {
                return Ok(existing.clone());
            }
            cache.remove(&path);
        }

        let db = if path.exists() {
            match Database::open(path.as_std_path()) {
                Ok(db) => db,
                Err(e) if Self::is_corrupt_open_error(&e) => {
                    let _ = quarantine_corrupt_file(&path);
                    return Err(StorageError::Corrupt);
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            debug!("Creating log store at {}", path);
            Database::create(path.as_std_path())?
        };

        if let Err(e) = Self::ensure_schema(&db) {
            drop(db);
            if matches!(e, StorageError::Corrupt) {
                let _ = quarantine_corrupt_file(&path);
            }
            return Err(e);
        }
        let db = Arc::new(db);
        cache.insert(path, db.clone());
        Ok(db)
    }

    fn ensure_schema(db: &Database) -> Result<(), StorageError> {
        let write_tx = db.begin_write()?;
        {
            let mut meta = write_tx.open_table(META)?;
            let format = meta.get(META_FORMAT_KEY)?.map(|g| g.value().to_string());
            match format.as_deref() {
                None => {
                    let schema_version = CURRENT_SCHEMA.to_string();
                    let created_at = Utc::now().to_rfc3339();
                    meta.insert(META_FORMAT_KEY, META_FORMAT_VALUE)?;
                    meta.insert(META_SCHEMA_VERSION, schema_version.as_str())?;
                    meta.insert(META_CREATED_AT, created_at.as_str())?;
                }
                Some(META_FORMAT_VALUE) => {}
                Some(_) => return Err(StorageError::Corrupt),
            }
        }
        write_tx.open_table(SCAN_LOGS)?;
        write_tx.open_table(OUTBOX)?;
        write_tx.open_table(STUDENTS)?;
        write_tx.commit()?;

        let read_tx = db.begin_read()?;
        let meta = read_tx.open_table(META)?;
        let schema_version = meta
            .get(META_SCHEMA_VERSION)?
            .and_then(|g| g.value().parse::<u32>().ok())
            .unwrap_or(0);
        match schema_version {
            0 => Err(StorageError::Corrupt),
            v if v > CURRENT_SCHEMA => Err(StorageError::NewerSchema {
                found: v,
                supported: CURRENT_SCHEMA,
            }),
            v if v != CURRENT_SCHEMA => Err(StorageError::Corrupt),
            _ => Ok(()),
        }
    }

    fn all_records(&self) -> Result<Vec<ScanLogRecord>, StorageError> {
        let db = self.open()?;
        let read_tx = db.begin_read()?;
        let logs = read_tx.open_table(SCAN_LOGS)?;
        let mut out = Vec::new();
        for row in logs.iter()? {
            let (_, v) = row?;
            out.push(decode_record(v.value())?);
        }
        Ok(out)
    }

    fn require_id(id: &str) -> Result<(), StorageError> {
        if id.trim().is_empty() {
            return Err(StorageError::InvalidRecord("blank id".into()));
        }
        Ok(())
    }
}

impl LogStore for RedbLogStore {
    fn validate(&self) -> Result<DbState, StorageError> {
        let path = self.path();
        if !path.exists() {
            return Ok(DbState::Missing);
        }
        if Self::db_cache().contains_key(&path) {
            return Ok(DbState::Valid);
        }

        match Database::open(path.as_std_path()) {
            Ok(db) => match Self::ensure_schema(&db) {
                Ok(()) => Ok(DbState::Valid),
                Err(StorageError::NewerSchema { found, supported }) => {
                    Ok(DbState::NewerSchema { found, supported })
                }
                Err(StorageError::Corrupt) => {
                    drop(db);
                    let _ = quarantine_corrupt_file(&path);
                    Ok(DbState::Corrupt)
                }
                Err(e) => Err(e),
            },
            Err(redb::DatabaseError::DatabaseAlreadyOpen) => Ok(DbState::Busy),
            Err(e) if Self::is_corrupt_open_error(&e) => {
                let _ = quarantine_corrupt_file(&path);
                Ok(DbState::Corrupt)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn append_logs(&self, records: &[ScanLogRecord]) -> Result<usize, StorageError> {
        for r in records {
            Self::require_id(&r.id)?;
        }
        let db = self.open()?;
        let write_tx = db.begin_write()?;
        let mut added = 0;
        {
            let mut logs = write_tx.open_table(SCAN_LOGS)?;
            for r in records {
                if logs.get(r.id.as_str())?.is_some() {
                    continue;
                }
                let bytes = encode_record(r)?;
                logs.insert(r.id.as_str(), bytes.as_slice())?;
                added += 1;
            }
            let ts = Utc::now().to_rfc3339();
            let mut meta = write_tx.open_table(META)?;
            meta.insert(META_LAST_SYNC_AT, ts.as_str())?;
        }
        write_tx.commit()?;
        debug!("Stored {} of {} received records", added, records.len());
        Ok(added)
    }

    fn record_local(&self, record: &ScanLogRecord) -> Result<(), StorageError> {
        Self::require_id(&record.id)?;
        let db = self.open()?;
        let bytes = encode_record(record)?;
        let queued_at = Utc::now().timestamp_millis().max(0) as u64;
        let write_tx = db.begin_write()?;
        {
            let mut logs = write_tx.open_table(SCAN_LOGS)?;
            if logs.get(record.id.as_str())?.is_some() {
                return Err(StorageError::InvalidRecord(format!(
                    "duplicate id {}",
                    record.id
                )));
            }
            logs.insert(record.id.as_str(), bytes.as_slice())?;
            let mut outbox = write_tx.open_table(OUTBOX)?;
            outbox.insert(record.id.as_str(), queued_at)?;
        }
        write_tx.commit()?;
        Ok(())
    }

    fn load_logs(&self) -> Result<Vec<ScanLogRecord>, StorageError> {
        let mut records = self.all_records()?;
        sort_newest_first(&mut records);
        Ok(records)
    }

    fn logs_for_student(&self, student_id: &str) -> Result<Vec<ScanLogRecord>, StorageError> {
        self.query_where(&|r| r.student_id == student_id)
    }

    fn unsent_logs(&self) -> Result<Vec<ScanLogRecord>, StorageError> {
        let db = self.open()?;
        let read_tx = db.begin_read()?;
        let outbox = read_tx.open_table(OUTBOX)?;
        let logs = read_tx.open_table(SCAN_LOGS)?;
        let mut out = Vec::new();
        for row in outbox.iter()? {
            let (id, _) = row?;
            match logs.get(id.value())? {
                Some(v) => out.push(decode_record(v.value())?),
                None => debug!("Outbox entry {} has no record", id.value()),
            }
        }
        sort_newest_first(&mut out);
        Ok(out)
    }

    fn mark_sent(&self, ids: &[RecordId]) -> Result<usize, StorageError> {
        let db = self.open()?;
        let write_tx = db.begin_write()?;
        let mut removed = 0;
        {
            let mut outbox = write_tx.open_table(OUTBOX)?;
            for id in ids {
                if outbox.remove(id.as_str())?.is_some() {
                    removed += 1;
                }
            }
            let ts = Utc::now().to_rfc3339();
            let mut meta = write_tx.open_table(META)?;
            meta.insert(META_LAST_SYNC_AT, ts.as_str())?;
        }
        write_tx.commit()?;
        Ok(removed)
    }

    fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let db = self.open()?;
        let read_tx = db.begin_read()?;
        let meta = read_tx.open_table(META)?;
        let raw = meta.get(META_LAST_SYNC_AT)?.map(|g| g.value().to_string());
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }

    fn query(&self, query: &LogQuery) -> Result<Vec<serde_json::Value>, StorageError> {
        query.run(self.all_records()?)
    }

    fn query_where(&self, filter: RecordFilter<'_>) -> Result<Vec<ScanLogRecord>, StorageError> {
        let mut out: Vec<_> = self.all_records()?.into_iter().filter(|r| filter(r)).collect();
        sort_newest_first(&mut out);
        Ok(out)
    }

    fn upsert_student(&self, student: &Student) -> Result<(), StorageError> {
        Self::require_id(&student.id)?;
        let db = self.open()?;
        let bytes = encode_student(student)?;
        let write_tx = db.begin_write()?;
        {
            let mut students = write_tx.open_table(STUDENTS)?;
            students.insert(student.id.as_str(), bytes.as_slice())?;
        }
        write_tx.commit()?;
        Ok(())
    }

    fn student(&self, id: &str) -> Result<Option<Student>, StorageError> {
        let db = self.open()?;
        let read_tx = db.begin_read()?;
        let students = read_tx.open_table(STUDENTS)?;
        let found = students.get(id)?;
        found.map(|g| decode_student(g.value())).transpose()
    }

    fn students(&self) -> Result<Vec<Student>, StorageError> {
        let db = self.open()?;
        let read_tx = db.begin_read()?;
        let table = read_tx.open_table(STUDENTS)?;
        let mut out = Vec::new();
        for row in table.iter()? {
            let (_, v) = row?;
            out.push(decode_student(v.value())?);
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}
