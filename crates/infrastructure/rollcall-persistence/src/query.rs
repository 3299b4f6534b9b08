use std::cmp::Ordering;

use rollcall_core::ScanLogRecord;
use serde_json::{Map, Value};

use crate::StorageError;

/// Wire names of the queryable record fields.
const FIELDS: [&str; 7] = [
    "id",
    "studentId",
    "studentName",
    "gradeLevel",
    "section",
    "entryExitStatus",
    "timestamp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSort {
    pub field: String,
    pub order: SortOrder,
}

impl Default for LogSort {
    fn default() -> Self {
        Self {
            field: "timestamp".into(),
            order: SortOrder::Descending,
        }
    }
}

/// Field projection, sort order and paging over the stored logs.
/// An empty `fields` list projects every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub fields: Vec<String>,
    pub page_size: Option<usize>,
    /// Zero-based page index, used with `page_size`.
    pub page: usize,
    pub sort: LogSort,
}

impl LogQuery {
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = LogSort {
            field: field.into(),
            order,
        };
        self
    }

    pub(crate) fn run(&self, mut records: Vec<ScanLogRecord>) -> Result<Vec<Value>, StorageError> {
        let projection = self
            .fields
            .iter()
            .map(|f| canonical_field(f))
            .collect::<Result<Vec<_>, _>>()?;
        let sort_field = canonical_field(&self.sort.field)?;

        records.sort_by(|a, b| {
            let ord = compare_on(sort_field, a, b).then_with(|| a.id.cmp(&b.id));
            match self.sort.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });

        let (skip, take) = match self.page_size {
            Some(0) => return Ok(Vec::new()),
            Some(size) => (self.page.saturating_mul(size), size),
            None => (0, usize::MAX),
        };

        records
            .iter()
            .skip(skip)
            .take(take)
            .map(|r| project(r, &projection))
            .collect()
    }
}

/// Accepts wire names and their snake_case spellings.
fn canonical_field(name: &str) -> Result<&'static str, StorageError> {
    let squashed = name.replace('_', "");
    FIELDS
        .iter()
        .copied()
        .find(|f| f.eq_ignore_ascii_case(&squashed))
        .ok_or_else(|| StorageError::UnknownField(name.to_string()))
}

fn compare_on(field: &str, a: &ScanLogRecord, b: &ScanLogRecord) -> Ordering {
    match field {
        "id" => a.id.cmp(&b.id),
        "studentId" => a.student_id.cmp(&b.student_id),
        "studentName" => a.student_name.cmp(&b.student_name),
        "gradeLevel" => a.grade_level.cmp(&b.grade_level),
        "section" => a.section.cmp(&b.section),
        "entryExitStatus" => a
            .entry_exit_status
            .as_str()
            .cmp(b.entry_exit_status.as_str()),
        _ => a.timestamp.cmp(&b.timestamp),
    }
}

fn project(record: &ScanLogRecord, fields: &[&str]) -> Result<Value, StorageError> {
    let Value::Object(full) = serde_json::to_value(record)? else {
        return Err(StorageError::InvalidRecord(record.id.clone()));
    };
    if fields.is_empty() {
        return Ok(Value::Object(full));
    }
    let mut out = Map::new();
    for field in fields {
        if let Some(v) = full.get(*field) {
            out.insert((*field).to_string(), v.clone());
        }
    }
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_resolve_in_both_spellings() {
        assert_eq!(canonical_field("student_id").unwrap(), "studentId");
        assert_eq!(canonical_field("entryExitStatus").unwrap(), "entryExitStatus");
        assert!(matches!(
            canonical_field("shoeSize"),
            Err(StorageError::UnknownField(_))
        ));
    }
}
