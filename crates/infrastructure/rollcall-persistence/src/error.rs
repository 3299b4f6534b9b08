#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("rollcall.redb missing")]
    Missing,
    #[error("rollcall.redb schema is invalid or corrupt")]
    Corrupt,
    #[error("rollcall.redb is from a newer rollcall (schema_version={found}, supported={supported})")]
    NewerSchema { found: u32, supported: u32 },
    #[error("rollcall.redb is already open by another process")]
    DatabaseAlreadyOpen,
    #[error("record rejected: {0}")]
    InvalidRecord(String),
    #[error("unknown query field '{0}'")]
    UnknownField(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("redb error: {0}")]
    Backend(Box<redb::Error>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Missing,
    Corrupt,
    NewerSchema,
    Busy,
    Rejected,
    Io,
    Codec,
    Backend,
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::Missing => StorageErrorKind::Missing,
            StorageError::Corrupt => StorageErrorKind::Corrupt,
            StorageError::NewerSchema { .. } => StorageErrorKind::NewerSchema,
            StorageError::DatabaseAlreadyOpen => StorageErrorKind::Busy,
            StorageError::InvalidRecord(_) | StorageError::UnknownField(_) => {
                StorageErrorKind::Rejected
            }
            StorageError::Io(_) => StorageErrorKind::Io,
            StorageError::Serde(_) => StorageErrorKind::Codec,
            StorageError::Backend(_) => StorageErrorKind::Backend,
        }
    }
}

impl From<redb::Error> for StorageError {
    fn from(value: redb::Error) -> Self {
        match value {
            redb::Error::DatabaseAlreadyOpen => Self::DatabaseAlreadyOpen,
            other => Self::Backend(Box::new(other)),
        }
    }
}

macro_rules! via_redb_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(value: $ty) -> Self {
                    redb::Error::from(value).into()
                }
            }
        )*
    };
}

via_redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
