pub mod commands;
pub mod students;

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use camino::Utf8PathBuf;
use clap::ValueEnum;
use rollcall_app_core::FilePersistence;
use rollcall_core::Direction;
use rollcall_persistence::{DbState, LogStore, RedbLogStore, SortOrder};
use tracing::warn;

#[derive(ValueEnum, Clone, Debug, Copy)]
pub enum CliDirection {
    Entry,
    Exit,
}

impl From<CliDirection> for Direction {
    fn from(d: CliDirection) -> Self {
        match d {
            CliDirection::Entry => Direction::Entry,
            CliDirection::Exit => Direction::Exit,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Copy)]
pub enum CliSortOrder {
    Asc,
    Desc,
}

impl From<CliSortOrder> for SortOrder {
    fn from(o: CliSortOrder) -> Self {
        match o {
            CliSortOrder::Asc => SortOrder::Ascending,
            CliSortOrder::Desc => SortOrder::Descending,
        }
    }
}

/// Settings file and log store for one invocation.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub files: FilePersistence,
}

impl Workspace {
    /// `data_dir` overrides the platform directories.
    pub fn open(data_dir: Option<Utf8PathBuf>) -> Result<Self> {
        let files = match data_dir {
            Some(dir) => FilePersistence::in_dir(dir.into_std_path_buf()),
            None => FilePersistence::new()?,
        };
        Ok(Self { files })
    }

    pub fn store(&self) -> Result<Arc<RedbLogStore>> {
        let dir = self.files.data_dir()?;
        let root = Utf8PathBuf::from_path_buf(dir)
            .map_err(|p| anyhow!("Data directory {} is not valid UTF-8", p.display()))?;
        let store = RedbLogStore::new(root);

        match store.validate()? {
            DbState::Missing | DbState::Valid => {}
            DbState::Corrupt => warn!("Log store was corrupt; moved aside and starting fresh"),
            DbState::Busy => bail!("Log store {} is in use by another process", store.path()),
            DbState::NewerSchema { found, supported } => bail!(
                "Log store {} uses schema {} but this build supports {}",
                store.path(),
                found,
                supported
            ),
        }
        Ok(Arc::new(store))
    }
}
