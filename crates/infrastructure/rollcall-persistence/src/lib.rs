mod api;
mod codec;
mod error;
mod maintenance;
mod query;
mod redb_store;

pub use api::*;
pub use error::*;
pub use query::{LogQuery, LogSort, SortOrder};
pub use redb_store::RedbLogStore;
