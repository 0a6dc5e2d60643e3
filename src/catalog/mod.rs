//! Durable catalog of discovered files.

mod model;
mod store;

pub use model::{Collection, DownloadStatus, FileFormat, FileRecord};
pub use store::{
    CatalogError, CatalogStats, CatalogStore, ListFilter, SqliteCatalog, StateUpdate,
    UpsertOutcome,
};
