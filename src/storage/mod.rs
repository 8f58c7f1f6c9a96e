//! Storage layer.
//!
//! A sparse table addressed by (partition key, sort key). Backends offer
//! only single-item writes and partition-scoped queries; every MDM record
//! type is laid out on top of this in [`crate::schema`].
//!
//! # Modules
//!
//! - [`item`] - Row model and query filters
//! - [`table`] - The `KeyValueTable` trait and typed record access
//! - [`memory`] - In-memory backend
//! - [`wal`] - Durable backend: write-ahead log plus snapshots
//! - [`compaction`] - Snapshot/truncate policy for the durable backend

pub mod compaction;
pub mod item;
pub mod memory;
pub mod table;
pub mod wal;

use crate::core::config::StorageConfig;
use crate::core::error::{StoreError, StoreResult};
use std::sync::Arc;

// Re-exports for convenience
pub use compaction::{CompactionPolicy, TableStats};
pub use item::{AttributeValue, Filter, Item, ItemKey};
pub use memory::MemoryTable;
pub use table::{KeyValueTable, Record, TableExt};
pub use wal::{FileTable, FileTableOptions, Snapshot, SnapshotMeta, WalEntry, WalOp, WalSegment};

/// Backend name for [`MemoryTable`].
pub const BACKEND_MEMORY: &str = "memory";
/// Backend name for [`FileTable`].
pub const BACKEND_FILE: &str = "file";

/// Open the table described by the storage configuration.
pub fn open_table(config: &StorageConfig) -> StoreResult<Arc<dyn KeyValueTable>> {
    match config.backend.as_str() {
        BACKEND_MEMORY => Ok(Arc::new(MemoryTable::new(&config.table_name))),
        BACKEND_FILE => {
            let options = FileTableOptions {
                compaction: CompactionPolicy::from(&config.compaction),
                ..Default::default()
            };
            let table = FileTable::open(&config.data_dir, &config.table_name, options)?;
            Ok(Arc::new(table))
        }
        other => Err(StoreError::invalid_input(format!(
            "unknown storage backend: {other}"
        ))),
    }
}
