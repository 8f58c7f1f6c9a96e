//! CLI command implementations.

mod compact;
mod config;
mod enqueue;
mod init;
mod inspect;
mod push_cert;

pub use compact::{run_compact, CompactArgs};
pub use config::{run_config, ConfigArgs};
pub use enqueue::{run_enqueue, EnqueueArgs};
pub use init::{run_init, InitArgs};
pub use inspect::{run_inspect, InspectArgs};
pub use push_cert::{run_push_cert, PushCertArgs};

use crate::core::config::Config;
use crate::storage::{CompactionPolicy, FileTable, FileTableOptions, BACKEND_FILE, BACKEND_MEMORY};
use anyhow::{Context, Result};

/// Open the configured table as a [`FileTable`], for file-only commands.
fn open_file_table(config: &Config) -> Result<FileTable> {
    if config.storage.backend != BACKEND_FILE {
        anyhow::bail!(
            "this command needs the file backend, configured backend is {}",
            config.storage.backend
        );
    }
    let options = FileTableOptions {
        compaction: CompactionPolicy::from(&config.storage.compaction),
        ..Default::default()
    };
    FileTable::open(&config.storage.data_dir, &config.storage.table_name, options)
        .with_context(|| format!("failed to open table in {}", config.storage.data_dir))
}

/// Warn that writes to the memory backend do not outlive the process.
fn warn_if_ephemeral(config: &Config) {
    if config.storage.backend == BACKEND_MEMORY {
        tracing::warn!("memory backend: nothing is persisted once this command exits");
    }
}
