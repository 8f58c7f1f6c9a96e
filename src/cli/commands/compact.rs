//! Compact command implementation.

use super::open_file_table;
use crate::core::config::Config;
use anyhow::Result;
use clap::Args;

/// Snapshot the file backend and truncate its log.
#[derive(Args, Debug)]
pub struct CompactArgs {
    // No additional arguments - storage comes from the global config
}

/// Run the compact command.
pub fn run_compact(_args: CompactArgs, config: &Config) -> Result<()> {
    let table = open_file_table(config)?;
    let before = table.stats()?;
    let meta = table.compact()?;
    let after = table.stats()?;

    println!(
        "Compacted {}: snapshot at seq {} ({} items), segments {} -> {}",
        config.storage.table_name,
        meta.last_seq,
        meta.item_count,
        before.segment_count,
        after.segment_count
    );
    Ok(())
}
