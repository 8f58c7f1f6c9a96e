//! Init command implementation.

use super::open_file_table;
use crate::core::config::Config;
use crate::storage::BACKEND_FILE;
use anyhow::Result;
use clap::Args;

/// Create the data directory and open the table.
#[derive(Args, Debug)]
pub struct InitArgs {
    // No additional arguments - storage comes from the global config
}

/// Run the init command.
pub fn run_init(_args: InitArgs, config: &Config) -> Result<()> {
    if config.storage.backend != BACKEND_FILE {
        println!(
            "Backend {} keeps no files; nothing to initialize",
            config.storage.backend
        );
        return Ok(());
    }

    let table = open_file_table(config)?;
    let stats = table.stats()?;
    println!(
        "Initialized table {} in {} ({} items)",
        config.storage.table_name, config.storage.data_dir, stats.item_count
    );
    Ok(())
}
