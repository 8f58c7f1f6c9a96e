//! Enqueue command implementation.

use super::warn_if_ephemeral;
use crate::core::config::Config;
use crate::mdm::Command;
use crate::store::MdmStore;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Queue a command for one or more enrollments.
#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Command property list.
    #[arg(long)]
    pub command: PathBuf,

    /// Enrollment ids.
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Run the enqueue command. Fails if any enrollment could not be queued.
pub fn run_enqueue(args: EnqueueArgs, config: &Config) -> Result<()> {
    let raw = std::fs::read(&args.command)
        .with_context(|| format!("failed to read command {:?}", args.command))?;
    let command = Command::decode(&raw).context("invalid command plist")?;

    warn_if_ephemeral(config);
    let store = MdmStore::open(config)?;
    let ctx = store.context();

    let failures = store.queue().enqueue_command(&ctx, &args.ids, &command);
    for (id, err) in &failures {
        eprintln!("{id}: {err}");
    }

    let queued = args.ids.len() - failures.len();
    println!(
        "Queued {} ({}) for {queued} of {} enrollments",
        command.command_uuid,
        command.request_type,
        args.ids.len()
    );
    if !failures.is_empty() {
        anyhow::bail!("{} enrollments failed", failures.len());
    }
    Ok(())
}
