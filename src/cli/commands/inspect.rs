//! Inspect command implementation.

use super::{open_file_table, warn_if_ephemeral};
use crate::core::config::Config;
use crate::schema::DeviceRecord;
use crate::store::MdmStore;
use anyhow::Result;
use clap::{Args, Subcommand};

/// Inspect stored records.
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(subcommand)]
    pub command: InspectCommand,
}

/// Inspect subcommands.
#[derive(Subcommand, Debug)]
pub enum InspectCommand {
    /// Decoded rows of one enrollment.
    Device {
        /// Enrollment id.
        id: String,
    },
    /// Commands queued for one enrollment.
    Queue {
        /// Enrollment id.
        id: String,
    },
    /// Enrollments bound to a certificate hash.
    Hash {
        /// Hex SHA-256 of the certificate.
        hash: String,
    },
    /// File backend statistics.
    Stats,
}

/// Run the inspect command.
pub fn run_inspect(args: InspectArgs, config: &Config) -> Result<()> {
    if let InspectCommand::Stats = args.command {
        let stats = open_file_table(config)?.stats()?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    warn_if_ephemeral(config);
    let store = MdmStore::open(config)?;
    let ctx = store.context();

    match args.command {
        InspectCommand::Device { id } => {
            let records = store.enrollments().device_records(&ctx, &id)?;
            if records.is_empty() {
                println!("No records for {id}");
            }
            for record in &records {
                println!("{:<32} {}", record.category(), describe(record));
            }
        }
        InspectCommand::Queue { id } => {
            let commands = store.queue().list_commands(&ctx, &id)?;
            if commands.is_empty() {
                println!("No commands for {id}");
            }
            for cmd in commands {
                println!(
                    "{}  {:<28} {:<14} {:<14} enqueued {}  updated {}",
                    cmd.command_uuid,
                    cmd.request_type,
                    cmd.status,
                    cmd.report_status.as_deref().unwrap_or("-"),
                    cmd.enqueued_at,
                    cmd.last_updated
                );
            }
        }
        InspectCommand::Hash { hash } => {
            let devices = store.cert_auth().devices_for_cert_hash(&ctx, &hash)?;
            if devices.is_empty() {
                println!("No enrollment bound to {hash}");
            }
            for device in devices {
                println!("{device}");
            }
        }
        InspectCommand::Stats => {}
    }
    Ok(())
}

/// One-line summary of a device row.
fn describe(record: &DeviceRecord) -> String {
    match record {
        DeviceRecord::Authenticate(r) => {
            format!("serial={} cert={} bytes", r.serial_number, r.cert_pem.len())
        }
        DeviceRecord::TokenUpdate(r) => format!("{} bytes", r.raw.len()),
        DeviceRecord::TokenUpdateTally(r) => format!("tally={}", r.tally),
        DeviceRecord::UnlockToken(r) => format!("{} bytes", r.token.len()),
        DeviceRecord::BootstrapToken(r) => format!("{} bytes", r.token.len()),
        DeviceRecord::UserAuthenticate(r) => format!("{} bytes", r.raw.len()),
        DeviceRecord::CertHash(r) => format!("hash={}", r.hash),
        DeviceRecord::Disabled(r) => format!("since {}", r.disabled_at),
    }
}
