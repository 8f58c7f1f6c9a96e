//! Push certificate command implementation.

use super::warn_if_ephemeral;
use crate::core::config::Config;
use crate::store::MdmStore;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Push certificate operations.
#[derive(Args, Debug)]
pub struct PushCertArgs {
    #[command(subcommand)]
    pub command: PushCertCommand,
}

/// Push certificate subcommands.
#[derive(Subcommand, Debug)]
pub enum PushCertCommand {
    /// Store a certificate and key under the certificate's topic.
    Store {
        /// PEM certificate.
        #[arg(long)]
        cert: PathBuf,
        /// PEM private key (PKCS#8).
        #[arg(long)]
        key: PathBuf,
    },
    /// Show the credential stored for a topic.
    Show {
        /// APNs topic.
        topic: String,
    },
    /// List topics with a stored credential.
    List,
}

/// Run the push-cert command.
pub fn run_push_cert(args: PushCertArgs, config: &Config) -> Result<()> {
    warn_if_ephemeral(config);
    let store = MdmStore::open(config)?;
    let ctx = store.context();

    match args.command {
        PushCertCommand::Store { cert, key } => {
            let cert_pem = std::fs::read(&cert)
                .with_context(|| format!("failed to read certificate {:?}", cert))?;
            let key_pem =
                std::fs::read(&key).with_context(|| format!("failed to read key {:?}", key))?;
            let topic = store.push_certs().store_push_cert(&ctx, &cert_pem, &key_pem)?;
            println!("Stored push certificate for topic {topic}");
        }
        PushCertCommand::Show { topic } => {
            match store.push_certs().retrieve_push_cert(&ctx, &topic)? {
                Some(stored) => {
                    println!("topic:       {}", stored.certificate.topic);
                    println!("not after:   {}", stored.certificate.not_after);
                    println!("stale token: {}", stored.stale_token);
                }
                None => anyhow::bail!("no push certificate for topic {topic}"),
            }
        }
        PushCertCommand::List => {
            for topic in store.push_certs().list_topics(&ctx)? {
                println!("{topic}");
            }
        }
    }
    Ok(())
}
