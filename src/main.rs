//! mdmkv - unified CLI entrypoint.
//!
//! Usage:
//!   mdmkv config validate --config mdmkv.toml
//!   mdmkv init --backend file --data-dir data
//!   mdmkv inspect device <ID>
//!   mdmkv inspect queue <ID>
//!   mdmkv push-cert store --cert push.pem --key push.key
//!   mdmkv enqueue --command cmd.plist <ID>...
//!   mdmkv compact

use anyhow::Result;
use clap::Parser;
use mdmkv::cli::commands::{
    run_compact, run_config, run_enqueue, run_init, run_inspect, run_push_cert,
};
use mdmkv::cli::{init_tracing, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_tracing(&config.telemetry.log_level);

    match cli.command {
        Commands::Config(args) => run_config(args, &config),
        Commands::Init(args) => run_init(args, &config),
        Commands::Inspect(args) => run_inspect(args, &config),
        Commands::PushCert(args) => run_push_cert(args, &config),
        Commands::Enqueue(args) => run_enqueue(args, &config),
        Commands::Compact(args) => run_compact(args, &config),
    }
}
