// SPDX-License-Identifier: MIT

//! flowd — thin HTTP/JSON client over the daemon's API.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::FlowdClient;
use commands::{events, health, jobs, kv, runs, sources};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "flowd", version, about = "Client for the flowd run control plane")]
struct Cli {
    /// Daemon base URL (defaults to $FLWD_ADDR or http://127.0.0.1:8080)
    #[arg(long, global = true)]
    addr: Option<String>,

    /// Bearer token (defaults to $FLWD_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discovered job catalog
    Jobs(jobs::JobsArgs),
    /// Run lifecycle
    Runs(runs::RunsArgs),
    /// Source manager
    Sources(sources::SourcesArgs),
    /// Rule-Y KV store
    Kv(kv::KvArgs),
    /// Event plane
    Events(events::EventsArgs),
    /// Daemon health check
    Health,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())).init();

    let cli = Cli::parse();
    let addr = cli.addr.or_else(|| std::env::var("FLWD_ADDR").ok()).unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
    let token = cli.token.or_else(|| std::env::var("FLWD_TOKEN").ok());
    let client = FlowdClient::new(addr, token);

    match cli.command {
        Commands::Jobs(args) => jobs::run(&client, args, cli.output).await,
        Commands::Runs(args) => runs::run(&client, args, cli.output).await,
        Commands::Sources(args) => sources::run(&client, args, cli.output).await,
        Commands::Kv(args) => kv::run(&client, args, cli.output).await,
        Commands::Events(args) => events::run(&client, args).await,
        Commands::Health => health::run(&client, cli.output).await,
    }
}
