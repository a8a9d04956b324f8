// SPDX-License-Identifier: MIT

//! `flowd runs create|list|get|cancel`

use crate::client::{encode_args, FlowdClient};
use crate::output::{format_or_json, OutputFormat};
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct RunsArgs {
    #[command(subcommand)]
    pub command: RunsCommand,
}

#[derive(Subcommand)]
pub enum RunsCommand {
    /// Start a run of the named job
    Create {
        job: String,
        /// Argument in `name=value` form (value parsed as JSON, falling
        /// back to a plain string). Repeatable.
        #[arg(long = "arg", value_parser = parse_key_value)]
        args: Vec<(String, String)>,
        #[arg(long)]
        profile: Option<String>,
        /// Idempotency-Key header; a fresh one is generated if omitted.
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// List runs
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one run
    Get { id: String },
    /// Request cancellation of a run
    Cancel { id: String },
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) => Ok((k.to_string(), v.to_string())),
        None => Err(format!("expected name=value, got '{raw}'")),
    }
}

pub async fn run(client: &FlowdClient, args: RunsArgs, format: OutputFormat) -> Result<()> {
    match args.command {
        RunsCommand::Create { job, args, profile, idempotency_key } => {
            let mut body = serde_json::json!({ "job_id": job, "args": encode_args(&args) });
            if let Some(profile) = profile {
                body["profile"] = serde_json::Value::String(profile);
            }
            let key = idempotency_key.unwrap_or_else(|| format!("flowd-cli-{}", uuid::Uuid::new_v4()));
            let run = client.create_run(&body, &key).await?;
            format_or_json(format, &run, || println!("{}", run))
        }
        RunsCommand::List { status, offset, limit } => {
            let page = client.list_runs(status.as_deref(), offset, limit).await?;
            format_or_json(format, &page, || println!("{}", page))
        }
        RunsCommand::Get { id } => {
            let run = client.get_run(&id).await?;
            format_or_json(format, &run, || println!("{}", run))
        }
        RunsCommand::Cancel { id } => {
            let run = client.cancel_run(&id).await?;
            format_or_json(format, &run, || println!("{}", run))
        }
    }
}
