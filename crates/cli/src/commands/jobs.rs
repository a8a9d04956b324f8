// SPDX-License-Identifier: MIT

//! `flowd jobs list`

use crate::client::FlowdClient;
use crate::output::{format_or_json, OutputFormat};
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Subcommand)]
pub enum JobsCommand {
    /// List discovered jobs
    List,
}

pub async fn run(client: &FlowdClient, args: JobsArgs, format: OutputFormat) -> Result<()> {
    match args.command {
        JobsCommand::List => {
            let jobs = client.list_jobs().await?;
            format_or_json(format, &jobs, || {
                if let Some(items) = jobs.as_array() {
                    for job in items {
                        let id = job.get("id").and_then(|v| v.as_str()).unwrap_or("?");
                        let summary = job.get("summary").and_then(|v| v.as_str()).unwrap_or("");
                        println!("{id}\t{summary}");
                    }
                }
            })
        }
    }
}
