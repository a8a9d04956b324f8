// SPDX-License-Identifier: MIT

//! `flowd sources list|get|register|remove`

use crate::client::FlowdClient;
use crate::output::{format_or_json, OutputFormat};
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct SourcesArgs {
    #[command(subcommand)]
    pub command: SourcesCommand,
}

#[derive(Subcommand)]
pub enum SourcesCommand {
    /// List registered sources
    List,
    /// Show one source
    Get { name: String },
    /// Register a local, git, or oci source
    Register {
        name: String,
        #[arg(long = "type", value_parser = ["local", "git", "oci"])]
        kind: String,
        /// Path (local), repo URL (git), or image reference (oci)
        r#ref: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        trusted: bool,
        #[arg(long)]
        verify_signatures: bool,
        #[arg(long)]
        profile: Option<String>,
    },
    /// Remove a source
    Remove { name: String },
}

pub async fn run(client: &FlowdClient, args: SourcesArgs, format: OutputFormat) -> Result<()> {
    match args.command {
        SourcesCommand::List => {
            let sources = client.list_sources().await?;
            format_or_json(format, &sources, || println!("{}", sources))
        }
        SourcesCommand::Get { name } => {
            let source = client.get_source(&name).await?;
            format_or_json(format, &source, || println!("{}", source))
        }
        SourcesCommand::Register { name, kind, r#ref, url, trusted, verify_signatures, profile } => {
            let mut body = serde_json::json!({
                "name": name,
                "type": kind,
                "ref": r#ref,
                "trusted": trusted,
                "verify_signatures": verify_signatures,
            });
            if let Some(url) = url {
                body["url"] = serde_json::Value::String(url);
            }
            if let Some(profile) = profile {
                body["profile"] = serde_json::Value::String(profile);
            }
            let source = client.register_source(&body).await?;
            format_or_json(format, &source, || println!("{}", source))
        }
        SourcesCommand::Remove { name } => {
            client.remove_source(&name).await?;
            println!("removed {name}");
            Ok(())
        }
    }
}
