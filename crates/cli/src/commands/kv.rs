// SPDX-License-Identifier: MIT

//! `flowd kv get|put|delete|scan`. Values travel base64-encoded on the
//! wire; this command accepts/emits plain text and does
//! the base64 conversion locally so callers don't have to.

use crate::client::FlowdClient;
use crate::output::{format_or_json, OutputFormat};
use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct KvArgs {
    #[command(subcommand)]
    pub command: KvCommand,
}

#[derive(Subcommand)]
pub enum KvCommand {
    /// Fetch a value
    Get { namespace: String, key: String },
    /// Store a value
    Put { namespace: String, key: String, value: String },
    /// Delete a value
    Delete { namespace: String, key: String },
    /// Scan a namespace
    Scan {
        namespace: String,
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

pub async fn run(client: &FlowdClient, args: KvArgs, format: OutputFormat) -> Result<()> {
    match args.command {
        KvCommand::Get { namespace, key } => {
            let entry = client.kv_get(&namespace, &key).await?;
            let decoded = entry.get("value").and_then(|v| v.as_str()).map(decode_lossy).unwrap_or_default();
            format_or_json(format, &entry, || println!("{decoded}"))
        }
        KvCommand::Put { namespace, key, value } => {
            client.kv_put(&namespace, &key, &STANDARD.encode(value.as_bytes())).await?;
            println!("ok");
            Ok(())
        }
        KvCommand::Delete { namespace, key } => {
            client.kv_delete(&namespace, &key).await?;
            println!("ok");
            Ok(())
        }
        KvCommand::Scan { namespace, prefix, limit } => {
            let prefix_b64 = prefix.map(|p| STANDARD.encode(p.as_bytes()));
            let page = client.kv_scan(&namespace, prefix_b64.as_deref(), None, limit).await?;
            format_or_json(format, &page, || {
                if let Some(entries) = page.get("entries").and_then(|v| v.as_array()) {
                    for entry in entries {
                        let key = entry.get("key").and_then(|v| v.as_str()).map(decode_lossy).unwrap_or_default();
                        let value = entry.get("value").and_then(|v| v.as_str()).map(decode_lossy).unwrap_or_default();
                        println!("{key}\t{value}");
                    }
                }
            })
        }
    }
}

fn decode_lossy(b64: &str) -> String {
    STANDARD.decode(b64).map(|bytes| String::from_utf8_lossy(&bytes).into_owned()).unwrap_or_else(|_| b64.to_string())
}
