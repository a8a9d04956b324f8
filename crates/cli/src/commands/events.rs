// SPDX-License-Identifier: MIT

//! `flowd events tail` — dumps raw SSE frames to stdout.

use crate::client::FlowdClient;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct EventsArgs {
    #[command(subcommand)]
    pub command: EventsCommand,
}

#[derive(Subcommand)]
pub enum EventsCommand {
    /// Stream events for a single run
    Tail {
        run_id: String,
        #[arg(long)]
        since: Option<i64>,
    },
    /// Stream the global event feed
    TailAll {
        #[arg(long)]
        since: Option<i64>,
    },
}

pub async fn run(client: &FlowdClient, args: EventsArgs) -> Result<()> {
    match args.command {
        EventsCommand::Tail { run_id, since } => {
            let path = match since {
                Some(since) => format!("/runs/{run_id}/events?since={since}"),
                None => format!("/runs/{run_id}/events"),
            };
            client.stream_events(&path).await
        }
        EventsCommand::TailAll { since } => {
            let path = match since {
                Some(since) => format!("/events?since={since}"),
                None => "/events".to_string(),
            };
            client.stream_events(&path).await
        }
    }
}
