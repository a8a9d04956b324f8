// SPDX-License-Identifier: MIT

//! `flowd health`

use crate::client::FlowdClient;
use crate::output::{format_or_json, OutputFormat};
use anyhow::Result;

pub async fn run(client: &FlowdClient, format: OutputFormat) -> Result<()> {
    let health = client.healthz().await?;
    format_or_json(format, &health, || println!("{health}"))
}
