//! One-shot commands to the device driving the extinguisher motors.
//!
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;

/// Longest part of the device's answer that is passed on.
pub const MAX_REPLY_CHARS: usize = 200;

/// What the device answered.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayReply {
    pub status: u16,
    pub body: String,
}

/// Send `cmd` as `GET <base_url>/motorcmds?cmd=<cmd>` and return the answer without
/// interpreting it. There is no retry.
pub async fn send_command(
    client: &Client,
    base_url: &str,
    cmd: &str,
    timeout: Duration,
) -> Result<RelayReply> {
    let url = format!("{}/motorcmds", base_url.trim_end_matches('/'));
    log::info!("Sending command {:?} to {}", cmd, url);

    let resp = client
        .get(&url)
        .query(&[("cmd", cmd)])
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("failed to reach device at {url}"))?;

    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .context("failed to read the device reply")?;

    Ok(RelayReply {
        status,
        body: truncate(&body, MAX_REPLY_CHARS),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
