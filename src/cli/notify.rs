//! Notification enrichment command

use std::path::Path;

use anyhow::Context;
use tunnel_core::notification::{ImageFetcher, NotificationContent};

/// Read a notification payload, attach its image and print the result as JSON
pub async fn run_notify(payload: &Path) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(payload)
        .with_context(|| format!("Failed to read {}", payload.display()))?;
    let content: NotificationContent =
        serde_json::from_str(&contents).context("Invalid notification payload")?;

    let fetcher = ImageFetcher::with_defaults()?;
    let enriched = fetcher.enrich(content).await;

    println!("{}", serde_json::to_string_pretty(&enriched)?);
    Ok(())
}
