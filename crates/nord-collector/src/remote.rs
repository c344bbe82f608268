use crate::{CollectorContext, Plugin};
use anyhow::{Context, Result};
use async_trait::async_trait;
use nord_common::config::{Config, Destination};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Uploads the latest snapshot to the configured remote destinations.
pub struct RemotePlugin;

#[async_trait]
impl Plugin for RemotePlugin {
    fn name(&self) -> &'static str {
        "Api"
    }

    async fn on_command(
        &self,
        _ctx: &CollectorContext,
        args: &HashMap<String, String>,
    ) -> Result<()> {
        match args.get("action").map(String::as_str) {
            Some("send") => send_remote_data(Path::new("data")).await,
            other => anyhow::bail!("unknown command for Api plugin: {other:?}"),
        }
    }
}

async fn send_remote_data(data_dir: &Path) -> Result<()> {
    println!("--- Sending data to remote servers ---");

    let (config, _) = Config::load(&data_dir.join("config.json"))?;

    let collection_raw = std::fs::read_to_string(data_dir.join("collection.json"))
        .context("could not read collection.json")?;
    let collection: serde_json::Value =
        serde_json::from_str(&collection_raw).context("could not parse collection.json")?;

    let client = reqwest::Client::builder()
        .timeout(SEND_TIMEOUT)
        .build()
        .context("build HTTP client")?;

    for (name, dest) in &config.remote.destinations {
        if !dest.active {
            println!("  |_ Skipping destination '{name}' (inactive)");
            continue;
        }
        println!("  |_ Contacting destination: {name} ({})", dest.endpoint);

        match send_to_destination(&client, dest, &collection, &config).await {
            Ok(()) => println!("      |_ Success."),
            Err(e) => println!("      !_ Error: {e}"),
        }
    }

    Ok(())
}

/// Wire format: form-encoded `json_payload` (the snapshot wrapped under
/// "collection") and `hosts`, with a bearer token.
async fn send_to_destination(
    client: &reqwest::Client,
    dest: &Destination,
    collection: &serde_json::Value,
    config: &Config,
) -> Result<()> {
    let payload = serde_json::json!({ "collection": collection });
    let json_payload =
        serde_json::to_string(&payload).context("failed to marshal collection payload")?;
    let hosts = serde_json::to_string(&config.hosts).context("failed to marshal hosts payload")?;

    let response = client
        .post(&dest.endpoint)
        .bearer_auth(&dest.token)
        .form(&[("json_payload", json_payload), ("hosts", hosts)])
        .send()
        .await
        .context("failed to send request")?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    println!("      |_ Server response: {body}");

    if status.is_client_error() || status.is_server_error() {
        anyhow::bail!("server returned error status: {status}");
    }
    Ok(())
}
