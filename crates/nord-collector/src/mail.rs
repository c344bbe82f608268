use crate::{CollectOptions, CollectorContext, Plugin};
use anyhow::{Context, Result};
use async_trait::async_trait;
use nord_common::types::{Metric, MetricType, MetricValue, PluginResult};
use std::collections::HashMap;
use tokio::process::Command;

/// Postfix mail-server collection and control.
pub struct MailPlugin;

#[async_trait]
impl Plugin for MailPlugin {
    fn name(&self) -> &'static str {
        "Mail"
    }

    async fn on_collect(
        &self,
        _ctx: &CollectorContext,
        _options: &CollectOptions,
    ) -> Result<PluginResult> {
        let mut result = PluginResult::default();

        match queue_length().await {
            Ok(n) => result.metrics.insert(
                "queue".to_string(),
                mail_metric("Queue", "Queue", n.to_string()),
            ),
            Err(e) => result
                .metrics
                .insert("queue".to_string(), error_metric("Queue", &e)),
        };

        match is_delivery_paused().await {
            Ok(paused) => result.metrics.insert(
                "delivery".to_string(),
                mail_metric("Delivery", "Send", if paused { "Off" } else { "On" }.to_string()),
            ),
            Err(e) => result
                .metrics
                .insert("delivery".to_string(), error_metric("Delivery", &e)),
        };

        match is_service_running().await {
            Ok(running) => result.metrics.insert(
                "service".to_string(),
                mail_metric("Service", "Server", if running { "Up" } else { "Down" }.to_string()),
            ),
            Err(e) => result
                .metrics
                .insert("service".to_string(), error_metric("Service", &e)),
        };

        Ok(result)
    }

    async fn on_command(
        &self,
        _ctx: &CollectorContext,
        args: &HashMap<String, String>,
    ) -> Result<()> {
        // Each action is a fixed ordered sequence; a non-zero exit aborts
        // the rest of the sequence.
        match args.get("action").map(String::as_str) {
            Some("pause") => {
                run_sequence(&[
                    &["sudo", "postconf", "-e", "defer_transports=smtp"],
                    &["sudo", "postfix", "reload"],
                ])
                .await
            }
            Some("unpause") => {
                run_sequence(&[
                    &["sudo", "postconf", "-e", "defer_transports="],
                    &["sudo", "postfix", "reload"],
                    &["sudo", "postfix", "flush"],
                ])
                .await
            }
            Some("start") => run_sequence(&[&["sudo", "systemctl", "start", "postfix"]]).await,
            Some("stop") => run_sequence(&[&["sudo", "systemctl", "stop", "postfix"]]).await,
            other => anyhow::bail!("unknown action for Mail plugin: {other:?}"),
        }
    }
}

fn mail_metric(name: &str, label: &str, value: String) -> Metric {
    Metric {
        category: "Mail".to_string(),
        name: name.to_string(),
        label: label.to_string(),
        value: MetricValue::Text(value),
        metric_type: MetricType::Text,
        instance: None,
        extra: Default::default(),
    }
}

fn error_metric(label: &str, err: &anyhow::Error) -> Metric {
    mail_metric(label, label, format!("Error: {err}"))
}

/// Count entries in the deferred/active queue via `postqueue -j`, which
/// emits one JSON object per line.
async fn queue_length() -> Result<usize> {
    let output = Command::new("postqueue")
        .arg("-j")
        .output()
        .await
        .context("postqueue -j")?;
    if !output.status.success() {
        anyhow::bail!("postqueue exited with {}", output.status);
    }
    Ok(parse_queue_stream(&output.stdout))
}

fn parse_queue_stream(raw: &[u8]) -> usize {
    let mut count = 0;
    for entry in serde_json::Deserializer::from_slice(raw).into_iter::<serde_json::Value>() {
        match entry {
            Ok(_) => count += 1,
            Err(_) => break,
        }
    }
    count
}

/// Delivery is paused when `defer_transports` equals `smtp`.
async fn is_delivery_paused() -> Result<bool> {
    let output = Command::new("postconf")
        .args(["-h", "defer_transports"])
        .output()
        .await
        .context("postconf -h defer_transports")?;
    if !output.status.success() {
        anyhow::bail!("postconf exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim() == "smtp")
}

/// Substring check on the process listing.
async fn is_service_running() -> Result<bool> {
    let output = Command::new("ps").arg("aux").output().await.context("ps aux")?;
    if !output.status.success() {
        anyhow::bail!("ps exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).contains("postfix/"))
}

async fn run_sequence(commands: &[&[&str]]) -> Result<()> {
    for argv in commands {
        let status = Command::new(argv[0])
            .args(&argv[1..])
            .status()
            .await
            .with_context(|| format!("spawn {}", argv.join(" ")))?;
        if !status.success() {
            anyhow::bail!("'{}' exited with {status}", argv.join(" "));
        }
    }
    Ok(())
}
