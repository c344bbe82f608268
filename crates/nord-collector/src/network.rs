use crate::{CollectOptions, CollectorContext, Plugin};
use anyhow::Result;
use async_trait::async_trait;
use nord_common::types::{Metric, MetricType, MetricValue, PluginResult};
use std::collections::HashMap;
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// TCP reachability probes, plus the perception (discovery) command.
pub struct NetworkPlugin;

#[async_trait]
impl Plugin for NetworkPlugin {
    fn name(&self) -> &'static str {
        "Network"
    }

    async fn on_command(
        &self,
        ctx: &CollectorContext,
        args: &HashMap<String, String>,
    ) -> Result<()> {
        match args.get("action").map(String::as_str) {
            Some("perception") => crate::perception::run_perception(ctx).await,
            other => anyhow::bail!("unknown command for Network plugin: {other:?}"),
        }
    }

    async fn on_collect(
        &self,
        _ctx: &CollectorContext,
        options: &CollectOptions,
    ) -> Result<PluginResult> {
        let address = options.host.address.as_str();

        let (label, category, open) = match options.action.as_str() {
            "ssh" => {
                let port = options
                    .credentials
                    .as_ref()
                    .map(|c| c.port)
                    .filter(|p| *p != 0)
                    .unwrap_or(22);
                (
                    format!("SSH-{port}"),
                    "network",
                    is_port_open(address, port).await,
                )
            }
            "url" => (
                "URL".to_string(),
                "Web",
                is_port_open(address, 80).await || is_port_open(address, 443).await,
            ),
            "ping" => (
                "ping".to_string(),
                "network",
                is_port_open(address, 80).await || is_port_open(address, 22).await,
            ),
            other => anyhow::bail!("undefined network action: {other}"),
        };

        let metric = Metric {
            category: category.to_string(),
            name: label.clone(),
            label: label.clone(),
            value: MetricValue::Text(if open { "up" } else { "down" }.to_string()),
            metric_type: MetricType::Status,
            instance: None,
            extra: Default::default(),
        };

        Ok(PluginResult::default().with_metric(&label, metric))
    }
}

/// True when a TCP connect to `host:port` succeeds within the probe
/// timeout.
pub async fn is_port_open(host: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(
            PROBE_TIMEOUT,
            tokio::net::TcpStream::connect((host, port)),
        )
        .await,
        Ok(Ok(_))
    )
}
