//! Concurrent UDP listeners for IPFIX, NetFlow v9, and sFlow telemetry.
//!
//! Each protocol gets its own socket and worker; all three share the same
//! store. NetFlow v9 and IPFIX keep one parser per exporter IP — the
//! parser owns the template cache, so data packets for templates that
//! have not arrived yet decode to nothing and are dropped. Decode errors
//! are dropped too (flow transport is lossy by design), with a debug
//! trace naming the sender.

pub mod sflow;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use netflow_parser::{NetflowPacket, NetflowParser};
use nord_collector::{CollectorContext, Plugin};
use nord_storage::{FlowRecord, Store};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

pub const IPFIX_PORT: u16 = 4739;
pub const NETFLOW9_PORT: u16 = 2055;
pub const SFLOW_PORT: u16 = 6343;

/// Which decoder a listener runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowProtocol {
    Ipfix,
    Netflow9,
}

/// The three flow listeners and their shared store.
pub struct FlowCollector {
    pub ipfix_port: u16,
    pub netflow_port: u16,
    pub sflow_port: u16,
    store: Option<Arc<Store>>,
}

impl FlowCollector {
    pub fn new(store: Option<Arc<Store>>) -> Self {
        FlowCollector {
            ipfix_port: IPFIX_PORT,
            netflow_port: NETFLOW9_PORT,
            sflow_port: SFLOW_PORT,
            store,
        }
    }

    /// Run all three listeners until one fails to bind or read.
    pub async fn run(&self) -> Result<()> {
        let ipfix = tokio::spawn(listen_netflow(
            self.ipfix_port,
            FlowProtocol::Ipfix,
            self.store.clone(),
        ));
        let netflow = tokio::spawn(listen_netflow(
            self.netflow_port,
            FlowProtocol::Netflow9,
            self.store.clone(),
        ));
        let sflow = tokio::spawn(listen_sflow(self.sflow_port, self.store.clone()));

        tracing::info!("flow collector running, waiting for telemetry");
        let (a, b, c) = tokio::try_join!(ipfix, netflow, sflow).context("flow worker panicked")?;
        a.and(b).and(c)
    }
}

fn flow_record(peer: IpAddr, flow_type: &str, payload: serde_json::Value) -> FlowRecord {
    let ip = peer.to_string();
    FlowRecord {
        host_key: ip.clone(),
        host_name: ip.clone(),
        host_address: ip,
        flow_type: flow_type.to_string(),
        payload,
        collected_at: Utc::now(),
    }
}

/// Hand a record to the store without blocking the listener loop.
fn write_async(store: &Option<Arc<Store>>, record: FlowRecord) {
    match store {
        Some(store) => {
            let store = store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.write_flows(&[record]).await {
                    tracing::warn!(error = %e, "flow write failed");
                }
            });
        }
        None => tracing::debug!(flow_type = %record.flow_type, "no store attached, dropping flow"),
    }
}

async fn listen_netflow(
    port: u16,
    protocol: FlowProtocol,
    store: Option<Arc<Store>>,
) -> Result<()> {
    let flow_type = match protocol {
        FlowProtocol::Ipfix => "ipfix",
        FlowProtocol::Netflow9 => "netflow9",
    };
    let socket = UdpSocket::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("{flow_type}: bind UDP :{port}"))?;
    tracing::info!(port, flow_type, "listening");

    // Template caches are per exporter: one parser per sender IP.
    let mut parsers: HashMap<IpAddr, NetflowParser> = HashMap::new();
    let mut buf = vec![0u8; 65_535];

    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(flow_type, error = %e, "recv failed");
                continue;
            }
        };

        let parser = parsers.entry(peer.ip()).or_default();
        for packet in parser.parse_bytes(&buf[..len]) {
            let payload = match (protocol, packet) {
                (FlowProtocol::Ipfix, NetflowPacket::IPFix(msg)) => {
                    if msg.flowsets.is_empty() {
                        continue;
                    }
                    serde_json::to_value(&msg).ok()
                }
                (FlowProtocol::Netflow9, NetflowPacket::V9(msg)) => {
                    if msg.flowsets.is_empty() {
                        continue;
                    }
                    serde_json::to_value(&msg).ok()
                }
                (_, NetflowPacket::Error(e)) => {
                    tracing::debug!(flow_type, peer = %peer, error = ?e, "decode error");
                    continue;
                }
                // A packet of the other protocol family on this port.
                _ => continue,
            };

            if let Some(payload) = payload {
                write_async(&store, flow_record(peer.ip(), flow_type, payload));
            }
        }
    }
}

async fn listen_sflow(port: u16, store: Option<Arc<Store>>) -> Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("sflow: bind UDP :{port}"))?;
    tracing::info!(port, flow_type = "sflow", "listening");

    let mut buf = vec![0u8; 65_535];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(flow_type = "sflow", error = %e, "recv failed");
                continue;
            }
        };

        match sflow::decode(&buf[..len]) {
            Ok(datagram) if !datagram.samples.is_empty() => {
                if let Ok(payload) = serde_json::to_value(&datagram) {
                    write_async(&store, flow_record(peer.ip(), "sflow", payload));
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(flow_type = "sflow", peer = %peer, error = %e, "decode error"),
        }
    }
}

/// Registry adapter so `-p flow -a listen` starts the listeners.
pub struct FlowPlugin;

#[async_trait]
impl Plugin for FlowPlugin {
    fn name(&self) -> &'static str {
        "Flow"
    }

    async fn on_command(
        &self,
        ctx: &CollectorContext,
        args: &HashMap<String, String>,
    ) -> Result<()> {
        match args.get("action").map(String::as_str) {
            Some("listen") => FlowCollector::new(ctx.store.clone()).run().await,
            other => anyhow::bail!("unknown command for Flow plugin: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_record_uses_sender_ip_for_all_host_fields() {
        let record = flow_record(
            "192.0.2.7".parse().unwrap(),
            "sflow",
            serde_json::json!({"samples": 1}),
        );
        assert_eq!(record.host_key, "192.0.2.7");
        assert_eq!(record.host_name, "192.0.2.7");
        assert_eq!(record.host_address, "192.0.2.7");
        assert_eq!(record.flow_type, "sflow");
    }

    #[test]
    fn default_ports_match_protocol_assignments() {
        let collector = FlowCollector::new(None);
        assert_eq!(collector.ipfix_port, 4739);
        assert_eq!(collector.netflow_port, 2055);
        assert_eq!(collector.sflow_port, 6343);
    }
}
