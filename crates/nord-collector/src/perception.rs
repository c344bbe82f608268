use crate::{dispatch_collect, CollectOptions, CollectorContext, HostRef};
use anyhow::{Context, Result};
use chrono::Utc;
use nord_storage::MetricRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;

/// The discovery inventory written to `data/perception.json` and merged
/// into the host set by the collection engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerceptionInventory {
    #[serde(default)]
    pub hosts: BTreeMap<String, PerceptionHost>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerceptionHost {
    #[serde(default)]
    pub address: String,
    /// Detected `plugin.action` probes, in detection order.
    #[serde(default)]
    pub collect: Vec<String>,
}

/// Sweep every enabled perception environment, probe the hosts that answer,
/// and persist the inventory.
pub async fn run_perception(ctx: &CollectorContext) -> Result<()> {
    run_perception_into(ctx, Path::new("data")).await
}

pub async fn run_perception_into(ctx: &CollectorContext, data_dir: &Path) -> Result<()> {
    println!("--- Starting Network Perception ---");

    let (config, _) = nord_common::config::Config::load(&data_dir.join("config.json"))?;

    let mut inventory = PerceptionInventory::default();

    for (name, env) in &config.perception {
        if !env.enabled {
            println!("    |_ Skipping environment '{name}' (disabled)");
            continue;
        }
        println!("    |_ Scanning environment: {name}");

        if env.method != "nmap" {
            continue;
        }

        println!("        |_ Running nmap on ranges: {}", env.ranges.join(" "));
        let output = Command::new("sudo")
            .args(["nmap", "-sn", "-oX", "-"])
            .args(&env.ranges)
            .output()
            .await;
        let output = match output {
            Ok(out) if out.status.success() => out,
            Ok(out) => {
                println!("          !_ nmap command failed: {}", out.status);
                continue;
            }
            Err(e) => {
                println!("          !_ nmap command failed: {e}");
                continue;
            }
        };

        let xml = String::from_utf8_lossy(&output.stdout);
        let live = match parse_nmap_hosts(&xml) {
            Ok(hosts) => hosts,
            Err(e) => {
                println!("          !_ Failed to parse nmap XML: {e}");
                continue;
            }
        };

        for ip in live {
            println!("        |_ Found host: {ip}");
            let detected = test_host(ctx, &ip, &env.detection).await;
            inventory.hosts.insert(
                ip.clone(),
                PerceptionHost {
                    address: ip,
                    collect: detected,
                },
            );
        }
    }

    let json = serde_json::to_string_pretty(&inventory)
        .context("failed to marshal perception results")?;
    std::fs::write(data_dir.join("perception.json"), json)
        .context("failed to write perception.json")?;

    if let Some(store) = &ctx.store {
        write_inventory_to_store(store, &inventory).await;
    }

    println!("--- Network Perception Finished ---");
    Ok(())
}

/// Extract the IPv4 addresses of hosts reported up in nmap `-oX` output.
pub fn parse_nmap_hosts(xml: &str) -> Result<Vec<String>> {
    let doc = roxmltree::Document::parse(xml).context("invalid nmap XML")?;
    let mut live = Vec::new();

    for host in doc.descendants().filter(|n| n.has_tag_name("host")) {
        let up = host
            .children()
            .find(|n| n.has_tag_name("status"))
            .and_then(|n| n.attribute("state"))
            == Some("up");
        if !up {
            continue;
        }

        let ip = host
            .children()
            .filter(|n| n.has_tag_name("address"))
            .find(|n| n.attribute("addrtype") == Some("ipv4"))
            .and_then(|n| n.attribute("addr"));
        if let Some(ip) = ip {
            live.push(ip.to_string());
        }
    }

    Ok(live)
}

/// Run each detection probe against `ip`; keep the probes whose result
/// contains any metric with value "up".
async fn test_host(ctx: &CollectorContext, ip: &str, detection: &[String]) -> Vec<String> {
    println!("            |_ Testing services on {ip}...");
    let mut detected = Vec::new();

    for probe in detection {
        let Some((plugin, action)) = probe.split_once('.') else {
            continue;
        };

        let options = CollectOptions {
            host: HostRef {
                key: ip.to_string(),
                name: ip.to_string(),
                address: ip.to_string(),
            },
            action: action.to_string(),
            metric: probe.clone(),
            credential_name: None,
            credentials: None,
        };

        let Ok(result) = dispatch_collect(ctx, plugin, &options).await else {
            continue;
        };

        if result
            .metrics
            .values()
            .any(|m| m.value.as_str() == Some("up"))
        {
            detected.push(probe.clone());
        }
    }

    detected
}

/// One status=up metric per detected service, category "discovery", so the
/// hosts table is populated and detection history stays queryable.
async fn write_inventory_to_store(store: &nord_storage::Store, inventory: &PerceptionInventory) {
    let now = Utc::now();
    let mut records = Vec::new();

    for (ip, host) in &inventory.hosts {
        for service in &host.collect {
            let (plugin, action) = service.split_once('.').unwrap_or((service.as_str(), ""));
            records.push(MetricRecord {
                host_key: ip.clone(),
                host_name: ip.clone(),
                host_address: ip.clone(),
                plugin: plugin.to_string(),
                name: action.to_string(),
                category: "discovery".to_string(),
                metric_type: "status".to_string(),
                value: "up".to_string(),
                instance: None,
                extra: Default::default(),
                collected_at: now,
            });
        }
    }

    if records.is_empty() {
        return;
    }
    match store.write_batch(&records).await {
        Ok(()) => println!("  |_ store: wrote {} perception records", records.len()),
        Err(e) => println!("  !_ store: perception WriteBatch error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NMAP_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<nmaprun scanner="nmap" args="nmap -sn -oX - 10.0.0.0/30">
  <host><status state="up" reason="arp-response"/>
    <address addr="10.0.0.1" addrtype="ipv4"/>
    <address addr="aa:bb:cc:00:11:22" addrtype="mac"/>
  </host>
  <host><status state="down" reason="no-response"/>
    <address addr="10.0.0.2" addrtype="ipv4"/>
  </host>
  <host><status state="up" reason="syn-ack"/>
    <address addr="10.0.0.3" addrtype="ipv4"/>
    <hostnames><hostname name="gw.lan" type="PTR"/></hostnames>
  </host>
</nmaprun>"#;

    #[test]
    fn parses_live_ipv4_hosts() {
        let hosts = parse_nmap_hosts(NMAP_XML).unwrap();
        assert_eq!(hosts, vec!["10.0.0.1".to_string(), "10.0.0.3".to_string()]);
    }

    #[test]
    fn rejects_invalid_xml() {
        assert!(parse_nmap_hosts("<nmaprun>").is_err());
    }

    #[test]
    fn inventory_round_trips() {
        let mut inventory = PerceptionInventory::default();
        inventory.hosts.insert(
            "10.0.0.5".to_string(),
            PerceptionHost {
                address: "10.0.0.5".to_string(),
                collect: vec!["network.ping".to_string(), "network.ssh".to_string()],
            },
        );
        let json = serde_json::to_string(&inventory).unwrap();
        let back: PerceptionInventory = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hosts["10.0.0.5"].collect.len(), 2);
    }
}
