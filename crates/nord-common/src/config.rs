use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Root configuration structure, read from `data/config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostConfig>,
    #[serde(default)]
    pub credentials: BTreeMap<String, Credential>,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub perception: BTreeMap<String, PerceptionEnv>,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// A single machine to be monitored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub collect: Vec<CollectTask>,
    #[serde(default)]
    pub credentials: Vec<String>,
}

/// A single collection task: `metric` is `<plugin>.<action>` or a bare
/// plugin name; `credentials` optionally names an entry in the credentials
/// map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectTask {
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

/// A named credential bundle for reaching a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    /// Device profile identifier, e.g. "nokia2425" or "generic_snmp".
    #[serde(default, rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub community: String,
    /// SNMP version token: "1" | "2" | "2c" | "3". Empty defaults to 2c.
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub destinations: BTreeMap<String, Destination>,
}

/// A remote server endpoint for the snapshot upload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Destination {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub active: bool,
}

/// A network discovery scope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PerceptionEnv {
    #[serde(default)]
    pub ranges: Vec<String>,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub enabled: bool,
    /// Ordered `plugin.action` probes run against each discovered host.
    #[serde(default)]
    pub detection: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
}

/// Normalized collect lists cached outside the typed config, used as a
/// fallback when merging tasks for a host: once by host key, once by host
/// address.
#[derive(Debug, Clone, Default)]
pub struct CollectCaches {
    pub by_key: HashMap<String, Vec<CollectTask>>,
    pub by_address: HashMap<String, Vec<CollectTask>>,
}

impl Config {
    /// Read and parse the config file, normalizing `hosts[*].collect`
    /// before the typed parse. Returns the config together with the
    /// fallback caches built during normalization.
    pub fn load(path: &Path) -> Result<(Config, CollectCaches)> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let mut raw: serde_json::Value = serde_json::from_str(&data)
            .with_context(|| format!("could not parse config file {}", path.display()))?;

        let caches = normalize_collect(&mut raw);

        let config: Config = serde_json::from_value(raw)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        Ok((config, caches))
    }

    /// Parse only the `database` section. Used at startup so an exotic
    /// `collect` shape can never prevent the store from opening.
    pub fn load_database(path: &Path) -> Result<DatabaseConfig> {
        #[derive(Deserialize)]
        struct DbOnly {
            #[serde(default)]
            database: DatabaseConfig,
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let db: DbOnly = serde_json::from_str(&data)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        Ok(db.database)
    }
}

/// Parse one collect item in its string form: `"<metric> <credential>?"`.
pub fn parse_collect_item(item: &str) -> Option<CollectTask> {
    let mut fields = item.split_whitespace();
    let metric = fields.next()?.to_string();
    Some(CollectTask {
        metric,
        credentials: fields.next().map(str::to_string),
    })
}

/// Rewrite every `hosts[*].collect` into the object-list form, in place.
///
/// Three input shapes are accepted:
///   (a) array of `{metric, credentials}` objects,
///   (b) array of `"<metric> <credential>?"` strings,
///   (c) a single comma-separated string.
///
/// The function is a fixed point: applying it to already-normalized input
/// leaves the value unchanged.
pub fn normalize_collect(raw: &mut serde_json::Value) -> CollectCaches {
    let mut caches = CollectCaches::default();

    let Some(hosts) = raw.get_mut("hosts").and_then(|h| h.as_object_mut()) else {
        return caches;
    };

    for (host_key, host_val) in hosts.iter_mut() {
        let Some(host_map) = host_val.as_object_mut() else {
            continue;
        };

        let mut normalized: Vec<CollectTask> = Vec::new();
        match host_map.get("collect") {
            Some(serde_json::Value::String(s)) => {
                for item in s.split(',') {
                    if let Some(task) = parse_collect_item(item.trim()) {
                        normalized.push(task);
                    }
                }
            }
            Some(serde_json::Value::Array(items)) => {
                for item in items {
                    match item {
                        serde_json::Value::String(s) => {
                            if let Some(task) = parse_collect_item(s.trim()) {
                                normalized.push(task);
                            }
                        }
                        serde_json::Value::Object(m) => {
                            let Some(metric) =
                                m.get("metric").and_then(|v| v.as_str()).map(str::trim)
                            else {
                                continue;
                            };
                            if metric.is_empty() {
                                continue;
                            }
                            normalized.push(CollectTask {
                                metric: metric.to_string(),
                                credentials: m
                                    .get("credentials")
                                    .and_then(|v| v.as_str())
                                    .map(|s| s.trim().to_string())
                                    .filter(|s| !s.is_empty()),
                            });
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        if normalized.is_empty() {
            continue;
        }

        host_map.insert(
            "collect".to_string(),
            serde_json::to_value(&normalized).expect("collect tasks serialize"),
        );

        if let Some(addr) = host_map.get("address").and_then(|v| v.as_str()) {
            let addr = addr.trim();
            if !addr.is_empty() {
                caches
                    .by_address
                    .insert(addr.to_string(), normalized.clone());
            }
        }
        caches.by_key.insert(host_key.clone(), normalized);
    }

    caches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_comma_separated_string() {
        let mut raw = json!({
            "hosts": {
                "edge": {
                    "address": "10.0.0.1",
                    "collect": "network.ping, network.ssh admin"
                }
            }
        });
        normalize_collect(&mut raw);
        assert_eq!(
            raw["hosts"]["edge"]["collect"],
            json!([
                {"metric": "network.ping"},
                {"metric": "network.ssh", "credentials": "admin"}
            ])
        );
    }

    #[test]
    fn normalizes_string_array() {
        let mut raw = json!({
            "hosts": {
                "sw1": {"address": "10.0.0.2", "collect": ["snmp core", "local"]}
            }
        });
        let caches = normalize_collect(&mut raw);
        assert_eq!(
            raw["hosts"]["sw1"]["collect"],
            json!([
                {"metric": "snmp", "credentials": "core"},
                {"metric": "local"}
            ])
        );
        assert_eq!(caches.by_key["sw1"].len(), 2);
        assert_eq!(caches.by_address["10.0.0.2"].len(), 2);
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        let mut raw = json!({
            "hosts": {
                "edge": {
                    "address": "10.0.0.1",
                    "collect": "network.ping, network.ssh admin"
                }
            }
        });
        normalize_collect(&mut raw);
        let once = raw.clone();
        normalize_collect(&mut raw);
        assert_eq!(raw, once);
    }

    #[test]
    fn object_form_passes_through() {
        let mut raw = json!({
            "hosts": {
                "h": {
                    "address": "a",
                    "collect": [{"metric": "  local.uptime  "}]
                }
            }
        });
        normalize_collect(&mut raw);
        assert_eq!(raw["hosts"]["h"]["collect"], json!([{"metric": "local.uptime"}]));
    }

    #[test]
    fn typed_parse_after_normalization() {
        let raw = r#"{
            "hosts": {"local": {"address": "127.0.0.1", "collect": "local.uptime"}},
            "credentials": {"admin": {"user": "root", "pass": "secret", "type": "nokia2425", "port": 22}},
            "database": {"url": ""}
        }"#;
        let mut value: serde_json::Value = serde_json::from_str(raw).unwrap();
        normalize_collect(&mut value);
        let config: Config = serde_json::from_value(value).unwrap();
        assert_eq!(config.hosts["local"].collect.len(), 1);
        assert_eq!(config.hosts["local"].collect[0].metric, "local.uptime");
        assert_eq!(config.credentials["admin"].device_type, "nokia2425");
        assert!(config.database.url.is_empty());
    }
}
