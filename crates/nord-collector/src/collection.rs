use crate::perception::PerceptionInventory;
use crate::{CollectOptions, CollectorContext, HostRef, Plugin};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use nord_common::config::{parse_collect_item, CollectCaches, CollectTask, Config, Credential, HostConfig};
use nord_common::types::Metric;
use nord_storage::{InterfaceRecord, MetricRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The engine: loads the host set, fans out per host and per task, merges
/// results, and writes the snapshot and the store batches.
pub struct CollectionPlugin;

#[async_trait]
impl Plugin for CollectionPlugin {
    fn name(&self) -> &'static str {
        "Collection"
    }

    async fn on_command(
        &self,
        ctx: &CollectorContext,
        args: &HashMap<String, String>,
    ) -> Result<()> {
        match args.get("action").map(String::as_str) {
            Some("collect") => {
                println!("-- Running Data Collection --");
                collect_data(ctx, Path::new("data")).await
            }
            other => anyhow::bail!("unknown action for Collection plugin: {other:?}"),
        }
    }
}

/// Snapshot shape: `{<host>: {metrics: {metrics: {<label>: {…}}}}}`.
/// The doubly-nested envelope is a compatibility contract with remote
/// consumers of the snapshot file.
#[derive(Serialize)]
struct HostSnapshot {
    metrics: MetricsEnvelope,
}

#[derive(Serialize)]
struct MetricsEnvelope {
    metrics: BTreeMap<String, Metric>,
}

/// Everything a host worker hands back to the engine.
struct HostOutcome {
    metrics: BTreeMap<String, Metric>,
    records: Vec<MetricRecord>,
    interfaces: Vec<InterfaceRecord>,
}

/// Run one full collection pass against `data_dir`.
pub async fn collect_data(ctx: &CollectorContext, data_dir: &Path) -> Result<()> {
    let (mut config, caches) = Config::load(&data_dir.join("config.json"))?;

    merge_perception(&mut config, data_dir);

    let credentials = Arc::new(config.credentials.clone());
    let caches = Arc::new(caches);

    let (tx, mut rx) = mpsc::channel::<(String, HostOutcome)>(config.hosts.len().max(1));
    for (key, host) in config.hosts.clone() {
        let ctx = ctx.clone();
        let tx = tx.clone();
        let credentials = credentials.clone();
        let caches = caches.clone();
        tokio::spawn(async move {
            let outcome = collect_host(&ctx, &key, &host, &credentials, &caches).await;
            let _ = tx.send((key, outcome)).await;
        });
    }
    drop(tx);

    let mut snapshot: BTreeMap<String, HostSnapshot> = BTreeMap::new();
    let mut metric_records: Vec<MetricRecord> = Vec::new();
    let mut interface_records: Vec<InterfaceRecord> = Vec::new();

    while let Some((key, outcome)) = rx.recv().await {
        metric_records.extend(outcome.records);
        interface_records.extend(outcome.interfaces);
        snapshot.insert(
            key,
            HostSnapshot {
                metrics: MetricsEnvelope {
                    metrics: outcome.metrics,
                },
            },
        );
    }

    if let Some(store) = &ctx.store {
        if let Err(e) = store.write_batch(&metric_records).await {
            println!("  !_ store: WriteBatch error: {e}");
        }
        if let Err(e) = store.upsert_interfaces(&interface_records).await {
            println!("  !_ store: UpsertInterfaces error: {e}");
        }
    }

    let json =
        serde_json::to_string_pretty(&snapshot).context("failed to marshal results to JSON")?;
    std::fs::write(data_dir.join("collection.json"), json)
        .context("failed to write collection.json")?;

    println!("--- Collection finished, results saved to collection.json ---");
    Ok(())
}

/// Insert hosts from the perception inventory, never overwriting hosts the
/// configuration already names.
fn merge_perception(config: &mut Config, data_dir: &Path) {
    let Ok(data) = std::fs::read_to_string(data_dir.join("perception.json")) else {
        println!("  |_ perception.json not found, skipping merge.");
        return;
    };
    let Ok(inventory) = serde_json::from_str::<PerceptionInventory>(&data) else {
        return;
    };

    println!(". |_ Merging hosts from perception.json");
    for (ip, discovered) in inventory.hosts {
        config.hosts.entry(ip).or_insert_with(|| HostConfig {
            address: discovered.address,
            name: String::new(),
            collect: discovered
                .collect
                .iter()
                .filter_map(|item| parse_collect_item(item))
                .collect(),
            credentials: Vec::new(),
        });
    }
}

/// The task list for one host: the typed tasks first, then the fallback
/// caches by key and by address, deduplicated by metric.
fn merge_tasks(key: &str, host: &HostConfig, caches: &CollectCaches) -> Vec<CollectTask> {
    let mut tasks: Vec<CollectTask> = Vec::with_capacity(host.collect.len());
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |task: &CollectTask, tasks: &mut Vec<CollectTask>| {
        let metric = task.metric.trim();
        if metric.is_empty() || !seen.insert(metric.to_string()) {
            return;
        }
        tasks.push(CollectTask {
            metric: metric.to_string(),
            credentials: task.credentials.clone(),
        });
    };

    for task in &host.collect {
        push(task, &mut tasks);
    }
    if let Some(cached) = caches.by_key.get(key) {
        for task in cached {
            push(task, &mut tasks);
        }
    }
    if let Some(cached) = caches.by_address.get(host.address.trim()) {
        for task in cached {
            push(task, &mut tasks);
        }
    }

    tasks
}

/// Split a dotted metric into `(plugin, action)`; a missing action
/// defaults to "all".
fn resolve_metric(metric: &str) -> Option<(String, String)> {
    let metric = metric.trim();
    if metric.is_empty() {
        return None;
    }
    let mut parts = metric.splitn(3, '.');
    let plugin = parts.next()?.trim().to_string();
    let action = parts
        .next()
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "all".to_string());
    if plugin.is_empty() {
        return None;
    }
    Some((plugin, action))
}

async fn collect_host(
    ctx: &CollectorContext,
    key: &str,
    host: &HostConfig,
    credentials: &BTreeMap<String, Credential>,
    caches: &CollectCaches,
) -> HostOutcome {
    println!("  |_ {key} ({})", host.address);

    let tasks = merge_tasks(key, host, caches);

    let (tx, mut rx) = mpsc::channel::<(String, nord_common::types::PluginResult)>(
        tasks.len().max(1),
    );
    for task in tasks {
        let ctx = ctx.clone();
        let tx = tx.clone();
        let key = key.to_string();
        let host = host.clone();
        let credentials = credentials.clone();
        tokio::spawn(async move {
            if let Some(result) = collect_task(&ctx, &key, &host, &task, &credentials).await {
                let _ = tx.send(result).await;
            }
        });
    }
    drop(tx);

    let now = Utc::now();
    let mut metrics: BTreeMap<String, Metric> = BTreeMap::new();
    let mut records: Vec<MetricRecord> = Vec::new();
    let mut interfaces: Vec<InterfaceRecord> = Vec::new();

    while let Some((plugin, result)) = rx.recv().await {
        for (label, metric) in result.metrics {
            records.push(MetricRecord {
                host_key: key.to_string(),
                host_name: host.name.clone(),
                host_address: host.address.clone(),
                plugin: plugin.clone(),
                name: metric.name.clone(),
                category: metric.category.clone(),
                metric_type: metric.metric_type.to_string(),
                value: metric.value.to_store_string(),
                instance: metric.instance.clone(),
                extra: metric.extra.clone(),
                collected_at: now,
            });
            // Later writes win; labels are plugin-unique by convention.
            metrics.insert(label, metric);
        }
        for entry in result.interfaces {
            interfaces.push(InterfaceRecord {
                host_key: key.to_string(),
                host_name: host.name.clone(),
                host_address: host.address.clone(),
                if_index: entry.if_index,
                name: entry.name,
                alias: entry.alias,
                if_type: entry.if_type,
                speed: entry.speed,
                mac_address: entry.mac_address,
                admin_status: entry.admin_status,
                oper_status: entry.oper_status,
            });
        }
        // result.collections is an output bucket for raw text blobs; the
        // snapshot path ignores it.
    }

    HostOutcome {
        metrics,
        records,
        interfaces,
    }
}

async fn collect_task(
    ctx: &CollectorContext,
    host_key: &str,
    host: &HostConfig,
    task: &CollectTask,
    credentials: &BTreeMap<String, Credential>,
) -> Option<(String, nord_common::types::PluginResult)> {
    let (plugin_name, action) = resolve_metric(&task.metric)?;

    println!("  |_ {host_key} : {plugin_name}.{action}");

    let plugin_key = plugin_name.to_lowercase();
    let Some(plugin) = ctx.registry.get(&plugin_key) else {
        println!("  !_ {host_key}: Plugin '{plugin_name}' not found.");
        return None;
    };

    let mut options = CollectOptions {
        host: HostRef {
            key: host_key.to_string(),
            name: host.name.clone(),
            address: host.address.clone(),
        },
        action,
        metric: task.metric.trim().to_string(),
        credential_name: task.credentials.clone(),
        credentials: None,
    };

    if let Some(reference) = &task.credentials {
        match credentials.get(reference) {
            Some(cred) => options.credentials = Some(cred.clone()),
            None => println!("          !_ {host_key} | Credentials '{reference}' not found."),
        }
    }

    match plugin.on_collect(ctx, &options).await {
        Ok(result) => Some((plugin_key, result)),
        Err(e) => {
            println!("          !_ {host_key} | Error: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;
    use nord_common::types::{Metric, MetricType, MetricValue, PluginResult};
    use tempfile::TempDir;

    struct StaticPlugin;

    #[async_trait]
    impl Plugin for StaticPlugin {
        fn name(&self) -> &'static str {
            "Static"
        }

        async fn on_collect(
            &self,
            _ctx: &CollectorContext,
            _options: &CollectOptions,
        ) -> Result<nord_common::types::PluginResult> {
            let metric = Metric {
                category: "network".to_string(),
                name: "alive".to_string(),
                label: "alive".to_string(),
                value: MetricValue::Text("up".to_string()),
                metric_type: MetricType::Status,
                instance: None,
                extra: Default::default(),
            };
            Ok(PluginResult::default().with_metric("alive", metric))
        }
    }

    fn ctx() -> CollectorContext {
        let mut registry = Registry::new();
        registry.register(Arc::new(StaticPlugin));
        CollectorContext {
            store: None,
            registry: Arc::new(registry),
        }
    }

    #[test]
    fn metric_resolution_defaults_action_to_all() {
        assert_eq!(
            resolve_metric("network.ping"),
            Some(("network".to_string(), "ping".to_string()))
        );
        assert_eq!(
            resolve_metric("local"),
            Some(("local".to_string(), "all".to_string()))
        );
        assert_eq!(
            resolve_metric(" snmp . all "),
            Some(("snmp".to_string(), "all".to_string()))
        );
        assert_eq!(resolve_metric(""), None);
        assert_eq!(resolve_metric("   "), None);
    }

    #[test]
    fn task_merge_deduplicates_by_metric() {
        let host = HostConfig {
            address: "10.0.0.1".to_string(),
            collect: vec![CollectTask {
                metric: "network.ping".to_string(),
                credentials: None,
            }],
            ..Default::default()
        };
        let mut caches = CollectCaches::default();
        caches.by_key.insert(
            "h1".to_string(),
            vec![
                CollectTask {
                    metric: "network.ping".to_string(),
                    credentials: Some("dup".to_string()),
                },
                CollectTask {
                    metric: "local.uptime".to_string(),
                    credentials: None,
                },
            ],
        );
        caches.by_address.insert(
            "10.0.0.1".to_string(),
            vec![CollectTask {
                metric: "snmp".to_string(),
                credentials: Some("core".to_string()),
            }],
        );

        let tasks = merge_tasks("h1", &host, &caches);
        let metrics: Vec<&str> = tasks.iter().map(|t| t.metric.as_str()).collect();
        assert_eq!(metrics, vec!["network.ping", "local.uptime", "snmp"]);
        // The typed task wins the dedup, keeping its (absent) credential.
        assert_eq!(tasks[0].credentials, None);
    }

    #[tokio::test]
    async fn collect_writes_snapshot_with_nested_envelope() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"hosts": {"h1": {"address": "127.0.0.1", "collect": "static.all"}}}"#,
        )
        .unwrap();

        collect_data(&ctx(), dir.path()).await.unwrap();

        let snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("collection.json")).unwrap())
                .unwrap();
        assert_eq!(
            snapshot["h1"]["metrics"]["metrics"]["alive"]["value"],
            "up"
        );
        assert_eq!(
            snapshot["h1"]["metrics"]["metrics"]["alive"]["type"],
            "status"
        );
    }

    #[tokio::test]
    async fn perception_hosts_merge_without_overwriting() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"hosts": {"h1": {"address": "127.0.0.1", "collect": "static.all"}}}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("perception.json"),
            r#"{"hosts": {
                "10.0.0.5": {"address": "10.0.0.5", "collect": ["static.all"]},
                "h1": {"address": "overwritten", "collect": []}
            }}"#,
        )
        .unwrap();

        collect_data(&ctx(), dir.path()).await.unwrap();

        let snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("collection.json")).unwrap())
                .unwrap();
        // The discovered host shows up with only its detected metrics.
        assert_eq!(
            snapshot["10.0.0.5"]["metrics"]["metrics"]["alive"]["value"],
            "up"
        );
        // The configured host is untouched by the merge.
        assert!(snapshot["h1"]["metrics"]["metrics"]["alive"].is_object());
    }

    #[tokio::test]
    async fn missing_plugins_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"hosts": {"h1": {"address": "127.0.0.1", "collect": "ghost.all, static.all"}}}"#,
        )
        .unwrap();

        collect_data(&ctx(), dir.path()).await.unwrap();

        let snapshot: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("collection.json")).unwrap())
                .unwrap();
        assert_eq!(
            snapshot["h1"]["metrics"]["metrics"]["alive"]["value"],
            "up"
        );
    }
}
