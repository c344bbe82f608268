mod device;
mod format;

pub use device::{DeviceDefinition, OidDefinition, TableColumn, TableDefinition, DEVICE_DIR};
pub use format::{format_mac, format_timeticks, format_value, parse_mac, Formatted};

use crate::{CollectOptions, CollectorContext, CollectorError, Plugin};
use anyhow::{Context, Result};
use async_trait::async_trait;
use csnmp::{ObjectIdentifier, ObjectValue, Snmp2cClient};
use nord_common::types::{InterfaceEntry, Metric, MetricType, MetricValue, PluginResult};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const SNMP_TIMEOUT: Duration = Duration::from_secs(5);
const SNMP_RETRIES: usize = 3;
const BULK_MAX_REPETITIONS: u32 = 10;

/// Which table-walk strategy the credential's version token selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnmpVersion {
    V1,
    V2c,
    V3,
}

fn parse_version(token: &str) -> SnmpVersion {
    match token.trim().to_lowercase().as_str() {
        "1" => SnmpVersion::V1,
        "3" => SnmpVersion::V3,
        _ => SnmpVersion::V2c,
    }
}

/// SNMP scalar and table collection driven by a device profile.
pub struct SnmpPlugin;

#[async_trait]
impl Plugin for SnmpPlugin {
    fn name(&self) -> &'static str {
        "Snmp"
    }

    async fn on_collect(
        &self,
        _ctx: &CollectorContext,
        options: &CollectOptions,
    ) -> Result<PluginResult> {
        let creds = options
            .credentials
            .as_ref()
            .ok_or(CollectorError::CredentialsRequired("SNMP"))?;

        let host = if creds.host.is_empty() {
            options.host.address.as_str()
        } else {
            creds.host.as_str()
        };
        let port = if creds.port == 0 { 161 } else { creds.port };
        let community = if creds.community.is_empty() {
            "public"
        } else {
            creds.community.as_str()
        };
        let version = parse_version(&creds.version);
        let device_type = if creds.device_type.is_empty() {
            "generic"
        } else {
            creds.device_type.as_str()
        };

        println!(
            "          |_ SNMP: Querying {host}:{port} (community: {community}, version: {}, type: {device_type})",
            creds.version
        );

        let def = DeviceDefinition::load(Path::new(DEVICE_DIR), device_type)
            .context("SNMP: failed to load device definition")?;

        let target: SocketAddr = tokio::net::lookup_host((host, port))
            .await
            .with_context(|| format!("SNMP: resolve {host}:{port}"))?
            .next()
            .ok_or_else(|| anyhow::anyhow!("SNMP: no address for {host}"))?;

        let client = Snmp2cClient::new(
            target,
            community.as_bytes().to_vec(),
            None,
            Some(SNMP_TIMEOUT),
        )
        .await
        .context("SNMP: connect failed")?;

        query_device(&client, version, &def).await
    }
}

async fn query_device(
    client: &Snmp2cClient,
    version: SnmpVersion,
    def: &DeviceDefinition,
) -> Result<PluginResult> {
    let mut result = PluginResult::default();

    for oid_def in &def.oids {
        let oid: ObjectIdentifier = match oid_def.oid.trim_start_matches('.').parse() {
            Ok(oid) => oid,
            Err(e) => {
                println!("          !_ SNMP: bad OID {} ({}): {e}", oid_def.oid, oid_def.name);
                continue;
            }
        };

        let value = match get_with_retries(client, oid).await {
            Ok(value) => value,
            Err(e) => {
                println!(
                    "          !_ SNMP: Failed to query OID {} ({}): {e}",
                    oid_def.oid, oid_def.name
                );
                continue;
            }
        };

        let formatted = format_value(&value, &oid_def.format);
        println!("          |_ SNMP: {} = {formatted}", oid_def.name);

        let label = oid_def.name.replace(' ', "_");
        let mut extra = BTreeMap::new();
        extra.insert("oid".to_string(), oid_def.oid.clone());
        result.metrics.insert(
            label,
            Metric {
                category: "snmp".to_string(),
                name: oid_def.name.clone(),
                label: oid_def.name.clone(),
                value: MetricValue::Text(formatted.to_string()),
                metric_type: MetricType::Gauge,
                instance: None,
                extra,
            },
        );
    }

    for table in &def.tables {
        let pdus = match walk_table(client, version, &table.base_oid).await {
            Ok(pdus) => pdus,
            Err(e) => {
                println!("          !_ SNMP: table walk {} failed: {e}", table.base_oid);
                continue;
            }
        };

        let rows = group_rows(&table.base_oid, pdus, table);
        if table.table_type == "interface" {
            let (interfaces, metrics) = process_interface_table(rows, table);
            result.interfaces.extend(interfaces);
            result.metrics.extend(metrics);
        }
    }

    Ok(result)
}

async fn get_with_retries(
    client: &Snmp2cClient,
    oid: ObjectIdentifier,
) -> Result<ObjectValue> {
    let mut last_err = None;
    for _ in 0..SNMP_RETRIES {
        match client.get(oid).await {
            Ok(value) => return Ok(value),
            Err(e) => last_err = Some(e),
        }
    }
    Err(anyhow::anyhow!(last_err.expect("at least one attempt")))
}

/// Walk the table subtree. BulkWalk where the version allows it, falling
/// back to plain GetNext walking (SNMPv1 agents reject GetBulk).
async fn walk_table(
    client: &Snmp2cClient,
    version: SnmpVersion,
    base_oid: &str,
) -> Result<Vec<(String, ObjectValue)>> {
    let base: ObjectIdentifier = base_oid
        .trim_start_matches('.')
        .parse()
        .map_err(|e| anyhow::anyhow!("bad base OID {base_oid}: {e}"))?;

    let walked = if version == SnmpVersion::V1 {
        client.walk(base).await.map_err(|e| anyhow::anyhow!(e))?
    } else {
        match client.walk_bulk(base, 0, BULK_MAX_REPETITIONS).await {
            Ok(walked) => walked,
            Err(_) => client.walk(base).await.map_err(|e| anyhow::anyhow!(e))?,
        }
    };

    Ok(walked
        .into_iter()
        .map(|(oid, value)| (oid.to_string(), value))
        .collect())
}

/// Group walked PDUs by row: the OID suffix below the base is
/// `<column_sub_oid>.<row_index>`. Columns not named by the table
/// definition are discarded.
///
/// Returns row_index → sub_oid → (full OID, value).
fn group_rows(
    base_oid: &str,
    pdus: Vec<(String, ObjectValue)>,
    table: &TableDefinition,
) -> BTreeMap<String, BTreeMap<String, (String, ObjectValue)>> {
    let base = base_oid.trim_start_matches('.');
    let wanted: HashSet<&str> = table.columns.iter().map(|c| c.sub_oid.as_str()).collect();

    let mut rows: BTreeMap<String, BTreeMap<String, (String, ObjectValue)>> = BTreeMap::new();
    for (oid, value) in pdus {
        let trimmed = oid.trim_start_matches('.');
        let Some(suffix) = trimmed.strip_prefix(base) else {
            continue;
        };
        let suffix = suffix.trim_start_matches('.');

        // suffix is "<col>.<row_index>"; the row index may itself be dotted.
        let Some((col, row_index)) = suffix.split_once('.') else {
            continue;
        };
        if !wanted.contains(col) {
            continue;
        }

        rows.entry(row_index.to_string())
            .or_default()
            .insert(col.to_string(), (oid, value));
    }
    rows
}

/// Convert grouped ifTable rows into interface entity entries plus
/// per-interface counter metrics.
fn process_interface_table(
    rows: BTreeMap<String, BTreeMap<String, (String, ObjectValue)>>,
    table: &TableDefinition,
) -> (Vec<InterfaceEntry>, BTreeMap<String, Metric>) {
    let col_by_sub: BTreeMap<&str, &TableColumn> = table
        .columns
        .iter()
        .map(|c| (c.sub_oid.as_str(), c))
        .collect();

    let mut interfaces = Vec::new();
    let mut metrics = BTreeMap::new();

    for (row_index, cols) in rows {
        let mut iface = InterfaceEntry {
            if_index: row_index.parse().unwrap_or(0),
            ..Default::default()
        };

        // Resolve the name role first so counter metrics carry the final
        // instance label regardless of column order.
        let mut if_name = row_index.clone();
        for (sub_oid, (_, value)) in &cols {
            if let Some(col) = col_by_sub.get(sub_oid.as_str()) {
                if col.role == "name" {
                    if let Some(s) = format_value(value, &col.format).as_text() {
                        if !s.is_empty() {
                            if_name = s.to_string();
                        }
                    }
                }
            }
        }

        for (sub_oid, (full_oid, value)) in &cols {
            let Some(col) = col_by_sub.get(sub_oid.as_str()) else {
                continue;
            };
            let formatted = format_value(value, &col.format);

            match col.role.as_str() {
                "name" => iface.name = formatted.to_string(),
                "alias" => iface.alias = formatted.to_string(),
                "type" => iface.if_type = formatted.as_i64().unwrap_or(0) as i32,
                "speed" => iface.speed = formatted.as_i64(),
                "mac" => iface.mac_address = formatted.to_string(),
                "admin_status" => iface.admin_status = formatted.to_string(),
                "oper_status" => iface.oper_status = formatted.to_string(),
                "metric" => {
                    let key = format!("{}_{row_index}", col.name);
                    let mut extra = BTreeMap::new();
                    extra.insert("oid".to_string(), full_oid.clone());
                    metrics.insert(
                        key,
                        Metric {
                            category: "snmp".to_string(),
                            name: col.name.clone(),
                            label: col.name.clone(),
                            value: MetricValue::Text(formatted.to_string()),
                            metric_type: MetricType::Counter,
                            instance: Some(if_name.clone()),
                            extra,
                        },
                    );
                }
                _ => {}
            }
        }

        interfaces.push(iface);
    }

    (interfaces, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn if_table() -> TableDefinition {
        TableDefinition {
            base_oid: "1.3.6.1.2.1.2.2.1".to_string(),
            table_type: "interface".to_string(),
            columns: vec![
                TableColumn {
                    sub_oid: "2".to_string(),
                    name: "ifDescr".to_string(),
                    format: "string".to_string(),
                    role: "name".to_string(),
                },
                TableColumn {
                    sub_oid: "5".to_string(),
                    name: "ifSpeed".to_string(),
                    format: "gauge".to_string(),
                    role: "speed".to_string(),
                },
                TableColumn {
                    sub_oid: "7".to_string(),
                    name: "ifAdminStatus".to_string(),
                    format: "ifstatus".to_string(),
                    role: "admin_status".to_string(),
                },
                TableColumn {
                    sub_oid: "10".to_string(),
                    name: "ifInOctets".to_string(),
                    format: "counter".to_string(),
                    role: "metric".to_string(),
                },
            ],
        }
    }

    fn pdu(oid: &str, value: ObjectValue) -> (String, ObjectValue) {
        (oid.to_string(), value)
    }

    #[test]
    fn groups_pdus_by_row_and_drops_unknown_columns() {
        let table = if_table();
        let pdus = vec![
            pdu("1.3.6.1.2.1.2.2.1.2.1", ObjectValue::String(b"eth0".to_vec())),
            pdu("1.3.6.1.2.1.2.2.1.2.2", ObjectValue::String(b"eth1".to_vec())),
            pdu("1.3.6.1.2.1.2.2.1.10.1", ObjectValue::Counter32(1000)),
            // ifType (3) is not in the definition — dropped.
            pdu("1.3.6.1.2.1.2.2.1.3.1", ObjectValue::Integer(6)),
            // Different subtree — dropped.
            pdu("1.3.6.1.2.1.1.3.0", ObjectValue::TimeTicks(1)),
        ];

        let rows = group_rows(&table.base_oid, pdus, &table);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows["1"].len(), 2);
        assert_eq!(rows["2"].len(), 1);
        assert!(!rows["1"].contains_key("3"));
    }

    #[test]
    fn interface_rows_carry_instance_labels() {
        let table = if_table();
        let pdus = vec![
            pdu("1.3.6.1.2.1.2.2.1.2.3", ObjectValue::String(b"GigabitEthernet0/3".to_vec())),
            pdu("1.3.6.1.2.1.2.2.1.5.3", ObjectValue::Unsigned32(1_000_000_000)),
            pdu("1.3.6.1.2.1.2.2.1.7.3", ObjectValue::Integer(1)),
            pdu("1.3.6.1.2.1.2.2.1.10.3", ObjectValue::Counter32(987_654)),
        ];

        let rows = group_rows(&table.base_oid, pdus, &table);
        let (interfaces, metrics) = process_interface_table(rows, &table);

        assert_eq!(interfaces.len(), 1);
        let iface = &interfaces[0];
        assert_eq!(iface.if_index, 3);
        assert_eq!(iface.name, "GigabitEthernet0/3");
        assert_eq!(iface.speed, Some(1_000_000_000));
        assert_eq!(iface.admin_status, "up");

        let metric = &metrics["ifInOctets_3"];
        assert_eq!(metric.metric_type, MetricType::Counter);
        assert_eq!(metric.instance.as_deref(), Some("GigabitEthernet0/3"));
        assert_eq!(metric.value.as_str(), Some("987654"));
        assert_eq!(metric.extra["oid"], "1.3.6.1.2.1.2.2.1.10.3");
    }

    #[test]
    fn missing_columns_leave_defaults_without_skipping_the_row() {
        let table = if_table();
        // Only a counter column — no name, speed, or status.
        let pdus = vec![pdu("1.3.6.1.2.1.2.2.1.10.7", ObjectValue::Counter32(5))];

        let rows = group_rows(&table.base_oid, pdus, &table);
        let (interfaces, metrics) = process_interface_table(rows, &table);

        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].if_index, 7);
        assert_eq!(interfaces[0].name, "");
        assert_eq!(interfaces[0].speed, None);

        // Instance falls back to the row index when no name column exists.
        assert_eq!(metrics["ifInOctets_7"].instance.as_deref(), Some("7"));
    }

    #[test]
    fn version_tokens() {
        assert_eq!(parse_version("1"), SnmpVersion::V1);
        assert_eq!(parse_version("2"), SnmpVersion::V2c);
        assert_eq!(parse_version("2c"), SnmpVersion::V2c);
        assert_eq!(parse_version("3"), SnmpVersion::V3);
        assert_eq!(parse_version(""), SnmpVersion::V2c);
        assert_eq!(parse_version("weird"), SnmpVersion::V2c);
    }
}
