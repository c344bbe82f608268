use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default location of SNMP device profile files.
pub const DEVICE_DIR: &str = "plugins/snmp/devices";

/// An SNMP device profile: scalar OIDs to GET and tables to walk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceDefinition {
    #[serde(default)]
    pub oids: Vec<OidDefinition>,
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

/// A single scalar OID to query.
#[derive(Debug, Clone, Deserialize)]
pub struct OidDefinition {
    pub oid: String,
    pub name: String,
    #[serde(default)]
    pub format: String,
}

/// An SNMP table to walk (e.g. ifTable).
#[derive(Debug, Clone, Deserialize)]
pub struct TableDefinition {
    /// e.g. "1.3.6.1.2.1.2.2.1".
    pub base_oid: String,
    /// "interface" rows feed the interfaces entity table.
    #[serde(rename = "type", default)]
    pub table_type: String,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
}

/// Maps a column sub-OID to its name, format, and role.
#[derive(Debug, Clone, Deserialize)]
pub struct TableColumn {
    /// Numeric suffix below the base OID, e.g. "2" for ifDescr.
    pub sub_oid: String,
    pub name: String,
    #[serde(default)]
    pub format: String,
    /// "name" | "alias" | "type" | "speed" | "mac" | "admin_status" |
    /// "oper_status" | "metric".
    #[serde(default)]
    pub role: String,
}

impl DeviceDefinition {
    pub fn load(dir: &Path, device_type: &str) -> Result<DeviceDefinition> {
        let path = dir.join(format!("{device_type}.json"));
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("could not read device file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("could not parse device file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_device_definition() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("generic.json"),
            r#"{
                "oids": [
                    {"oid": "1.3.6.1.2.1.1.3.0", "name": "Uptime", "format": "timeticks"}
                ],
                "tables": [
                    {
                        "base_oid": "1.3.6.1.2.1.2.2.1",
                        "type": "interface",
                        "columns": [
                            {"sub_oid": "2", "name": "ifDescr", "format": "string", "role": "name"},
                            {"sub_oid": "10", "name": "ifInOctets", "format": "counter", "role": "metric"}
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();

        let def = DeviceDefinition::load(dir.path(), "generic").unwrap();
        assert_eq!(def.oids.len(), 1);
        assert_eq!(def.oids[0].format, "timeticks");
        assert_eq!(def.tables[0].table_type, "interface");
        assert_eq!(def.tables[0].columns[1].role, "metric");
    }

    #[test]
    fn missing_device_file_errors() {
        let dir = TempDir::new().unwrap();
        assert!(DeviceDefinition::load(dir.path(), "absent").is_err());
    }
}
