use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;

/// Default location of SSH device script files.
pub const DEVICE_DIR: &str = "plugins/sshcollect/devices";

/// The command script for one device profile: three ordered groups run in
/// sequence.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceDef {
    #[serde(default, deserialize_with = "command_group")]
    pub prelude: Vec<CommandEntry>,
    #[serde(default, deserialize_with = "command_group")]
    pub info: Vec<CommandEntry>,
    #[serde(default, deserialize_with = "command_group")]
    pub outro: Vec<CommandEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandEntry {
    pub name: String,
    #[serde(flatten)]
    pub spec: CommandSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandSpec {
    /// The line sent to the shell.
    #[serde(default)]
    pub command: String,
    /// Regex matched against the accumulated output.
    #[serde(default)]
    pub waitfor: String,
    /// "single-column" | "text" | "hide".
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub category: String,
    /// Substitutions applied to both key and value of parsed lines.
    #[serde(default)]
    pub replacements: BTreeMap<String, String>,
    /// Key/value separator for single-column output; ":" when empty.
    #[serde(default)]
    pub delimiter: String,
}

/// A command group is an ordered list of entries. The legacy encoding —
/// a map of name → spec — is still accepted and normalizes to a
/// name-sorted sequence.
fn command_group<'de, D>(deserializer: D) -> Result<Vec<CommandEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<CommandEntry>),
        Map(BTreeMap<String, CommandSpec>),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::List(entries) => entries,
        Repr::Map(map) => map
            .into_iter()
            .map(|(name, spec)| CommandEntry { name, spec })
            .collect(),
    })
}

impl DeviceDef {
    pub fn load(dir: &Path, device_type: &str) -> Result<DeviceDef> {
        let path = dir.join(format!("{device_type}.json"));
        let data = std::fs::read_to_string(&path).with_context(|| {
            format!("could not read device definition for '{device_type}'")
        })?;
        serde_json::from_str(&data)
            .with_context(|| format!("could not parse device file {}", path.display()))
    }

    /// Look up an info-group entry by name.
    pub fn info_entry(&self, name: &str) -> Option<&CommandEntry> {
        self.info.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_encoded_groups() {
        let def: DeviceDef = serde_json::from_str(
            r##"{
                "prelude": [
                    {"name": "disable-paging", "command": "terminal length 0", "waitfor": "#"}
                ],
                "info": [
                    {
                        "name": "version",
                        "command": "show version",
                        "waitfor": "#",
                        "format": "single-column",
                        "category": "system",
                        "replacements": {"SW version": "Software"},
                        "delimiter": ":"
                    }
                ],
                "outro": [
                    {"name": "logout", "command": "logout"}
                ]
            }"##,
        )
        .unwrap();

        assert_eq!(def.prelude[0].name, "disable-paging");
        assert_eq!(def.info[0].spec.format, "single-column");
        assert_eq!(def.info[0].spec.replacements["SW version"], "Software");
        assert_eq!(def.outro[0].name, "logout");
    }

    #[test]
    fn parses_legacy_map_encoded_groups() {
        let def: DeviceDef = serde_json::from_str(
            r##"{
                "info": {
                    "uptime": {"command": "show uptime", "waitfor": "#", "format": "text"},
                    "environment": {"command": "show env", "waitfor": "#", "format": "hide"}
                }
            }"##,
        )
        .unwrap();

        // Map groups normalize to a name-sorted sequence.
        assert_eq!(def.info.len(), 2);
        assert_eq!(def.info[0].name, "environment");
        assert_eq!(def.info[1].name, "uptime");
        assert!(def.prelude.is_empty());
        assert!(def.info_entry("uptime").is_some());
        assert!(def.info_entry("absent").is_none());
    }
}
