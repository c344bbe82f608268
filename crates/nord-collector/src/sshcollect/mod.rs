mod device;
mod session;

pub use device::{CommandEntry, CommandSpec, DeviceDef, DEVICE_DIR};
pub use session::{InteractiveSession, WaitResult};

use crate::{CollectOptions, CollectorContext, CollectorError, Plugin};
use anyhow::{Context, Result};
use async_trait::async_trait;
use nord_common::types::{Metric, MetricType, MetricValue, PluginResult};
use std::path::Path;

/// Interactive-shell collection against a device script.
pub struct SshCollectPlugin;

#[async_trait]
impl Plugin for SshCollectPlugin {
    fn name(&self) -> &'static str {
        "SSHCollect"
    }

    async fn on_collect(
        &self,
        _ctx: &CollectorContext,
        options: &CollectOptions,
    ) -> Result<PluginResult> {
        let creds = options
            .credentials
            .as_ref()
            .ok_or(CollectorError::CredentialsRequired("sshcollect"))?;

        let user = creds.user.clone();
        let pass = creds.pass.clone();
        let host = if creds.host.is_empty() {
            options.host.address.clone()
        } else {
            creds.host.clone()
        };
        let port = if creds.port == 0 { 22 } else { creds.port };
        let device_type = if creds.device_type.is_empty() {
            "nokia2425".to_string()
        } else {
            creds.device_type.clone()
        };

        let def = DeviceDef::load(Path::new(DEVICE_DIR), &device_type)?;

        // libssh2 is blocking; the whole shell conversation runs on the
        // blocking pool.
        let script = def.clone();
        let outputs = tokio::task::spawn_blocking(move || -> Result<Vec<(String, String)>> {
            let mut sess = InteractiveSession::connect(&user, &pass, &host, port)
                .context("SSH connection failed")?;

            // Swallow the login banner up to the first prompt.
            let _ = sess.wait_for("#|>");

            let mut results = Vec::new();
            for group in [&script.prelude, &script.info, &script.outro] {
                for entry in group {
                    println!("        |_ Running SSH command: {}", entry.spec.command);
                    sess.send(&entry.spec.command)?;

                    // The session closes right after these — nothing to
                    // wait for, nothing to record.
                    if entry.name == "exit" || entry.name == "logout" {
                        continue;
                    }

                    let wait = sess.wait_for(&entry.spec.waitfor);
                    if let Some(err) = &wait.error {
                        println!("            !_ Warning: {err}");
                    }
                    results.push((entry.name.clone(), wait.output));
                }
            }
            sess.close();
            Ok(results)
        })
        .await
        .context("SSH worker panicked")??;

        Ok(parse_collection(&outputs, &def))
    }
}

/// Turn raw per-command output into metrics and text collections according
/// to each info entry's format.
pub fn parse_collection(outputs: &[(String, String)], def: &DeviceDef) -> PluginResult {
    let mut result = PluginResult::default();

    for (name, output) in outputs {
        let Some(entry) = def.info_entry(name) else {
            continue;
        };

        // Drop the command echo and the returning prompt.
        let mut lines: Vec<&str> = output.split('\n').collect();
        if lines.len() > 2 {
            lines = lines[1..lines.len() - 1].to_vec();
        }

        match entry.spec.format.as_str() {
            "single-column" => {
                let delimiter = if entry.spec.delimiter.is_empty() {
                    ":"
                } else {
                    entry.spec.delimiter.as_str()
                };
                for line in &lines {
                    let Some((raw_key, raw_value)) = line.split_once(delimiter) else {
                        continue;
                    };
                    let mut key =
                        raw_key.trim_matches(|c| " ([])".contains(c)).to_string();
                    let mut value =
                        raw_value.trim_matches(|c| " ([])".contains(c)).to_string();

                    for (from, to) in &entry.spec.replacements {
                        key = key.replace(from.as_str(), to);
                        value = value.replace(from.as_str(), to);
                    }
                    let key = key.trim().to_string();
                    if key.is_empty() {
                        continue;
                    }

                    result.metrics.insert(
                        key.clone(),
                        Metric {
                            category: entry.spec.category.clone(),
                            name: key.clone(),
                            label: key,
                            value: MetricValue::Text(value),
                            metric_type: MetricType::Text,
                            instance: None,
                            extra: Default::default(),
                        },
                    );
                }
            }
            "hide" => {}
            _ => {
                result
                    .collections
                    .insert(name.clone(), lines.join("\n"));
            }
        }
    }

    result
}
