use crate::{CollectOptions, CollectorContext, Plugin};
use anyhow::Result;
use async_trait::async_trait;
use nord_common::types::{Metric, MetricType, MetricValue, PluginResult};
use sysinfo::System;

/// Metrics from the machine the collector itself runs on.
pub struct LocalPlugin;

#[async_trait]
impl Plugin for LocalPlugin {
    fn name(&self) -> &'static str {
        "Local"
    }

    async fn on_collect(
        &self,
        _ctx: &CollectorContext,
        _options: &CollectOptions,
    ) -> Result<PluginResult> {
        let mut result = PluginResult::default();

        let uptime = Metric {
            category: "system".to_string(),
            name: "Uptime".to_string(),
            label: "Uptime".to_string(),
            value: MetricValue::Text(format_uptime(System::uptime())),
            metric_type: MetricType::Text,
            instance: None,
            extra: Default::default(),
        };
        result.metrics.insert("uptime".to_string(), uptime);

        let mut sys = System::new();
        sys.refresh_memory();
        let total_mib = sys.total_memory() / 1024 / 1024;
        let free_mib = sys.free_memory() / 1024 / 1024;
        let swap_pct = if sys.total_swap() > 0 {
            sys.used_swap() as f64 / sys.total_swap() as f64 * 100.0
        } else {
            0.0
        };

        result.metrics.insert(
            "mem_total".to_string(),
            named_metric("Total Memory", "Total", "memory", MetricType::Text, total_mib.to_string()),
        );
        result.metrics.insert(
            "mem_free".to_string(),
            named_metric("Free Memory", "Free", "memory", MetricType::Text, free_mib.to_string()),
        );
        result.metrics.insert(
            "swap".to_string(),
            named_metric("Swap", "Swap", "memory", MetricType::Percent, format!("{swap_pct:.1}%")),
        );

        let load = System::load_average();
        result.metrics.insert(
            "load".to_string(),
            Metric {
                category: "system".to_string(),
                name: "Load".to_string(),
                label: "Load".to_string(),
                value: MetricValue::Histogram(vec![
                    load.one as i64,
                    load.five as i64,
                    load.fifteen as i64,
                ]),
                metric_type: MetricType::Histogram,
                instance: None,
                extra: Default::default(),
            },
        );

        Ok(result)
    }
}

fn named_metric(
    name: &str,
    label: &str,
    category: &str,
    metric_type: MetricType,
    value: String,
) -> Metric {
    Metric {
        category: category.to_string(),
        name: name.to_string(),
        label: label.to_string(),
        value: MetricValue::Text(value),
        metric_type,
        instance: None,
        extra: Default::default(),
    }
}

/// `"N days HH:MM:SS"`, or `"HH:MM:SS"` under a day.
fn format_uptime(uptime_secs: u64) -> String {
    let days = uptime_secs / (3600 * 24);
    let hours = (uptime_secs / 3600) % 24;
    let minutes = (uptime_secs / 60) % 60;
    let seconds = uptime_secs % 60;

    if days > 0 {
        format!("{days} days {hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;
    use std::sync::Arc;

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(0), "00:00:00");
        assert_eq!(format_uptime(3_661), "01:01:01");
        assert_eq!(format_uptime(86_400), "1 days 00:00:00");
        assert_eq!(format_uptime(90_061), "1 days 01:01:01");
    }

    #[tokio::test]
    async fn collect_emits_expected_labels() {
        let ctx = CollectorContext {
            store: None,
            registry: Arc::new(Registry::new()),
        };
        let result = LocalPlugin
            .on_collect(&ctx, &CollectOptions::default())
            .await
            .unwrap();

        for label in ["uptime", "mem_total", "mem_free", "swap", "load"] {
            assert!(result.metrics.contains_key(label), "missing {label}");
        }

        let uptime = result.metrics["uptime"].value.as_str().unwrap().to_string();
        let re = regex::Regex::new(r"^(\d+ days )?\d{2}:\d{2}:\d{2}$").unwrap();
        assert!(re.is_match(&uptime), "unexpected uptime format: {uptime}");

        match &result.metrics["load"].value {
            MetricValue::Histogram(v) => assert_eq!(v.len(), 3),
            other => panic!("load should be a histogram, got {other:?}"),
        }
    }
}
