use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Text,
    Status,
    Percent,
    Histogram,
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricType::Text => write!(f, "text"),
            MetricType::Status => write!(f, "status"),
            MetricType::Percent => write!(f, "percent"),
            MetricType::Histogram => write!(f, "histogram"),
            MetricType::Gauge => write!(f, "gauge"),
            MetricType::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MetricType::Text),
            "status" => Ok(MetricType::Status),
            "percent" => Ok(MetricType::Percent),
            "histogram" => Ok(MetricType::Histogram),
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            _ => Err(format!("unknown metric type: {s}")),
        }
    }
}

/// A metric value as it appears in the snapshot file.
///
/// Everything is a string except histogram vectors (the load average
/// 3-vector), which serialize as a JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Text(String),
    Histogram(Vec<i64>),
}

impl MetricValue {
    /// The string form used for the `value` column in the store.
    /// Histograms become their JSON encoding.
    pub fn to_store_string(&self) -> String {
        match self {
            MetricValue::Text(s) => s.clone(),
            MetricValue::Histogram(v) => {
                serde_json::to_string(v).unwrap_or_else(|_| String::new())
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Text(s) => Some(s),
            MetricValue::Histogram(_) => None,
        }
    }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self {
        MetricValue::Text(s)
    }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self {
        MetricValue::Text(s.to_string())
    }
}

/// The universal output unit of every collector.
///
/// `extra` is flattened into the metric object so plugin-specific keys
/// (the SNMP `oid`, for example) appear at the top level of the snapshot,
/// which is the shape remote consumers expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub category: String,
    pub name: String,
    pub label: String,
    pub value: MetricValue,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Metric {
    /// A text metric with label == name, the common case.
    pub fn text(category: &str, label: &str, value: impl Into<MetricValue>) -> Self {
        Metric {
            category: category.to_string(),
            name: label.to_string(),
            label: label.to_string(),
            value: value.into(),
            metric_type: MetricType::Text,
            instance: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Slowly-changing entity data for a network interface, as produced by the
/// SNMP table walk. Persisted via the store's interface upsert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub if_index: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default, rename = "type")]
    pub if_type: i32,
    #[serde(default)]
    pub speed: Option<i64>,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub admin_status: String,
    #[serde(default)]
    pub oper_status: String,
}

/// What a plugin returns from a collect invocation.
///
/// `metrics` is keyed by label. `collections` holds raw text blobs that are
/// persisted nowhere but kept out of the metric map. `interfaces` carries
/// entity rows for the store's interface upsert.
#[derive(Debug, Clone, Default)]
pub struct PluginResult {
    pub metrics: BTreeMap<String, Metric>,
    pub collections: BTreeMap<String, String>,
    pub interfaces: Vec<InterfaceEntry>,
}

impl PluginResult {
    pub fn with_metric(mut self, label: &str, metric: Metric) -> Self {
        self.metrics.insert(label.to_string(), metric);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_type_round_trip() {
        for t in [
            MetricType::Text,
            MetricType::Status,
            MetricType::Percent,
            MetricType::Histogram,
            MetricType::Gauge,
            MetricType::Counter,
        ] {
            let s = t.to_string();
            assert_eq!(s.parse::<MetricType>().unwrap(), t);
        }
        assert!("bogus".parse::<MetricType>().is_err());
    }

    #[test]
    fn metric_serializes_with_flattened_extra() {
        let mut m = Metric::text("snmp", "Uptime", "1d 0h 0m 0s");
        m.metric_type = MetricType::Gauge;
        m.extra.insert("oid".to_string(), "1.3.6.1.2.1.1.3.0".to_string());

        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["type"], "gauge");
        assert_eq!(v["oid"], "1.3.6.1.2.1.1.3.0");
        assert_eq!(v["value"], "1d 0h 0m 0s");
        assert!(v.get("instance").is_none());
    }

    #[test]
    fn histogram_value_serializes_as_array() {
        let m = Metric {
            category: "system".to_string(),
            name: "Load".to_string(),
            label: "Load".to_string(),
            value: MetricValue::Histogram(vec![1, 0, 0]),
            metric_type: MetricType::Histogram,
            instance: None,
            extra: BTreeMap::new(),
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["value"], serde_json::json!([1, 0, 0]));
        assert_eq!(m.value.to_store_string(), "[1,0,0]");
    }
}
