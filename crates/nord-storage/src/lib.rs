//! Relational persistence for collected metrics, interface entities, and
//! flow datagrams.
//!
//! One [`Store`] covers SQLite, MySQL and PostgreSQL behind a single
//! SeaORM connection; the backend selects placeholder style and upsert
//! dialect. Schema lives in the `migration` crate and is applied on open.

mod store;


use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub use store::Store;

/// A single metric sample to persist.
///
/// `value_num` is not carried here — the store derives it from `value`
/// via [`nord_common::value::parse_value_num`] at write time.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub host_key: String,
    pub host_name: String,
    pub host_address: String,
    pub plugin: String,
    pub name: String,
    pub category: String,
    pub metric_type: String,
    pub value: String,
    /// Which interface/CPU/disk the sample belongs to; `None` for scalars.
    pub instance: Option<String>,
    /// Plugin-specific metadata (SNMP OID, …), stored as JSON.
    pub extra: BTreeMap<String, String>,
    pub collected_at: DateTime<Utc>,
}

/// Entity-level data for a network interface — slowly-changing metadata as
/// opposed to the per-poll counters that land in [`MetricRecord`].
#[derive(Debug, Clone, Default)]
pub struct InterfaceRecord {
    pub host_key: String,
    pub host_name: String,
    pub host_address: String,
    pub if_index: i32,
    /// ifDescr.
    pub name: String,
    /// ifAlias; often empty.
    pub alias: String,
    /// IANA ifType integer (6 = ethernet, 24 = loopback, …).
    pub if_type: i32,
    /// ifSpeed in bps; `None` when unknown.
    pub speed: Option<i64>,
    /// Canonical `xx:xx:xx:xx:xx:xx`.
    pub mac_address: String,
    pub admin_status: String,
    pub oper_status: String,
}

/// One decoded flow datagram. The payload is the decoder's JSON output,
/// kept opaque to the store.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub host_key: String,
    pub host_name: String,
    pub host_address: String,
    /// "ipfix" | "netflow9" | "sflow".
    pub flow_type: String,
    pub payload: serde_json::Value,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported database scheme '{0}' (supported: sqlite, mysql, postgres)")]
    UnsupportedScheme(String),
}
