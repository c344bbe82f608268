use crate::MigrationTrait;
use sea_orm::DatabaseBackend;

pub struct Migration;

impl MigrationTrait for Migration {
    fn version(&self) -> i32 {
        4
    }

    fn description(&self) -> &'static str {
        "add flows table for IPFIX/NetFlow/sFlow datagrams"
    }

    fn up(&self, backend: DatabaseBackend) -> Vec<String> {
        match backend {
            DatabaseBackend::Postgres => vec![
                "CREATE TABLE IF NOT EXISTS flows (
                    id           BIGSERIAL PRIMARY KEY,
                    host_id      BIGINT NOT NULL REFERENCES hosts(id),
                    flow_type    TEXT NOT NULL DEFAULT '',
                    payload      JSONB,
                    collected_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )"
                .to_string(),
                "CREATE INDEX idx_flows_host_time ON flows (host_id, collected_at DESC)"
                    .to_string(),
            ],
            DatabaseBackend::MySql => vec![
                "CREATE TABLE IF NOT EXISTS flows (
                    id           BIGINT AUTO_INCREMENT PRIMARY KEY,
                    host_id      BIGINT NOT NULL,
                    flow_type    VARCHAR(20) NOT NULL DEFAULT '',
                    payload      JSON,
                    collected_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    CONSTRAINT fk_flows_host FOREIGN KEY (host_id) REFERENCES hosts(id)
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
                    .to_string(),
                "CREATE INDEX idx_flows_host_time ON flows (host_id, collected_at)".to_string(),
            ],
            _ => vec![
                "CREATE TABLE IF NOT EXISTS flows (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    host_id      INTEGER NOT NULL REFERENCES hosts(id),
                    flow_type    TEXT NOT NULL DEFAULT '',
                    payload      TEXT,
                    collected_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
                )"
                .to_string(),
                "CREATE INDEX idx_flows_host_time ON flows (host_id, collected_at DESC)"
                    .to_string(),
            ],
        }
    }
}
