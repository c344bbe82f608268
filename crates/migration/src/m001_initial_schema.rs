use crate::MigrationTrait;
use sea_orm::DatabaseBackend;

pub struct Migration;

impl MigrationTrait for Migration {
    fn version(&self) -> i32 {
        1
    }

    fn description(&self) -> &'static str {
        "initial schema: hosts and metrics tables"
    }

    // CREATE TABLE uses IF NOT EXISTS (idempotent everywhere); CREATE INDEX
    // deliberately does not — MySQL < 8.0.12 doesn't support it, and the
    // runner's bootstrap check keeps v1 from re-running on an existing
    // schema.
    fn up(&self, backend: DatabaseBackend) -> Vec<String> {
        match backend {
            DatabaseBackend::Postgres => vec![
                "CREATE TABLE IF NOT EXISTS hosts (
                    id         BIGSERIAL PRIMARY KEY,
                    key        TEXT UNIQUE NOT NULL,
                    name       TEXT NOT NULL DEFAULT '',
                    address    TEXT NOT NULL DEFAULT '',
                    first_seen TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    last_seen  TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )"
                .to_string(),
                "CREATE TABLE IF NOT EXISTS metrics (
                    id           BIGSERIAL PRIMARY KEY,
                    host_id      BIGINT NOT NULL REFERENCES hosts(id),
                    plugin       TEXT NOT NULL DEFAULT '',
                    name         TEXT NOT NULL DEFAULT '',
                    category     TEXT NOT NULL DEFAULT '',
                    metric_type  TEXT NOT NULL DEFAULT '',
                    value        TEXT NOT NULL DEFAULT '',
                    value_num    DOUBLE PRECISION,
                    collected_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )"
                .to_string(),
                "CREATE INDEX idx_metrics_host_time ON metrics (host_id, collected_at DESC)"
                    .to_string(),
                "CREATE INDEX idx_metrics_host_name ON metrics (host_id, plugin, name, collected_at DESC)"
                    .to_string(),
            ],

            // `key` is reserved in MySQL and must stay back-tick quoted in
            // DDL and queries. TEXT columns need index prefix lengths, and
            // DATETIME has no timezone — the store writes UTC.
            DatabaseBackend::MySql => vec![
                "CREATE TABLE IF NOT EXISTS hosts (
                    id         BIGINT AUTO_INCREMENT PRIMARY KEY,
                    `key`      VARCHAR(255) UNIQUE NOT NULL,
                    name       VARCHAR(255) NOT NULL DEFAULT '',
                    address    VARCHAR(255) NOT NULL DEFAULT '',
                    first_seen DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    last_seen  DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
                    .to_string(),
                "CREATE TABLE IF NOT EXISTS metrics (
                    id           BIGINT AUTO_INCREMENT PRIMARY KEY,
                    host_id      BIGINT NOT NULL,
                    plugin       VARCHAR(100) NOT NULL DEFAULT '',
                    name         VARCHAR(255) NOT NULL DEFAULT '',
                    category     VARCHAR(100) NOT NULL DEFAULT '',
                    metric_type  VARCHAR(50)  NOT NULL DEFAULT '',
                    value        TEXT         NOT NULL,
                    value_num    DOUBLE,
                    collected_at DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    CONSTRAINT fk_metrics_host FOREIGN KEY (host_id) REFERENCES hosts(id)
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
                    .to_string(),
                "CREATE INDEX idx_metrics_host_time ON metrics (host_id, collected_at)"
                    .to_string(),
                "CREATE INDEX idx_metrics_host_name ON metrics (host_id, plugin, name(100), collected_at)"
                    .to_string(),
            ],

            _ => vec![
                "CREATE TABLE IF NOT EXISTS hosts (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    key        TEXT UNIQUE NOT NULL,
                    name       TEXT NOT NULL DEFAULT '',
                    address    TEXT NOT NULL DEFAULT '',
                    first_seen DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    last_seen  DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
                )"
                .to_string(),
                "CREATE TABLE IF NOT EXISTS metrics (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    host_id      INTEGER NOT NULL REFERENCES hosts(id),
                    plugin       TEXT NOT NULL DEFAULT '',
                    name         TEXT NOT NULL DEFAULT '',
                    category     TEXT NOT NULL DEFAULT '',
                    metric_type  TEXT NOT NULL DEFAULT '',
                    value        TEXT NOT NULL DEFAULT '',
                    value_num    REAL,
                    collected_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
                )"
                .to_string(),
                "CREATE INDEX idx_metrics_host_time ON metrics (host_id, collected_at DESC)"
                    .to_string(),
                "CREATE INDEX idx_metrics_host_name ON metrics (host_id, plugin, name, collected_at DESC)"
                    .to_string(),
            ],
        }
    }
}
