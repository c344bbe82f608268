use crate::MigrationTrait;
use sea_orm::DatabaseBackend;

pub struct Migration;

impl MigrationTrait for Migration {
    fn version(&self) -> i32 {
        3
    }

    fn description(&self) -> &'static str {
        "add instance column to metrics; add interfaces entity table"
    }

    // `instance` identifies which interface/CPU/disk a metric belongs to
    // (NULL for scalars). `interfaces` holds slowly-changing entity
    // metadata discovered via SNMP table walks, unique per (host_id,
    // if_index).
    fn up(&self, backend: DatabaseBackend) -> Vec<String> {
        match backend {
            DatabaseBackend::Postgres => vec![
                "ALTER TABLE metrics ADD COLUMN instance TEXT".to_string(),
                "CREATE TABLE IF NOT EXISTS interfaces (
                    id           BIGSERIAL PRIMARY KEY,
                    host_id      BIGINT NOT NULL REFERENCES hosts(id),
                    if_index     INTEGER NOT NULL,
                    name         TEXT NOT NULL DEFAULT '',
                    alias        TEXT NOT NULL DEFAULT '',
                    type         INTEGER NOT NULL DEFAULT 0,
                    speed        BIGINT,
                    mac_address  TEXT NOT NULL DEFAULT '',
                    admin_status TEXT NOT NULL DEFAULT '',
                    oper_status  TEXT NOT NULL DEFAULT '',
                    first_seen   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    last_seen    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    UNIQUE(host_id, if_index)
                )"
                .to_string(),
                "CREATE INDEX idx_interfaces_host ON interfaces (host_id)".to_string(),
            ],
            DatabaseBackend::MySql => vec![
                "ALTER TABLE metrics ADD COLUMN instance VARCHAR(255)".to_string(),
                "CREATE TABLE IF NOT EXISTS interfaces (
                    id           BIGINT AUTO_INCREMENT PRIMARY KEY,
                    host_id      BIGINT NOT NULL,
                    if_index     INT NOT NULL,
                    name         VARCHAR(255) NOT NULL DEFAULT '',
                    alias        VARCHAR(255) NOT NULL DEFAULT '',
                    type         INT NOT NULL DEFAULT 0,
                    speed        BIGINT,
                    mac_address  VARCHAR(17) NOT NULL DEFAULT '',
                    admin_status VARCHAR(20) NOT NULL DEFAULT '',
                    oper_status  VARCHAR(20) NOT NULL DEFAULT '',
                    first_seen   DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    last_seen    DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    CONSTRAINT fk_interfaces_host FOREIGN KEY (host_id) REFERENCES hosts(id),
                    UNIQUE KEY uk_interfaces_host_index (host_id, if_index)
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
                    .to_string(),
                "CREATE INDEX idx_interfaces_host ON interfaces (host_id)".to_string(),
            ],
            _ => vec![
                "ALTER TABLE metrics ADD COLUMN instance TEXT".to_string(),
                "CREATE TABLE IF NOT EXISTS interfaces (
                    id           INTEGER PRIMARY KEY AUTOINCREMENT,
                    host_id      INTEGER NOT NULL REFERENCES hosts(id),
                    if_index     INTEGER NOT NULL,
                    name         TEXT NOT NULL DEFAULT '',
                    alias        TEXT NOT NULL DEFAULT '',
                    type         INTEGER NOT NULL DEFAULT 0,
                    speed        INTEGER,
                    mac_address  TEXT NOT NULL DEFAULT '',
                    admin_status TEXT NOT NULL DEFAULT '',
                    oper_status  TEXT NOT NULL DEFAULT '',
                    first_seen   DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    last_seen    DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    UNIQUE(host_id, if_index)
                )"
                .to_string(),
                "CREATE INDEX idx_interfaces_host ON interfaces (host_id)".to_string(),
            ],
        }
    }
}
