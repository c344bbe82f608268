//! Ordered, append-only schema migrations for the Nord store.
//!
//! Each migration has a unique ascending version, a description, and a list
//! of SQL statements per database backend, applied in a single transaction
//! and recorded in `schema_migrations`. New migrations are appended at the
//! end — existing ones are never renumbered or reordered.

use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, Statement, TransactionTrait,
};
use std::collections::HashSet;

mod m001_initial_schema;
mod m002_metrics_extra;
mod m003_interfaces;
mod m004_flows;

pub trait MigrationTrait: Send + Sync {
    fn version(&self) -> i32;
    fn description(&self) -> &'static str;
    /// The SQL statements for this migration on the given backend.
    fn up(&self, backend: DatabaseBackend) -> Vec<String>;
}

pub struct Migrator;

impl Migrator {
    /// All migrations in ascending version order.
    pub fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m001_initial_schema::Migration),
            Box::new(m002_metrics_extra::Migration),
            Box::new(m003_interfaces::Migration),
            Box::new(m004_flows::Migration),
        ]
    }

    /// Apply any pending migrations.
    ///
    /// The tracker table is created first (it is not itself versioned).
    /// On a database initialised before migration tracking existed (the
    /// hosts table is present but `schema_migrations` is fresh), v1 is
    /// stamped as applied without re-running its DDL — MySQL < 8.0.12 has
    /// no `CREATE INDEX IF NOT EXISTS`.
    pub async fn up(db: &DatabaseConnection) -> Result<(), DbErr> {
        let backend = db.get_database_backend();

        db.execute_unprepared(tracker_ddl(backend)).await?;

        let rows = db
            .query_all(Statement::from_string(
                backend,
                "SELECT version FROM schema_migrations",
            ))
            .await?;
        let mut applied: HashSet<i32> = HashSet::new();
        for row in rows {
            applied.insert(row.try_get::<i32>("", "version")?);
        }

        for m in Self::migrations() {
            if applied.contains(&m.version()) {
                continue;
            }

            if m.version() == 1 && applied.is_empty() && schema_exists(db, backend).await? {
                db.execute(record_statement(backend, m.as_ref())).await?;
                tracing::info!(version = m.version(), "stamped pre-existing schema as v1");
                continue;
            }

            let txn = db.begin().await?;
            for stmt in m.up(backend) {
                txn.execute(Statement::from_string(backend, stmt)).await?;
            }
            txn.execute(record_statement(backend, m.as_ref())).await?;
            txn.commit().await?;
            tracing::info!(
                version = m.version(),
                description = m.description(),
                "applied migration"
            );
        }

        Ok(())
    }
}

fn record_statement(backend: DatabaseBackend, m: &dyn MigrationTrait) -> Statement {
    let sql = match backend {
        DatabaseBackend::Postgres => {
            "INSERT INTO schema_migrations (version, description) VALUES ($1, $2)"
        }
        _ => "INSERT INTO schema_migrations (version, description) VALUES (?, ?)",
    };
    Statement::from_sql_and_values(backend, sql, [m.version().into(), m.description().into()])
}

/// True when the hosts table already exists, meaning the database predates
/// migration tracking.
async fn schema_exists(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
) -> Result<bool, DbErr> {
    let sql = match backend {
        DatabaseBackend::Postgres => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = 'hosts'"
        }
        DatabaseBackend::MySql => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = 'hosts'"
        }
        _ => {
            "SELECT COUNT(*) AS n FROM sqlite_master \
             WHERE type = 'table' AND name = 'hosts'"
        }
    };
    let row = db
        .query_one(Statement::from_string(backend, sql))
        .await?
        .ok_or_else(|| DbErr::Custom("schema existence probe returned no row".to_string()))?;
    Ok(row.try_get::<i64>("", "n")? > 0)
}

/// DDL for the migrations tracker. Created before any migration runs.
fn tracker_ddl(backend: DatabaseBackend) -> &'static str {
    match backend {
        DatabaseBackend::Postgres => {
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version     INTEGER PRIMARY KEY,
                description TEXT    NOT NULL DEFAULT '',
                applied_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )"
        }
        DatabaseBackend::MySql => {
            // No DEFAULT on TEXT columns in MySQL — VARCHAR instead.
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version     INTEGER PRIMARY KEY,
                description VARCHAR(255) NOT NULL DEFAULT '',
                applied_at  DATETIME     NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        }
        _ => {
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version     INTEGER PRIMARY KEY,
                description TEXT    NOT NULL DEFAULT '',
                applied_at  DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_ascending_and_unique() {
        let migrations = Migrator::migrations();
        let mut last = 0;
        for m in &migrations {
            assert!(
                m.version() > last,
                "migration versions must ascend: v{} after v{last}",
                m.version()
            );
            last = m.version();
        }
        assert_eq!(migrations.len(), 4);
    }

    #[test]
    fn every_migration_has_statements_for_every_backend() {
        for backend in [
            DatabaseBackend::Sqlite,
            DatabaseBackend::MySql,
            DatabaseBackend::Postgres,
        ] {
            for m in Migrator::migrations() {
                assert!(
                    !m.up(backend).is_empty(),
                    "v{} has no statements for {backend:?}",
                    m.version()
                );
            }
        }
    }
}
