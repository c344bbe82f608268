use crate::MigrationTrait;
use sea_orm::DatabaseBackend;

pub struct Migration;

impl MigrationTrait for Migration {
    fn version(&self) -> i32 {
        2
    }

    fn description(&self) -> &'static str {
        "add extra JSON column to metrics"
    }

    fn up(&self, backend: DatabaseBackend) -> Vec<String> {
        match backend {
            DatabaseBackend::Postgres => {
                vec!["ALTER TABLE metrics ADD COLUMN extra JSONB".to_string()]
            }
            DatabaseBackend::MySql => {
                vec!["ALTER TABLE metrics ADD COLUMN extra JSON".to_string()]
            }
            _ => vec!["ALTER TABLE metrics ADD COLUMN extra TEXT".to_string()],
        }
    }
}
