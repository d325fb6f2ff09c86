//! Opening the embedded database: directory creation, pragmas, migrations.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

use crate::error::StoreError;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub const MEMORY_URL: &str = ":memory:";

/// Open `database_url`, configure it and bring the schema up to date.
pub fn open(database_url: &str, busy_timeout: Duration) -> Result<SqliteConnection, StoreError> {
    let in_memory = is_in_memory(database_url);
    if !in_memory {
        ensure_parent_dir(database_url)?;
    }

    let mut conn = SqliteConnection::establish(database_url)?;
    configure(&mut conn, in_memory, busy_timeout)?;
    apply_database_migrations(&mut conn)?;
    debug!("Opened database {}", database_url);
    Ok(conn)
}

pub fn apply_database_migrations(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                debug!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(StoreError::Migration(format!("applying database migrations failed: {}", e))),
    }
}

fn configure(conn: &mut SqliteConnection, in_memory: bool, busy_timeout: Duration) -> Result<(), StoreError> {
    let mut pragmas = format!("PRAGMA busy_timeout = {};", busy_timeout.as_millis());
    if !in_memory {
        // readers keep working while the single writer commits
        pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    }
    conn.batch_execute(&pragmas)?;
    Ok(())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url == MEMORY_URL || database_url.contains("mode=memory")
}

fn ensure_parent_dir(database_url: &str) -> Result<(), StoreError> {
    let path = Path::new(database_url.strip_prefix("file:").unwrap_or(database_url));
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        info!("Created database directory {}", dir.display());
    }
    Ok(())
}

/// In-memory database with the real schema, for tests.
#[cfg(test)]
pub fn test_connection() -> SqliteConnection {
    open(MEMORY_URL, Duration::from_millis(100)).expect("in-memory database")
}
