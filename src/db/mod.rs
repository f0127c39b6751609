mod checkpoint_repository;
mod event_repository;
mod models;
mod patch;
mod task_repository;

use crate::errors::StoreError;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;
use std::time::Duration;

pub use checkpoint_repository::*;
pub use event_repository::*;
pub use models::*;
pub use patch::*;
pub use task_repository::*;

pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Tables are created on open; the statements are idempotent.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    query TEXT NOT NULL,
    status TEXT NOT NULL,
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status);
CREATE TABLE IF NOT EXISTS checkpoints (
    task_id TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL,
    sequence BIGINT NOT NULL,
    snapshot TEXT NOT NULL,
    saved_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS task_events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_events_channel ON task_events (channel, seq);
";

/// Per-connection pragmas so several processes can share one database file
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Shared SQLite connection pool
#[derive(Clone, Debug)]
pub struct Database {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
}

impl Database {
    /// Opens (or creates) the database at `db_path` and ensures the schema exists
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let manager = ConnectionManager::<SqliteConnection>::new(db_path);
        let pool = Pool::builder()
            .max_size(8)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: Duration::from_secs(5),
            }))
            .build(manager)?;

        let database = Database {
            pool: Arc::new(pool),
        };
        database.get_conn()?.batch_execute(SCHEMA_SQL)?;
        Ok(database)
    }

    pub fn get_conn(&self) -> Result<DbConn, StoreError> {
        Ok(self.pool.get()?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Database;
    use tempfile::TempDir;

    /// A database file in a fresh temporary directory. Keep the `TempDir`
    /// alive for as long as the database is used.
    pub fn temp_database() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("delver-test.db");
        let db = Database::open(path.to_str().expect("utf-8 path")).expect("open database");
        (dir, db)
    }

    /// A second handle on the same file, standing in for another process
    pub fn reopen(dir: &TempDir) -> Database {
        let path = dir.path().join("delver-test.db");
        Database::open(path.to_str().expect("utf-8 path")).expect("reopen database")
    }
}
