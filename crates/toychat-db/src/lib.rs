pub mod error;
pub mod marshal;
pub mod migrations;
pub mod queries;
pub mod schema;
pub mod statements;

use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::info;

pub use error::DbError;

/// Pool sizing and lock-wait bounds for [`Database::open`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub pool_size: usize,
    /// How long a connection waits on another connection's write lock
    /// before the statement fails with `SQLITE_BUSY`. Also bounds the wait
    /// for a free connection when the whole pool is checked out.
    pub busy_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Storage engine handle: a fixed pool of SQLite connections to one file.
///
/// Each operation checks out an idle connection for its whole duration and
/// returns it when the closure finishes, so concurrent callers never share a
/// connection and a caller never queues behind a busy connection while
/// another one is idle. Coordination between connections is left to
/// SQLite's own locking.
pub struct Database {
    idle: Mutex<Vec<Connection>>,
    returned: Condvar,
    size: usize,
    checkout_timeout: Duration,
}

impl Database {
    pub fn open(path: &Path, config: &DbConfig) -> Result<Self, DbError> {
        let pool_size = config.pool_size.max(1);

        let first = Connection::open(path)?;
        // WAL mode for concurrent reads
        first.pragma_update(None, "journal_mode", "WAL")?;
        first.busy_timeout(config.busy_timeout)?;
        migrations::run(&first)?;

        let mut conns = Vec::with_capacity(pool_size);
        conns.push(first);
        for _ in 1..pool_size {
            let conn = Connection::open(path)?;
            conn.busy_timeout(config.busy_timeout)?;
            conns.push(conn);
        }

        info!("Database opened at {} ({} connections)", path.display(), pool_size);
        Ok(Self {
            idle: Mutex::new(conns),
            returned: Condvar::new(),
            size: pool_size,
            checkout_timeout: config.busy_timeout,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.size
    }

    /// Run `f` on a checked-out connection. The connection goes back to the
    /// pool when `f` returns, whatever the outcome.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DbError>,
    {
        let mut checked_out = self.checkout()?;
        f(checked_out.conn()?)
    }

    fn lock_idle(&self) -> Result<MutexGuard<'_, Vec<Connection>>, DbError> {
        self.idle
            .lock()
            .map_err(|e| DbError::Pool(format!("pool lock poisoned: {}", e)))
    }

    /// Take any idle connection, waiting up to `checkout_timeout` for one to
    /// come back if all are in use.
    fn checkout(&self) -> Result<CheckedOut<'_>, DbError> {
        let deadline = Instant::now() + self.checkout_timeout;
        let mut idle = self.lock_idle()?;
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(CheckedOut { db: self, conn: Some(conn) });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DbError::Pool(format!(
                    "no connection free within {:?}",
                    self.checkout_timeout
                )));
            }
            idle = self
                .returned
                .wait_timeout(idle, deadline - now)
                .map_err(|e| DbError::Pool(format!("pool lock poisoned: {}", e)))?
                .0;
        }
    }
}

/// A connection out of the pool. Dropping it puts the connection back and
/// wakes one waiter, also when the closure using it panicked.
struct CheckedOut<'a> {
    db: &'a Database,
    conn: Option<Connection>,
}

impl CheckedOut<'_> {
    fn conn(&mut self) -> Result<&mut Connection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Pool("connection already returned".into()))
    }
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Ok(mut idle) = self.db.idle.lock() {
                idle.push(conn);
            }
            self.db.returned.notify_one();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use tempfile::TempDir;

    use super::*;

    /// Fresh file-backed database; the TempDir must outlive the handle.
    pub fn open_temp(pool_size: usize) -> (TempDir, Database) {
        open_temp_with(DbConfig {
            pool_size,
            ..Default::default()
        })
    }

    pub fn open_temp_with(config: DbConfig) -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("toychat.db"), &config).unwrap();
        (dir, db)
    }
}
