use rusqlite::types::Value;
use rusqlite::{Connection, TransactionBehavior, params, params_from_iter};
use toychat_types::{Role, Row};
use tracing::debug;

use crate::error::DbError;
use crate::marshal::{bind_values, scan_values};
use crate::statements::{self, Statement};
use crate::Database;

/// Default ceiling on open dialogs per agent.
pub const DEFAULT_AGENT_CAPACITY: i64 = 3;

impl Database {
    /// Insert one record per row. Rows are written one by one and the first
    /// failure stops the batch; earlier rows stay written.
    pub fn insert_rows<S: AsRef<str>>(&self, table: &str, put: &[S], rows: &[Row]) -> Result<usize, DbError> {
        let stmt = statements::insert(table, put)?;
        self.with_conn(|conn| {
            let mut prepared = conn.prepare_cached(&stmt.sql)?;
            for row in rows {
                prepared.execute(params_from_iter(bind_values(row, &stmt.binds)))?;
            }
            debug!(table = stmt.table.name, rows = rows.len(), "inserted");
            Ok(rows.len())
        })
    }

    /// Run the SELECT once per filter row and concatenate the results.
    /// No match across all filters is `NotFound`.
    pub fn get_rows<S: AsRef<str>>(
        &self,
        table: &str,
        get: &[S],
        spec: &[S],
        filters: &[Row],
    ) -> Result<Vec<Row>, DbError> {
        let stmt = statements::select(table, get, spec)?;
        let found = self.with_conn(|conn| {
            let mut found = Vec::new();
            for filter in filters {
                found.extend(query_rows(conn, &stmt, filter)?);
            }
            Ok(found)
        })?;

        if found.is_empty() {
            return Err(DbError::NotFound);
        }
        Ok(found)
    }

    /// Update with each row's put and spec values. Returns the total number
    /// of rows affected; zero is not an error.
    pub fn put_rows<S: AsRef<str>>(
        &self,
        table: &str,
        put: &[S],
        spec: &[S],
        rows: &[Row],
    ) -> Result<usize, DbError> {
        let stmt = statements::update(table, put, spec)?;
        self.with_conn(|conn| {
            let mut prepared = conn.prepare_cached(&stmt.sql)?;
            let mut affected = 0;
            for row in rows {
                affected += prepared.execute(params_from_iter(bind_values(row, &stmt.binds)))?;
            }
            debug!(table = stmt.table.name, rows = rows.len(), affected, "updated");
            Ok(affected)
        })
    }

    /// Pick the least loaded active agent below `capacity` and bump its load.
    ///
    /// The read and the increment run in one IMMEDIATE transaction, which
    /// takes SQLite's write lock before the SELECT. A second selection waits
    /// for the first to commit and then sees the incremented load, so an
    /// agent can never be handed out past its capacity. Returns a row with
    /// `agent_id` and the new `dialog_count`.
    pub fn select_agent(&self, capacity: i64) -> Result<Row, DbError> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let picked: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT id, dialog_count FROM admins
                     WHERE role = ?1 AND active = 1 AND dialog_count < ?2
                     ORDER BY dialog_count ASC, id ASC
                     LIMIT 1",
                    params![Role::Agent.as_str(), capacity],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            // Dropping `tx` on any early return rolls it back.
            let Some((agent_id, load)) = picked else {
                return Err(DbError::NotFound);
            };

            tx.execute(
                "UPDATE admins SET dialog_count = dialog_count + 1 WHERE id = ?1",
                [agent_id],
            )?;
            tx.commit()?;

            debug!(agent_id, load = load + 1, "agent assigned");
            Ok(Row {
                agent_id,
                role: Role::Agent,
                dialog_count: load + 1,
                ..Default::default()
            })
        })
    }
}

fn query_rows(conn: &Connection, stmt: &Statement, filter: &Row) -> Result<Vec<Row>, DbError> {
    let mut prepared = conn.prepare_cached(&stmt.sql)?;
    let width = stmt.results.len();
    let scanned = prepared
        .query_map(params_from_iter(bind_values(filter, &stmt.binds)), |row| {
            (0..width).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    scanned
        .into_iter()
        .map(|values| scan_values(&stmt.results, values))
        .collect()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, DbError>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, DbError> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
