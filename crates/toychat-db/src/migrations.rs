use rusqlite::Connection;
use tracing::info;

use crate::error::DbError;

pub fn run(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL DEFAULT '',
                email           TEXT NOT NULL,
                hashed_password TEXT NOT NULL DEFAULT '',
                created         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                role            TEXT NOT NULL DEFAULT '',
                active          INTEGER NOT NULL DEFAULT 1,
                online          INTEGER NOT NULL DEFAULT 0,
                CONSTRAINT users_uc_email UNIQUE (email)
            );

            CREATE TABLE admins (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL DEFAULT '',
                email           TEXT NOT NULL,
                hashed_password TEXT NOT NULL DEFAULT '',
                created         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                role            TEXT NOT NULL DEFAULT '',
                active          INTEGER NOT NULL DEFAULT 1,
                online          INTEGER NOT NULL DEFAULT 0,
                dialog_count    INTEGER NOT NULL DEFAULT 0,
                CONSTRAINT admins_uc_email UNIQUE (email)
            );

            CREATE INDEX idx_admins_load ON admins(role, dialog_count);

            CREATE TABLE dialogs (
                dialog_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL,
                agent_id    INTEGER NOT NULL DEFAULT 0,
                started     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                ended       TEXT
            );

            CREATE INDEX idx_dialogs_user ON dialogs(user_id);

            CREATE TABLE messages (
                message_id  INTEGER PRIMARY KEY AUTOINCREMENT,
                dialog_id   INTEGER NOT NULL,
                created     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                message     TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX idx_messages_dialog ON messages(dialog_id, created);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
