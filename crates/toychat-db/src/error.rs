use rusqlite::ffi;
use toychat_types::ExchangeError;

/// Storage-side failures. Converted into [`ExchangeError`] before anything
/// crosses the wire.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("{statement} without a WHERE clause is not permitted")]
    MissingFilter { statement: &'static str },

    #[error("{statement} needs at least one {list} column")]
    EmptyColumns {
        statement: &'static str,
        list: &'static str,
    },

    #[error("no matching record found")]
    NotFound,

    #[error("duplicate email")]
    DuplicateKey,

    #[error("connection pool: {0}")]
    Pool(String),

    #[error("sqlite: {0}")]
    Sqlite(rusqlite::Error),
}

impl DbError {
    pub fn schema(detail: impl Into<String>) -> Self {
        Self::SchemaViolation(detail.into())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        if is_duplicate_email(&e) {
            return Self::DuplicateKey;
        }
        Self::Sqlite(e)
    }
}

/// A UNIQUE violation on an `email` column. SQLite reports it as
/// "UNIQUE constraint failed: <table>.email".
fn is_duplicate_email(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, Some(msg)) => {
            err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE && msg.contains(".email")
        }
        _ => false,
    }
}

impl From<DbError> for ExchangeError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => ExchangeError::NotFound,
            DbError::DuplicateKey => ExchangeError::DuplicateKey,
            other => ExchangeError::Failure(other.to_string()),
        }
    }
}
