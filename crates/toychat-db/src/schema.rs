//! Table registry: the one place that knows which columns exist and which
//! [`Row`](toychat_types::Row) field each column maps to. Both the statement
//! builder and row marshaling resolve names through it.

use crate::error::DbError;

/// A field of the generic row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Name,
    Email,
    HashedPassword,
    Created,
    Ended,
    Role,
    Active,
    Online,
    DialogId,
    AgentId,
    MessageId,
    Message,
    DialogCount,
}

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    /// INTEGER 0/1
    Bool,
    /// RFC 3339 TEXT, nullable
    Timestamp,
    /// TEXT drawn from the closed role set
    Role,
}

impl Field {
    pub fn column_type(self) -> ColumnType {
        match self {
            Self::Id | Self::DialogId | Self::AgentId | Self::MessageId | Self::DialogCount => {
                ColumnType::Integer
            }
            Self::Name | Self::Email | Self::HashedPassword | Self::Message => ColumnType::Text,
            Self::Created | Self::Ended => ColumnType::Timestamp,
            Self::Active | Self::Online => ColumnType::Bool,
            Self::Role => ColumnType::Role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub field: Field,
}

const fn col(name: &'static str, field: Field) -> Column {
    Column { name, field }
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
}

const USERS: &[Column] = &[
    col("id", Field::Id),
    col("name", Field::Name),
    col("email", Field::Email),
    col("hashed_password", Field::HashedPassword),
    col("created", Field::Created),
    col("role", Field::Role),
    col("active", Field::Active),
    col("online", Field::Online),
];

const ADMINS: &[Column] = &[
    col("id", Field::Id),
    col("name", Field::Name),
    col("email", Field::Email),
    col("hashed_password", Field::HashedPassword),
    col("created", Field::Created),
    col("role", Field::Role),
    col("active", Field::Active),
    col("online", Field::Online),
    col("dialog_count", Field::DialogCount),
];

const DIALOGS: &[Column] = &[
    col("dialog_id", Field::DialogId),
    col("user_id", Field::Id),
    col("agent_id", Field::AgentId),
    col("started", Field::Created),
    col("ended", Field::Ended),
];

const MESSAGES: &[Column] = &[
    col("message_id", Field::MessageId),
    col("dialog_id", Field::DialogId),
    col("created", Field::Created),
    col("message", Field::Message),
];

pub static TABLES: &[TableSchema] = &[
    TableSchema { name: "users", columns: USERS },
    TableSchema { name: "admins", columns: ADMINS },
    TableSchema { name: "dialogs", columns: DIALOGS },
    TableSchema { name: "messages", columns: MESSAGES },
];

pub fn table(name: &str) -> Result<&'static TableSchema, DbError> {
    TABLES
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| DbError::schema(format!("unknown table {:?}", name)))
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Result<&'static Column, DbError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DbError::schema(format!("unknown column {:?} in table {}", name, self.name)))
    }

    /// Resolve a list of names, failing on the first unknown one.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&'static Column>, DbError> {
        names.iter().map(|n| self.column(n.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        let dialogs = table("dialogs").unwrap();
        assert_eq!(dialogs.column("user_id").unwrap().field, Field::Id);
        assert_eq!(dialogs.column("started").unwrap().field.column_type(), ColumnType::Timestamp);
        assert!(table("admins").unwrap().column("dialog_count").is_ok());
        assert!(table("users").unwrap().column("dialog_count").is_err());
    }

    #[test]
    fn unknown_names_are_schema_violations() {
        assert!(matches!(table("sessions"), Err(DbError::SchemaViolation(_))));
        let users = table("users").unwrap();
        assert!(matches!(
            users.resolve(&["email", "password"]),
            Err(DbError::SchemaViolation(_))
        ));
    }

    #[test]
    fn column_names_unique_per_table() {
        for t in TABLES {
            for (i, c) in t.columns.iter().enumerate() {
                assert!(
                    t.columns[i + 1..].iter().all(|o| o.name != c.name),
                    "{} repeats column {}",
                    t.name,
                    c.name
                );
            }
        }
    }
}
