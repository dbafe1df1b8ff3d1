//! Conversion between [`Row`] and the positional values SQLite binds and
//! returns. Column names are resolved through the schema registry, so an
//! unknown name or a value of the wrong storage type is a
//! [`DbError::SchemaViolation`] rather than a silent skip.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use toychat_types::{Role, Row};

use crate::error::DbError;
use crate::schema::{Column, Field, TableSchema};

/// Values for the named columns of `row`, in the order given.
pub fn row_to_params<S: AsRef<str>>(
    table: &TableSchema,
    row: &Row,
    columns: &[S],
) -> Result<Vec<Value>, DbError> {
    Ok(bind_values(row, &table.resolve(columns)?))
}

/// Row with exactly the named columns populated from `values`.
pub fn row_from_scan<S: AsRef<str>>(
    table: &TableSchema,
    columns: &[S],
    values: Vec<Value>,
) -> Result<Row, DbError> {
    scan_values(&table.resolve(columns)?, values)
}

/// Same as [`row_to_params`] for columns already resolved by the statement builder.
pub fn bind_values(row: &Row, columns: &[&'static Column]) -> Vec<Value> {
    columns.iter().map(|c| field_value(row, c.field)).collect()
}

/// Same as [`row_from_scan`] for columns already resolved by the statement builder.
pub fn scan_values(columns: &[&'static Column], values: Vec<Value>) -> Result<Row, DbError> {
    if columns.len() != values.len() {
        return Err(DbError::schema(format!(
            "expected {} values, scanned {}",
            columns.len(),
            values.len()
        )));
    }

    let mut row = Row::default();
    for (column, value) in columns.iter().zip(values) {
        set_field(&mut row, column, value)?;
    }
    Ok(row)
}

fn field_value(row: &Row, field: Field) -> Value {
    match field {
        Field::Id => Value::Integer(row.id),
        Field::Name => Value::Text(row.name.clone()),
        Field::Email => Value::Text(row.email.clone()),
        Field::HashedPassword => Value::Text(row.hashed_password.clone()),
        Field::Created => timestamp_value(row.created),
        Field::Ended => timestamp_value(row.ended),
        Field::Role => Value::Text(row.role.as_str().to_string()),
        Field::Active => Value::Integer(row.active.into()),
        Field::Online => Value::Integer(row.online.into()),
        Field::DialogId => Value::Integer(row.dialog_id),
        Field::AgentId => Value::Integer(row.agent_id),
        Field::MessageId => Value::Integer(row.message_id),
        Field::Message => Value::Text(row.message.clone()),
        Field::DialogCount => Value::Integer(row.dialog_count),
    }
}

fn timestamp_value(ts: Option<DateTime<Utc>>) -> Value {
    match ts {
        Some(ts) => Value::Text(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => Value::Null,
    }
}

fn set_field(row: &mut Row, column: &Column, value: Value) -> Result<(), DbError> {
    // NULL leaves the field at its zero value.
    if value == Value::Null {
        return Ok(());
    }

    match column.field {
        Field::Id => row.id = expect_integer(column, value)?,
        Field::Name => row.name = expect_text(column, value)?,
        Field::Email => row.email = expect_text(column, value)?,
        Field::HashedPassword => row.hashed_password = expect_text(column, value)?,
        Field::Created => row.created = Some(expect_timestamp(column, value)?),
        Field::Ended => row.ended = Some(expect_timestamp(column, value)?),
        Field::Role => row.role = expect_role(column, value)?,
        Field::Active => row.active = expect_bool(column, value)?,
        Field::Online => row.online = expect_bool(column, value)?,
        Field::DialogId => row.dialog_id = expect_integer(column, value)?,
        Field::AgentId => row.agent_id = expect_integer(column, value)?,
        Field::MessageId => row.message_id = expect_integer(column, value)?,
        Field::Message => row.message = expect_text(column, value)?,
        Field::DialogCount => row.dialog_count = expect_integer(column, value)?,
    }
    Ok(())
}

fn expect_bool(column: &Column, value: Value) -> Result<bool, DbError> {
    match expect_integer(column, value)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(mismatch(column, &format!("integer {}", other))),
    }
}

fn expect_timestamp(column: &Column, value: Value) -> Result<DateTime<Utc>, DbError> {
    let s = expect_text(column, value)?;
    parse_timestamp(&s).ok_or_else(|| mismatch(column, &format!("text {:?}", s)))
}

fn expect_role(column: &Column, value: Value) -> Result<Role, DbError> {
    expect_text(column, value)?
        .parse::<Role>()
        .map_err(|e| DbError::schema(format!("column {}: {}", column.name, e)))
}

fn expect_integer(column: &Column, value: Value) -> Result<i64, DbError> {
    match value {
        Value::Integer(n) => Ok(n),
        other => Err(mismatch(column, describe(&other))),
    }
}

fn expect_text(column: &Column, value: Value) -> Result<String, DbError> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(mismatch(column, describe(&other))),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    }
}

fn mismatch(column: &Column, got: &str) -> DbError {
    DbError::schema(format!(
        "column {} expects {:?}, got {}",
        column.name,
        column.field.column_type(),
        got
    ))
}

/// RFC 3339, or SQLite's `datetime()` format for rows written by hand.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::schema;

    #[test]
    fn params_follow_requested_order() {
        let users = schema::table("users").unwrap();
        let row = Row {
            id: 4,
            email: "ann@x.com".into(),
            role: Role::User,
            active: true,
            ..Default::default()
        };
        let params = row_to_params(users, &row, &["role", "email", "active", "id"]).unwrap();
        assert_eq!(
            params,
            vec![
                Value::Text("user".into()),
                Value::Text("ann@x.com".into()),
                Value::Integer(1),
                Value::Integer(4),
            ]
        );
    }

    #[test]
    fn unknown_column_is_not_skipped() {
        let users = schema::table("users").unwrap();
        let err = row_to_params(users, &Row::default(), &["email", "password"]).unwrap_err();
        assert!(matches!(err, DbError::SchemaViolation(_)));
    }

    #[test]
    fn scan_populates_only_named_fields() {
        let dialogs = schema::table("dialogs").unwrap();
        let row = row_from_scan(
            dialogs,
            &["dialog_id", "user_id", "started", "ended"],
            vec![
                Value::Integer(12),
                Value::Integer(3),
                Value::Text("2020-05-01T12:30:00Z".into()),
                Value::Null,
            ],
        )
        .unwrap();
        assert_eq!(row.dialog_id, 12);
        assert_eq!(row.id, 3);
        assert_eq!(row.created, Some(Utc.with_ymd_and_hms(2020, 5, 1, 12, 30, 0).unwrap()));
        assert_eq!(row.ended, None);
        assert_eq!(row.agent_id, 0);
    }

    #[test]
    fn wrong_scanned_type_is_recoverable() {
        let users = schema::table("users").unwrap();
        let cases: Vec<(&str, Value)> = vec![
            ("id", Value::Text("7".into())),
            ("email", Value::Integer(7)),
            ("active", Value::Integer(2)),
            ("created", Value::Text("yesterday".into())),
            ("role", Value::Text("janitor".into())),
            ("name", Value::Blob(vec![1, 2])),
        ];
        for (column, value) in cases {
            let err = row_from_scan(users, &[column], vec![value]).unwrap_err();
            assert!(matches!(err, DbError::SchemaViolation(_)), "{}", column);
        }
    }

    #[test]
    fn scan_length_mismatch() {
        let users = schema::table("users").unwrap();
        let err = row_from_scan(users, &["id", "email"], vec![Value::Integer(1)]).unwrap_err();
        assert!(matches!(err, DbError::SchemaViolation(_)));
    }

    #[test]
    fn timestamps_written_and_read_alike() {
        let messages = schema::table("messages").unwrap();
        let ts = Utc.with_ymd_and_hms(2021, 1, 2, 3, 4, 5).unwrap();
        let row = Row { created: Some(ts), ..Default::default() };
        let params = row_to_params(messages, &row, &["created"]).unwrap();
        let back = row_from_scan(messages, &["created"], params).unwrap();
        assert_eq!(back.created, Some(ts));

        let legacy = row_from_scan(messages, &["created"], vec![Value::Text("2021-01-02 03:04:05".into())])
            .unwrap();
        assert_eq!(legacy.created, Some(ts));
    }
}
