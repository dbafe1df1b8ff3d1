use crate::error::DbError;
use crate::schema::{self, Column, TableSchema};

/// Columns that INSERT fills with the storage engine's current time instead
/// of a bound value.
pub const NOW_COLUMNS: &[&str] = &["created", "started"];

const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

/// SQL text plus the columns whose values bind to `?1..?N`, in order.
#[derive(Debug, Clone)]
pub struct Statement {
    pub table: &'static TableSchema,
    pub sql: String,
    pub binds: Vec<&'static Column>,
    /// Columns of each result row. Empty for INSERT/UPDATE.
    pub results: Vec<&'static Column>,
}

/// `INSERT INTO t (c1, c2, created) VALUES (?1, ?2, now)`
pub fn insert<S: AsRef<str>>(table: &str, put: &[S]) -> Result<Statement, DbError> {
    let schema = schema::table(table)?;
    let put = schema.resolve(put)?;
    if put.is_empty() {
        return Err(DbError::EmptyColumns { statement: "INSERT", list: "put" });
    }

    let mut binds = Vec::with_capacity(put.len());
    let mut values = Vec::with_capacity(put.len());
    for c in &put {
        if NOW_COLUMNS.contains(&c.name) {
            values.push(NOW_SQL.to_string());
        } else {
            binds.push(*c);
            values.push(format!("?{}", binds.len()));
        }
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.name,
        names(&put).join(", "),
        values.join(", ")
    );
    Ok(Statement { table: schema, sql, binds, results: Vec::new() })
}

/// `UPDATE t SET p1 = ?1 WHERE s1 = ?2 AND s2 = ?3`
pub fn update<S: AsRef<str>>(table: &str, put: &[S], spec: &[S]) -> Result<Statement, DbError> {
    let schema = schema::table(table)?;
    let put = schema.resolve(put)?;
    let spec = schema.resolve(spec)?;
    if put.is_empty() {
        return Err(DbError::EmptyColumns { statement: "UPDATE", list: "put" });
    }
    if spec.is_empty() {
        return Err(DbError::MissingFilter { statement: "UPDATE" });
    }

    let sets: Vec<String> = put
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c.name, i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        schema.name,
        sets.join(", "),
        predicates(&spec, put.len())
    );

    let mut binds = put;
    binds.extend(spec);
    Ok(Statement { table: schema, sql, binds, results: Vec::new() })
}

/// `SELECT g1, g2 FROM t WHERE s1 = ?1 AND s2 = ?2`
pub fn select<S: AsRef<str>>(table: &str, get: &[S], spec: &[S]) -> Result<Statement, DbError> {
    let schema = schema::table(table)?;
    let get = schema.resolve(get)?;
    let spec = schema.resolve(spec)?;
    if get.is_empty() {
        return Err(DbError::EmptyColumns { statement: "SELECT", list: "get" });
    }
    if spec.is_empty() {
        return Err(DbError::MissingFilter { statement: "SELECT" });
    }

    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        names(&get).join(", "),
        schema.name,
        predicates(&spec, 0)
    );
    Ok(Statement { table: schema, sql, binds: spec, results: get })
}

fn names(columns: &[&'static Column]) -> Vec<&'static str> {
    columns.iter().map(|c| c.name).collect()
}

/// AND-joined equalities with placeholders numbered after `offset`.
fn predicates(spec: &[&'static Column], offset: usize) -> String {
    spec.iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c.name, offset + i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind_names(stmt: &Statement) -> Vec<&'static str> {
        names(&stmt.binds)
    }

    #[test]
    fn insert_fills_now_columns_in_place() {
        let stmt = insert("users", &["name", "email", "hashed_password", "created", "role"]).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (name, email, hashed_password, created, role) \
             VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), ?4)"
        );
        assert_eq!(bind_names(&stmt), ["name", "email", "hashed_password", "role"]);
    }

    #[test]
    fn started_is_also_filled_by_storage() {
        let stmt = insert("dialogs", &["user_id", "agent_id", "started"]).unwrap();
        assert!(stmt.sql.ends_with("VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))"));
        assert_eq!(bind_names(&stmt), ["user_id", "agent_id"]);
    }

    #[test]
    fn update_orders_set_before_where() {
        let stmt = update("admins", &["online"], &["id", "role"]).unwrap();
        assert_eq!(stmt.sql, "UPDATE admins SET online = ?1 WHERE id = ?2 AND role = ?3");
        assert_eq!(bind_names(&stmt), ["online", "id", "role"]);
    }

    #[test]
    fn select_lists_get_columns() {
        let stmt = select("admins", &["id", "name", "email"], &["role", "active"]).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, name, email FROM admins WHERE role = ?1 AND active = ?2"
        );
        assert_eq!(bind_names(&stmt), ["role", "active"]);
        assert_eq!(names(&stmt.results), ["id", "name", "email"]);
    }

    #[test]
    fn empty_filter_never_produces_a_statement() {
        let none: [&str; 0] = [];
        let tables = ["users", "admins", "dialogs", "messages"];
        for t in tables {
            let schema = schema::table(t).unwrap();
            for c in schema.columns {
                assert!(matches!(
                    update(t, &[c.name], &none),
                    Err(DbError::MissingFilter { statement: "UPDATE" })
                ));
                assert!(matches!(
                    select(t, &[c.name], &none),
                    Err(DbError::MissingFilter { statement: "SELECT" })
                ));
            }
        }
    }

    #[test]
    fn every_valid_filter_yields_a_where_clause() {
        for schema in schema::TABLES {
            for put in schema.columns {
                for spec in schema.columns {
                    let u = update(schema.name, &[put.name], &[spec.name]).unwrap();
                    let s = select(schema.name, &[put.name], &[spec.name]).unwrap();
                    assert!(u.sql.contains(&format!(" WHERE {} = ?2", spec.name)));
                    assert!(s.sql.contains(&format!(" WHERE {} = ?1", spec.name)));
                }
            }
        }
    }

    #[test]
    fn empty_column_lists_rejected() {
        let none: [&str; 0] = [];
        assert!(matches!(insert("users", &none), Err(DbError::EmptyColumns { .. })));
        assert!(matches!(update("users", &none, &["id"]), Err(DbError::EmptyColumns { .. })));
        assert!(matches!(select("users", &none, &["id"]), Err(DbError::EmptyColumns { .. })));
    }

    #[test]
    fn unknown_names_rejected_before_sql() {
        assert!(matches!(insert("sessions", &["id"]), Err(DbError::SchemaViolation(_))));
        assert!(matches!(
            update("users", &["password"], &["id"]),
            Err(DbError::SchemaViolation(_))
        ));
        assert!(matches!(
            select("dialogs", &["dialog_id"], &["email"]),
            Err(DbError::SchemaViolation(_))
        ));
    }
}
