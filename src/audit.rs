//! Change history for students, enrollments, grades, sections and users.
//!
//! Mutating operations snapshot the row before they write and call
//! [`created`], [`updated`] or [`deleted`] afterwards. Updates store only the
//! columns that changed.

use crate::domain::Page;
use crate::error::RegistrarError;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Student,
    Enrollment,
    Grade,
    Section,
    User,
}

impl Model {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Enrollment => "enrollment",
            Self::Grade => "grade",
            Self::Section => "section",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "enrollment" => Some(Self::Enrollment),
            "grade" => Some(Self::Grade),
            "section" => Some(Self::Section),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Student => "students",
            Self::Enrollment => "enrollments",
            Self::Grade => "grades",
            Self::Section => "sections",
            Self::User => "users",
        }
    }
}

/// Bookkeeping columns that never count as a change.
const IGNORED: [&str; 2] = ["created_at", "updated_at"];

/// The row as a column -> value object, or `None` when it does not exist.
pub fn snapshot(conn: &Connection, model: Model, id: &str) -> Result<Option<Value>, RegistrarError> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {} WHERE id = ?", model.table()))?;
    let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt.query([id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut obj = Map::new();
    for (i, name) in names.iter().enumerate() {
        let v = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => json!(n),
            ValueRef::Real(f) => json!(f),
            ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
            ValueRef::Blob(_) => Value::Null,
        };
        obj.insert(name.clone(), v);
    }
    Ok(Some(Value::Object(obj)))
}

/// Old and new values of the columns that differ, or `None` when nothing did.
pub fn changes(before: &Value, after: &Value) -> Option<(Value, Value)> {
    let (Some(b), Some(a)) = (before.as_object(), after.as_object()) else {
        return None;
    };
    let mut old = Map::new();
    let mut new = Map::new();
    for (k, v) in a {
        if IGNORED.contains(&k.as_str()) {
            continue;
        }
        let prev = b.get(k).cloned().unwrap_or(Value::Null);
        if &prev != v {
            old.insert(k.clone(), prev);
            new.insert(k.clone(), v.clone());
        }
    }
    if new.is_empty() {
        None
    } else {
        Some((Value::Object(old), Value::Object(new)))
    }
}

fn insert(
    conn: &Connection,
    user_id: Option<&str>,
    action: &str,
    model: Model,
    model_id: &str,
    old: Option<&Value>,
    new: Option<&Value>,
) -> Result<(), RegistrarError> {
    conn.execute(
        "INSERT INTO audit_log(user_id, action, model_type, model_id, old_values, new_values, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            user_id,
            action,
            model.as_str(),
            model_id,
            old.map(|v| v.to_string()),
            new.map(|v| v.to_string()),
            crate::db::now_ts(),
        ),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    Ok(())
}

pub fn created(conn: &Connection, user_id: Option<&str>, model: Model, id: &str) -> Result<(), RegistrarError> {
    let after = snapshot(conn, model, id)?;
    insert(conn, user_id, "created", model, id, None, after.as_ref())
}

/// Records the difference between `before` and the row as it is now. No-op
/// updates leave no entry.
pub fn updated(
    conn: &Connection,
    user_id: Option<&str>,
    model: Model,
    id: &str,
    before: &Value,
) -> Result<(), RegistrarError> {
    let Some(after) = snapshot(conn, model, id)? else {
        return Ok(());
    };
    match changes(before, &after) {
        Some((old, new)) => insert(conn, user_id, "updated", model, id, Some(&old), Some(&new)),
        None => Ok(()),
    }
}

pub fn deleted(
    conn: &Connection,
    user_id: Option<&str>,
    model: Model,
    id: &str,
    before: &Value,
) -> Result<(), RegistrarError> {
    insert(conn, user_id, "deleted", model, id, Some(before), None)
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilters {
    pub model: Option<Model>,
    pub model_id: Option<String>,
    pub user_id: Option<String>,
    pub action: Option<String>,
}

fn parse_values(raw: Option<String>) -> Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

/// Newest first.
pub fn list(conn: &Connection, f: &AuditFilters, page: Page) -> Result<(Vec<Value>, i64), RegistrarError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(m) = f.model {
        clauses.push("a.model_type = ?");
        binds.push(SqlValue::Text(m.as_str().to_string()));
    }
    if let Some(id) = &f.model_id {
        clauses.push("a.model_id = ?");
        binds.push(SqlValue::Text(id.clone()));
    }
    if let Some(uid) = &f.user_id {
        clauses.push("a.user_id = ?");
        binds.push(SqlValue::Text(uid.clone()));
    }
    if let Some(action) = &f.action {
        clauses.push("a.action = ?");
        binds.push(SqlValue::Text(action.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM audit_log a {where_sql}"),
        params_from_iter(binds.iter()),
        |r| r.get(0),
    )?;
    binds.push(SqlValue::Integer(page.per_page));
    binds.push(SqlValue::Integer(page.offset()));
    let mut stmt = conn.prepare(&format!(
        "SELECT a.seq, a.user_id, u.name, a.action, a.model_type, a.model_id, a.old_values, a.new_values, a.created_at
         FROM audit_log a LEFT JOIN users u ON u.id = a.user_id
         {where_sql}
         ORDER BY a.seq DESC LIMIT ? OFFSET ?"
    ))?;
    let rows = stmt
        .query_map(params_from_iter(binds.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "userId": r.get::<_, Option<String>>(1)?,
                "userName": r.get::<_, Option<String>>(2)?,
                "action": r.get::<_, String>(3)?,
                "modelType": r.get::<_, String>(4)?,
                "modelId": r.get::<_, String>(5)?,
                "oldValues": parse_values(r.get(6)?),
                "newValues": parse_values(r.get(7)?),
                "createdAt": r.get::<_, String>(8)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok((rows, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_keep_only_differing_columns() {
        let before = json!({ "id": "s1", "status": "active", "address": null, "updated_at": "a" });
        let after = json!({ "id": "s1", "status": "dropped", "address": "Pasig", "updated_at": "b" });
        let (old, new) = changes(&before, &after).expect("changed");
        assert_eq!(old, json!({ "status": "active", "address": null }));
        assert_eq!(new, json!({ "status": "dropped", "address": "Pasig" }));
    }

    #[test]
    fn timestamp_only_updates_are_not_changes() {
        let before = json!({ "id": "g1", "midterm": 80.0, "updated_at": "a" });
        let after = json!({ "id": "g1", "midterm": 80.0, "updated_at": "b" });
        assert_eq!(changes(&before, &after), None);
    }

    #[test]
    fn model_names_round_trip() {
        for m in [Model::Student, Model::Enrollment, Model::Grade, Model::Section, Model::User] {
            assert_eq!(Model::parse(m.as_str()), Some(m));
        }
        assert_eq!(Model::parse("setting"), None);
    }
}
