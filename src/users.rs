use crate::audit::{self, Model};
use crate::capabilities::UserRole;
use crate::db;
use crate::error::{RegistrarError, Validator};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn validate(conn: &Connection, name: &str, email: &str, exclude_id: Option<&str>) -> Result<(), RegistrarError> {
    let mut v = Validator::new();
    if name.trim().is_empty() {
        v.add("name", "The name field is required.");
    } else if name.chars().count() > 255 {
        v.add("name", "The name may not be greater than 255 characters.");
    }
    let email = email.trim();
    if email.is_empty() {
        v.add("email", "The email field is required.");
    } else if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        v.add("email", "The email must be a valid email address.");
    } else {
        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE lower(email) = lower(?) AND id <> ?",
                (email, exclude_id.unwrap_or("")),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            v.add("email", "The email has already been taken.");
        }
    }
    v.finish()
}

pub fn create_user(
    conn: &Connection,
    name: &str,
    email: &str,
    role: UserRole,
    actor_id: Option<&str>,
) -> Result<String, RegistrarError> {
    validate(conn, name, email, None)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, name, email, role, is_active, created_at) VALUES(?, ?, ?, ?, 1, ?)",
        (&id, name.trim(), email.trim(), role.as_str(), db::now_ts()),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    audit::created(conn, actor_id, Model::User, &id)?;
    tracing::info!(user_id = %id, role = role.as_str(), "user created");
    Ok(id)
}

pub fn update_user(
    conn: &Connection,
    user_id: &str,
    name: &str,
    email: &str,
    role: UserRole,
    actor_id: Option<&str>,
) -> Result<(), RegistrarError> {
    let Some(before) = audit::snapshot(conn, Model::User, user_id)? else {
        return Err(RegistrarError::not_found("user"));
    };
    validate(conn, name, email, Some(user_id))?;
    conn.execute(
        "UPDATE users SET name = ?, email = ?, role = ? WHERE id = ?",
        (name.trim(), email.trim(), role.as_str(), user_id),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    audit::updated(conn, actor_id, Model::User, user_id, &before)
}

pub fn toggle_active(conn: &Connection, user_id: &str, actor_id: Option<&str>) -> Result<bool, RegistrarError> {
    let Some(before) = audit::snapshot(conn, Model::User, user_id)? else {
        return Err(RegistrarError::not_found("user"));
    };
    let next = before.get("is_active").and_then(|v| v.as_i64()) == Some(0);
    conn.execute(
        "UPDATE users SET is_active = ? WHERE id = ?",
        (next as i64, user_id),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    audit::updated(conn, actor_id, Model::User, user_id, &before)?;
    Ok(next)
}

pub fn list_users(conn: &Connection, role: Option<UserRole>) -> Result<Vec<Value>, RegistrarError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, role, is_active, created_at FROM users
         WHERE (? IS NULL OR role = ?)
         ORDER BY name",
    )?;
    let role = role.map(|r| r.as_str());
    let rows = stmt
        .query_map((role, role), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "role": r.get::<_, String>(3)?,
                "isActive": r.get::<_, i64>(4)? != 0,
                "createdAt": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}
