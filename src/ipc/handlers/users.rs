use crate::capabilities::UserRole;
use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::users;
use serde_json::json;

fn role_param(req: &Request) -> Result<UserRole, RegistrarError> {
    let raw = optional_str(req, "role").unwrap_or_default();
    UserRole::parse(&raw).ok_or_else(|| RegistrarError::field("role", "The selected role is invalid."))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let role = match optional_str(req, "role") {
        Some(raw) => Some(
            UserRole::parse(&raw)
                .ok_or_else(|| RegistrarError::BadParams(format!("unknown role: {}", raw)))?,
        ),
        None => None,
    };
    Ok(json!({ "users": users::list_users(conn, role)? }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let name = optional_str(req, "name").unwrap_or_default();
    let email = optional_str(req, "email").unwrap_or_default();
    let role = role_param(req)?;
    let id = users::create_user(conn, &name, &email, role, req.user_id.as_deref())?;
    Ok(json!({ "userId": id }))
}

fn handle_users_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let user_id = required_str(req, "userId")?;
    let name = optional_str(req, "name").unwrap_or_default();
    let email = optional_str(req, "email").unwrap_or_default();
    let role = role_param(req)?;
    users::update_user(conn, &user_id, &name, &email, role, req.user_id.as_deref())?;
    Ok(json!({ "ok": true }))
}

fn handle_users_toggle_active(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let user_id = required_str(req, "userId")?;
    let active = users::toggle_active(conn, &user_id, req.user_id.as_deref())?;
    Ok(json!({ "userId": user_id, "isActive": active }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.list" => handle_users_list(state, req),
        "users.create" => handle_users_create(state, req),
        "users.update" => handle_users_update(state, req),
        "users.toggleActive" => handle_users_toggle_active(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
