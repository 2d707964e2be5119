use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, respond};
use crate::ipc::types::{AppState, Request};
use crate::portal;
use rusqlite::Connection;
use serde_json::Value;

/// The portals answer for the calling account only.
fn account_id(req: &Request) -> Result<&str, RegistrarError> {
    req.user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RegistrarError::BadParams("userId is required for this method".into()))
}

fn run(
    state: &mut AppState,
    req: &Request,
    view: fn(&Connection, &str) -> Result<Value, RegistrarError>,
) -> Result<Value, RegistrarError> {
    let account = account_id(req)?;
    let conn = db_conn(state)?;
    view(conn, account)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let view: fn(&Connection, &str) -> Result<Value, RegistrarError> = match req.method.as_str() {
        "my.profile" => portal::my_profile,
        "my.subjects" => portal::my_subjects,
        "my.grades" => portal::my_grades,
        "my.sections" => portal::my_sections,
        "my.students" => portal::my_students,
        _ => return None,
    };
    Some(respond(req, run(state, req, view)))
}
