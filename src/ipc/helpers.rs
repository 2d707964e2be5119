use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

use super::error::{from_registrar, ok};
use super::types::{AppState, Request};
use crate::capabilities::{Actor, UserRole};
use crate::domain::Page;
use crate::error::RegistrarError;

/// Wraps a handler result in the response envelope, logging failures.
pub fn respond(req: &Request, result: Result<Value, RegistrarError>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(method = %req.method, code = e.code(), error = %e, "request failed");
            from_registrar(&req.id, &e)
        }
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, RegistrarError> {
    state.db.as_ref().ok_or(RegistrarError::NoWorkspace)
}

pub fn required_str(req: &Request, key: &str) -> Result<String, RegistrarError> {
    optional_str(req, key).ok_or_else(|| RegistrarError::BadParams(format!("missing {}", key)))
}

/// Blank strings read as absent.
pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, RegistrarError> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| RegistrarError::BadParams(format!("{} must be an integer", key))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| RegistrarError::BadParams(format!("{} must be an integer", key))),
        Some(_) => Err(RegistrarError::BadParams(format!("{} must be an integer", key))),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, RegistrarError> {
    optional_i64(req, key)?.ok_or_else(|| RegistrarError::BadParams(format!("missing {}", key)))
}

/// Null, absent, and blank strings read as `None`.
pub fn number_or_null(v: Option<&Value>, key: &str) -> Result<Option<f64>, RegistrarError> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| RegistrarError::field(key, "The value must be a number.")),
        Some(_) => Err(RegistrarError::field(key, "The value must be a number.")),
    }
}

pub fn string_list(req: &Request, key: &str) -> Result<Vec<String>, RegistrarError> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| RegistrarError::BadParams(format!("{} must be an array of strings", key)))
            })
            .collect(),
        Some(_) => Err(RegistrarError::BadParams(format!("{} must be an array of strings", key))),
    }
}

pub fn page(req: &Request, default_per_page: i64) -> Result<Page, RegistrarError> {
    let page = optional_i64(req, "page")?.unwrap_or(1);
    let per_page = optional_i64(req, "perPage")?.unwrap_or(default_per_page);
    Ok(Page::new(page, per_page))
}

pub fn paged(rows: Vec<Value>, total: i64, page: Page) -> Value {
    serde_json::json!({
        "data": rows,
        "total": total,
        "page": page.page,
        "perPage": page.per_page,
        "lastPage": page.last_page(total),
    })
}

/// The router has already rejected unknown roles.
pub fn actor(state: &AppState, req: &Request) -> Actor {
    let role = req
        .role
        .as_deref()
        .and_then(UserRole::parse)
        .unwrap_or(state.default_role);
    Actor {
        role,
        user_id: req.user_id.clone(),
    }
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// `params.outDir`, else `<workspace>/exports`.
pub fn out_dir(state: &AppState, req: &Request) -> Result<PathBuf, RegistrarError> {
    if let Some(dir) = optional_str(req, "outDir") {
        return Ok(PathBuf::from(dir));
    }
    state
        .workspace
        .as_ref()
        .map(|w| w.join("exports"))
        .ok_or(RegistrarError::NoWorkspace)
}
