use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, respond};
use crate::ipc::types::{AppState, Request};
use crate::settings;
use serde_json::json;

fn handle_settings_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let values = settings::all_with_defaults(conn)?;
    let grading = settings::GradeSettings::load(conn)?;
    Ok(json!({
        "settings": values,
        "grading": grading.to_json(),
    }))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let Some(patch) = req.params.get("settings").and_then(|v| v.as_object()) else {
        return Err(RegistrarError::BadParams("missing params.settings".into()));
    };
    let updated = settings::apply_patch(conn, patch)?;
    tracing::info!(updated, "settings updated");
    Ok(json!({
        "updated": updated,
        "settings": settings::all_with_defaults(conn)?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "settings.get" => handle_settings_get(state, req),
        "settings.update" => handle_settings_update(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
