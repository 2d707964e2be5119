use crate::db;
use crate::error::RegistrarError;
use crate::ipc::helpers::{required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, RegistrarError> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "defaultRole": state.default_role.as_str(),
    }))
}

pub fn select_workspace(state: &mut AppState, path: PathBuf) -> Result<(), RegistrarError> {
    let conn = db::open_db(&path).map_err(|e| RegistrarError::OpenFailed(format!("{e:?}")))?;
    tracing::info!(workspace = %path.display(), "workspace opened");
    state.workspace = Some(path);
    state.db = Some(conn);
    // Staged batches refer to the previous database.
    state.staged_imports.clear();
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let path = PathBuf::from(required_str(req, "path")?);
    select_workspace(state, path.clone())?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
