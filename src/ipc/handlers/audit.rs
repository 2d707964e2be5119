use crate::audit::{self, AuditFilters, Model};
use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, optional_str, page, paged, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::Value;

const AUDIT_PER_PAGE: i64 = 15;

fn handle_audit_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let model = match optional_str(req, "modelType") {
        Some(raw) => Some(
            Model::parse(&raw)
                .ok_or_else(|| RegistrarError::BadParams(format!("unknown model type: {}", raw)))?,
        ),
        None => None,
    };
    let action = optional_str(req, "action");
    if let Some(a) = action.as_deref() {
        if !matches!(a, "created" | "updated" | "deleted") {
            return Err(RegistrarError::BadParams(format!("unknown action: {}", a)));
        }
    }
    let filters = AuditFilters {
        model,
        model_id: optional_str(req, "modelId"),
        user_id: optional_str(req, "actorId"),
        action,
    };
    let page = page(req, AUDIT_PER_PAGE)?;
    let (rows, total) = audit::list(conn, &filters, page)?;
    Ok(paged(rows, total, page))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "audit.list" => handle_audit_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
