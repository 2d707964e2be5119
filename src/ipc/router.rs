use super::error::err;
use super::handlers;
use super::types::{AppState, Request};
use crate::capabilities::{self, Requirement, UserRole};

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    let Some(requirement) = capabilities::method_requirement(&req.method) else {
        return err(
            &req.id,
            "not_implemented",
            format!("unknown method: {}", req.method),
            None,
        );
    };

    let role = match req.role.as_deref() {
        None => state.default_role,
        Some(raw) => match UserRole::parse(raw) {
            Some(r) => r,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown role: {}", raw),
                    None,
                )
            }
        },
    };
    if let Requirement::Needs(cap) = requirement {
        if !capabilities::role_has(role, cap) {
            tracing::warn!(method = %req.method, role = role.as_str(), ?cap, "capability denied");
            return err(
                &req.id,
                "forbidden",
                format!("role {} may not call {}", role.as_str(), req.method),
                Some(serde_json::json!({ "capability": cap })),
            );
        }
    }
    tracing::debug!(method = %req.method, role = role.as_str(), "request");

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::settings::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::calendar::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::users::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::curriculum::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::sections::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::enrollment::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::imports::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::reports::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::teachers::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::portal::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::audit::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
