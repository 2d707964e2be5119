use crate::calendar;
use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_school_years_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let years = calendar::list_school_years(conn)?;
    Ok(json!({ "schoolYears": years }))
}

fn handle_school_years_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let name = optional_str(req, "name").unwrap_or_default();
    let start = optional_str(req, "startDate");
    let end = optional_str(req, "endDate");
    let id = calendar::create_school_year(conn, &name, start.as_deref(), end.as_deref())?;
    Ok(json!({ "schoolYearId": id }))
}

fn handle_school_years_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let year_id = required_str(req, "schoolYearId")?;
    let name = optional_str(req, "name").unwrap_or_default();
    let start = optional_str(req, "startDate");
    let end = optional_str(req, "endDate");
    calendar::rename_school_year(conn, &year_id, &name, start.as_deref(), end.as_deref())?;
    Ok(json!({ "ok": true }))
}

fn handle_school_years_activate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let year_id = required_str(req, "schoolYearId")?;
    let active = calendar::activate_school_year(conn, &year_id)?;
    Ok(json!({ "active": active }))
}

fn handle_semesters_activate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let semester_id = required_str(req, "semesterId")?;
    let active = calendar::activate_semester(conn, &semester_id)?;
    Ok(json!({ "active": active }))
}

fn handle_semesters_toggle_enrollment(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    let semester_id = required_str(req, "semesterId")?;
    let open = calendar::toggle_enrollment(conn, &semester_id)?;
    Ok(json!({ "semesterId": semester_id, "enrollmentOpen": open }))
}

fn handle_calendar_active(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, RegistrarError> {
    let conn = db_conn(state)?;
    Ok(json!({ "active": calendar::active_term(conn)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "schoolYears.list" => handle_school_years_list(state, req),
        "schoolYears.create" => handle_school_years_create(state, req),
        "schoolYears.update" => handle_school_years_update(state, req),
        "schoolYears.activate" => handle_school_years_activate(state, req),
        "semesters.activate" => handle_semesters_activate(state, req),
        "semesters.toggleEnrollment" => handle_semesters_toggle_enrollment(state, req),
        "calendar.active" => handle_calendar_active(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
