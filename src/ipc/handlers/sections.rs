use crate::calendar;
use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, optional_i64, optional_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::sections::{self, SectionFilters, SectionInput};
use serde_json::{json, Value};

fn section_input(conn: &rusqlite::Connection, req: &Request) -> Result<SectionInput, RegistrarError> {
    let semester_id = calendar::resolve_semester_id(conn, optional_str(req, "semesterId"))?;
    Ok(SectionInput {
        name: optional_str(req, "name").unwrap_or_default(),
        semester_id,
        strand_id: optional_str(req, "strandId").unwrap_or_default(),
        grade_level: optional_i64(req, "gradeLevel")?.unwrap_or(0),
        max_capacity: optional_i64(req, "maxCapacity")?,
        adviser_id: optional_str(req, "adviserId"),
    })
}

fn handle_sections_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let filters = SectionFilters {
        semester_id: optional_str(req, "semesterId"),
        strand_id: optional_str(req, "strandId"),
        grade_level: optional_i64(req, "gradeLevel")?,
        adviser_id: optional_str(req, "adviserId"),
    };
    Ok(json!({ "sections": sections::list_sections(conn, &filters)? }))
}

fn handle_sections_get(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    sections::get_section(conn, &section_id)
}

fn handle_sections_create(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let input = section_input(conn, req)?;
    let id = sections::create_section(conn, &input, req.user_id.as_deref())?;
    Ok(json!({ "sectionId": id }))
}

fn handle_sections_update(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    let input = section_input(conn, req)?;
    sections::update_section(conn, &section_id, &input, req.user_id.as_deref())?;
    Ok(json!({ "ok": true }))
}

fn handle_sections_delete(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    sections::delete_section(conn, &section_id, req.user_id.as_deref())?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "sections.list" => handle_sections_list(state, req),
        "sections.get" => handle_sections_get(state, req),
        "sections.create" => handle_sections_create(state, req),
        "sections.update" => handle_sections_update(state, req),
        "sections.delete" => handle_sections_delete(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
