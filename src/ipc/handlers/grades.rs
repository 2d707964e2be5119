use crate::error::RegistrarError;
use crate::gradebook::{self, GradeEntry};
use crate::ipc::helpers::{actor, db_conn, number_or_null, required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn grade_entries(req: &Request) -> Result<Vec<GradeEntry>, RegistrarError> {
    let Some(items) = req.params.get("grades").and_then(|v| v.as_array()) else {
        return Err(RegistrarError::BadParams("missing params.grades".into()));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let grade_id = item
                .get("gradeId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RegistrarError::field(&format!("grades.{i}.grade_id"), "The grade id is required."))?;
            Ok(GradeEntry {
                grade_id: grade_id.to_string(),
                midterm: number_or_null(item.get("midterm"), &format!("grades.{i}.midterm"))?,
                finals: number_or_null(item.get("finals"), &format!("grades.{i}.finals"))?,
            })
        })
        .collect()
}

fn handle_grades_sections(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    gradebook::sections_for(conn, &actor(state, req))
}

fn handle_grades_sheet(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    let subject_id = required_str(req, "subjectId")?;
    gradebook::ensure_section_access(conn, &actor(state, req), &section_id)?;
    gradebook::sheet(conn, &section_id, &subject_id)
}

fn handle_grades_save(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    let subject_id = required_str(req, "subjectId")?;
    let who = actor(state, req);
    gradebook::ensure_section_access(conn, &who, &section_id)?;
    let entries = grade_entries(req)?;
    let outcome = gradebook::save(conn, &section_id, &subject_id, &entries, who.user_id.as_deref())?;
    Ok(json!({
        "updated": outcome.updated,
        "skippedLocked": outcome.skipped_locked,
    }))
}

fn handle_grades_set_locked(state: &mut AppState, req: &Request, locked: bool) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    let subject_id = required_str(req, "subjectId")?;
    let who = actor(state, req);
    gradebook::ensure_section_access(conn, &who, &section_id)?;
    let n = gradebook::set_locked(conn, &section_id, &subject_id, locked, who.user_id.as_deref())?;
    Ok(json!({ "grades": n, "isLocked": locked }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "grades.sections" => handle_grades_sections(state, req),
        "grades.sheet" => handle_grades_sheet(state, req),
        "grades.save" => handle_grades_save(state, req),
        "grades.lock" => handle_grades_set_locked(state, req, true),
        "grades.unlock" => handle_grades_set_locked(state, req, false),
        _ => return None,
    };
    Some(respond(req, result))
}
