use crate::calendar;
use crate::error::RegistrarError;
use crate::exports;
use crate::ipc::handlers::students::student_filters;
use crate::ipc::helpers::{db_conn, optional_str, out_dir, page, required_str, respond, today};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use crate::students;
use serde_json::{json, Value};

const MASTERLIST_PER_PAGE: i64 = 50;

fn handle_dashboard(state: &mut AppState, _req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    reports::dashboard(conn)
}

fn handle_enrollment_summary(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let semester_id = calendar::resolve_semester_id(conn, optional_str(req, "semesterId"))?;
    Ok(json!(reports::enrollment_summary(conn, &semester_id)?))
}

fn handle_class_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    Ok(json!(reports::class_list(conn, &section_id)?))
}

fn handle_masterlist(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let filters = student_filters(req)?;
    let page = page(req, MASTERLIST_PER_PAGE)?;
    let (students, total) = students::list_students(conn, &filters, page)?;
    // `Page` bounds the offset, so this only fails on a negative value.
    let start = usize::try_from(page.offset()).unwrap_or(0) + 1;
    Ok(json!({
        "columns": reports::MASTERLIST_COLUMNS,
        "rows": reports::masterlist_rows(&students, start),
        "total": total,
        "page": page.page,
        "perPage": page.per_page,
        "lastPage": page.last_page(total),
    }))
}

fn handle_grade_summary(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    let subject_id = optional_str(req, "subjectId");
    reports::grade_summary(conn, &section_id, subject_id.as_deref())
}

fn handle_sf1(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    Ok(json!(reports::sf1(conn, &section_id)?))
}

fn handle_sf5(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let section_id = required_str(req, "sectionId")?;
    Ok(json!(reports::sf5(conn, &section_id)?))
}

fn handle_sf9(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    Ok(json!(reports::sf9(conn, &enrollment_id, today())?))
}

fn handle_sf10(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    Ok(json!(reports::sf10(conn, &student_id, today())?))
}

fn handle_export(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let dir = out_dir(state, req)?;
    let day = today();
    let result = match req.method.as_str() {
        "exports.enrollmentSummary" => {
            let semester_id = calendar::resolve_semester_id(conn, optional_str(req, "semesterId"))?;
            exports::enrollment_summary(conn, &semester_id, &dir, day)?
        }
        "exports.classList" => exports::class_list(conn, &required_str(req, "sectionId")?, &dir, day)?,
        "exports.masterlist" => exports::masterlist(conn, &student_filters(req)?, &dir, day)?,
        "exports.sf1" => exports::sf1(conn, &required_str(req, "sectionId")?, &dir, day)?,
        "exports.sf5" => exports::sf5(conn, &required_str(req, "sectionId")?, &dir, day)?,
        other => return Err(RegistrarError::BadParams(format!("unknown export: {}", other))),
    };
    Ok(json!(result))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "reports.dashboard" => handle_dashboard(state, req),
        "reports.enrollmentSummary" => handle_enrollment_summary(state, req),
        "reports.classList" => handle_class_list(state, req),
        "reports.masterlist" => handle_masterlist(state, req),
        "reports.gradeSummary" => handle_grade_summary(state, req),
        "reports.sf1" => handle_sf1(state, req),
        "reports.sf5" => handle_sf5(state, req),
        "reports.sf9" => handle_sf9(state, req),
        "reports.sf10" => handle_sf10(state, req),
        "exports.enrollmentSummary"
        | "exports.classList"
        | "exports.masterlist"
        | "exports.sf1"
        | "exports.sf5" => handle_export(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
