use crate::domain::StudentStatus;
use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, optional_str, page, paged, required_str, respond, today};
use crate::ipc::types::{AppState, Request};
use crate::students::{self, StudentFilters, StudentInput};
use serde_json::{json, Value};

const STUDENTS_PER_PAGE: i64 = 15;

fn student_input(req: &Request) -> Result<StudentInput, RegistrarError> {
    let raw = req.params.get("student").cloned().unwrap_or(Value::Null);
    if raw.is_null() {
        return Err(RegistrarError::BadParams("missing params.student".into()));
    }
    serde_json::from_value(raw).map_err(|e| RegistrarError::BadParams(format!("invalid student: {e}")))
}

pub fn student_filters(req: &Request) -> Result<StudentFilters, RegistrarError> {
    let status = match optional_str(req, "status") {
        Some(raw) => Some(
            StudentStatus::parse(&raw)
                .ok_or_else(|| RegistrarError::BadParams(format!("unknown student status: {}", raw)))?,
        ),
        None => None,
    };
    Ok(StudentFilters {
        search: optional_str(req, "search"),
        status,
        strand_id: optional_str(req, "strandId"),
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let filters = student_filters(req)?;
    let page = page(req, STUDENTS_PER_PAGE)?;
    let (rows, total) = students::list_students(conn, &filters, page)?;
    Ok(paged(rows, total, page))
}

fn handle_students_get(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    students::get_student(conn, &student_id)
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let input = student_input(req)?;
    let id = students::create_student(conn, &input, today(), req.user_id.as_deref())?;
    Ok(json!({ "studentId": id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let input = student_input(req)?;
    students::update_student(conn, &student_id, &input, today(), req.user_id.as_deref())?;
    Ok(json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    students::drop_student(conn, &student_id, req.user_id.as_deref())?;
    Ok(json!({ "studentId": student_id, "status": StudentStatus::Dropped.as_str() }))
}

fn handle_students_link_account(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let account_id = optional_str(req, "accountId");
    students::link_account(conn, &student_id, account_id.as_deref(), req.user_id.as_deref())?;
    Ok(json!({ "studentId": student_id, "accountId": account_id }))
}

fn handle_students_duplicate_check(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let first = required_str(req, "firstName")?;
    let last = required_str(req, "lastName")?;
    let birthdate = required_str(req, "birthdate")?;
    let exclude = optional_str(req, "excludeId");
    let matches = students::duplicate_check(conn, &first, &last, &birthdate, exclude.as_deref())?;
    Ok(json!({
        "hasDuplicates": !matches.is_empty(),
        "duplicates": matches,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.get" => handle_students_get(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.duplicateCheck" => handle_students_duplicate_check(state, req),
        "students.linkAccount" => handle_students_link_account(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
