use crate::calendar;
use crate::domain::EnrollmentStatus;
use crate::enrollment::{self, EnrollInput, EnrollmentFilters};
use crate::error::RegistrarError;
use crate::ipc::helpers::{
    actor, db_conn, optional_i64, optional_str, page, paged, required_i64, required_str, respond,
    string_list,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

const ENROLLMENTS_PER_PAGE: i64 = 15;

fn status_param(req: &Request) -> Result<Option<EnrollmentStatus>, RegistrarError> {
    match optional_str(req, "status") {
        Some(raw) => EnrollmentStatus::parse(&raw)
            .map(Some)
            .ok_or_else(|| RegistrarError::field("status", "The selected status is invalid.")),
        None => Ok(None),
    }
}

fn handle_enrollment_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let filters = EnrollmentFilters {
        search: optional_str(req, "search"),
        status: status_param(req)?,
        semester_id: optional_str(req, "semesterId"),
    };
    let page = page(req, ENROLLMENTS_PER_PAGE)?;
    let (rows, total) = enrollment::list_enrollments(conn, &filters, page)?;
    Ok(paged(rows, total, page))
}

fn handle_enrollment_get(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    enrollment::get_enrollment(conn, &enrollment_id)
}

fn handle_enrollment_create(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let semester_id = calendar::resolve_semester_id(conn, optional_str(req, "semesterId"))?;
    let input = EnrollInput {
        student_id: optional_str(req, "studentId").unwrap_or_default(),
        section_id: optional_str(req, "sectionId").unwrap_or_default(),
        semester_id,
        subject_ids: string_list(req, "subjectIds")?,
        remarks: optional_str(req, "remarks"),
        actor_id: req.user_id.clone(),
    };
    let id = enrollment::enroll(conn, &input)?;
    Ok(json!({
        "enrollmentId": id,
        "status": EnrollmentStatus::Pending.as_str(),
    }))
}

fn handle_enrollment_update_status(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let enrollment_id = required_str(req, "enrollmentId")?;
    let Some(target) = status_param(req)? else {
        return Err(RegistrarError::field("status", "The status field is required."));
    };
    let who = actor(state, req);
    let t = enrollment::transition_status(conn, &enrollment_id, target, who.user_id.as_deref())?;
    Ok(json!({
        "enrollmentId": enrollment_id,
        "from": t.from.as_str(),
        "status": t.to.as_str(),
        "changed": t.changed,
    }))
}

fn handle_enrollment_subject_load(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let strand_id = required_str(req, "strandId")?;
    let grade_level = required_i64(req, "gradeLevel")?;
    let semester_id = calendar::resolve_semester_id(conn, optional_str(req, "semesterId"))?;
    let subjects = enrollment::subject_load(conn, &strand_id, grade_level, &semester_id)?;
    Ok(json!({ "subjects": subjects }))
}

fn handle_enrollment_check_prerequisites(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let subject_ids = string_list(req, "subjectIds")?;
    let check = enrollment::check_prerequisites(conn, &student_id, &subject_ids)?;
    Ok(json!(check))
}

fn handle_enrollment_available_sections(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let strand_id = required_str(req, "strandId")?;
    let grade_level = optional_i64(req, "gradeLevel")?
        .ok_or_else(|| RegistrarError::BadParams("missing gradeLevel".into()))?;
    let semester_id = calendar::resolve_semester_id(conn, optional_str(req, "semesterId"))?;
    let sections = enrollment::available_sections(conn, &strand_id, grade_level, &semester_id)?;
    Ok(json!({ "sections": sections }))
}

fn handle_enrollment_setup_checklist(state: &mut AppState, _req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    enrollment::setup_checklist(conn)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "enrollment.list" => handle_enrollment_list(state, req),
        "enrollment.get" => handle_enrollment_get(state, req),
        "enrollment.create" => handle_enrollment_create(state, req),
        "enrollment.updateStatus" => handle_enrollment_update_status(state, req),
        "enrollment.subjectLoad" => handle_enrollment_subject_load(state, req),
        "enrollment.checkPrerequisites" => handle_enrollment_check_prerequisites(state, req),
        "enrollment.availableSections" => handle_enrollment_available_sections(state, req),
        "enrollment.setupChecklist" => handle_enrollment_setup_checklist(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
