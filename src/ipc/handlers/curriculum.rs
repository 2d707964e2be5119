use crate::curriculum::{self, ActiveFilter, CurriculumTable, StrandMapping, SubjectFilters, SubjectInput};
use crate::domain::SubjectType;
use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, optional_i64, optional_str, required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

fn handle_tracks_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let active_only = req
        .params
        .get("activeOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    Ok(json!({ "tracks": curriculum::list_tracks(conn, active_only)? }))
}

fn handle_tracks_create(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let code = optional_str(req, "code").unwrap_or_default();
    let name = optional_str(req, "name").unwrap_or_default();
    let sort_order = optional_i64(req, "sortOrder")?.unwrap_or(0);
    let id = curriculum::create_track(conn, &code, &name, sort_order)?;
    Ok(json!({ "trackId": id }))
}

fn handle_strands_create(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let track_id = required_str(req, "trackId")?;
    let code = optional_str(req, "code").unwrap_or_default();
    let name = optional_str(req, "name").unwrap_or_default();
    let sort_order = optional_i64(req, "sortOrder")?.unwrap_or(0);
    let id = curriculum::create_strand(conn, &track_id, &code, &name, sort_order)?;
    Ok(json!({ "strandId": id }))
}

fn handle_code_name_update(
    state: &mut AppState,
    req: &Request,
    table: CurriculumTable,
    id_key: &str,
) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let id = required_str(req, id_key)?;
    let code = optional_str(req, "code").unwrap_or_default();
    let name = optional_str(req, "name").unwrap_or_default();
    let sort_order = optional_i64(req, "sortOrder")?;
    curriculum::update_code_name(conn, table, &id, &code, &name, sort_order)?;
    Ok(json!({ "ok": true }))
}

fn handle_toggle_active(
    state: &mut AppState,
    req: &Request,
    table: CurriculumTable,
    id_key: &str,
) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let id = required_str(req, id_key)?;
    let active = curriculum::toggle_active(conn, table, &id)?;
    Ok(json!({ id_key: id, "isActive": active }))
}

fn parse_strand_mappings(v: &Value) -> Result<Vec<StrandMapping>, RegistrarError> {
    let Some(items) = v.as_array() else {
        return Err(RegistrarError::BadParams("strands must be an array".into()));
    };
    items
        .iter()
        .map(|item| {
            let strand_id = item
                .get("strandId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| RegistrarError::BadParams("strands[].strandId is required".into()))?;
            Ok(StrandMapping {
                strand_id: strand_id.to_string(),
                grade_level: item.get("gradeLevel").and_then(|v| v.as_i64()).unwrap_or(0),
                semester: item.get("semester").and_then(|v| v.as_i64()).unwrap_or(0),
                sort_order: item.get("sortOrder").and_then(|v| v.as_i64()).unwrap_or(0),
            })
        })
        .collect()
}

fn subject_input(req: &Request) -> Result<SubjectInput, RegistrarError> {
    let raw_type = optional_str(req, "type").unwrap_or_default();
    let Some(subject_type) = SubjectType::parse(&raw_type) else {
        return Err(RegistrarError::field("type", "The selected type is invalid."));
    };
    let strands = match req.params.get("strands") {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_strand_mappings(v)?),
    };
    Ok(SubjectInput {
        code: optional_str(req, "code").unwrap_or_default(),
        name: optional_str(req, "name").unwrap_or_default(),
        subject_type,
        hours: optional_i64(req, "hours")?.unwrap_or(0),
        prerequisite_id: optional_str(req, "prerequisiteId"),
        strands,
    })
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let active = match optional_str(req, "status").as_deref() {
        None | Some("active") => ActiveFilter::Active,
        Some("inactive") => ActiveFilter::Inactive,
        Some("all") => ActiveFilter::All,
        Some(other) => {
            return Err(RegistrarError::BadParams(format!("unknown status filter: {}", other)))
        }
    };
    let subject_type = match optional_str(req, "type") {
        Some(raw) => Some(
            SubjectType::parse(&raw)
                .ok_or_else(|| RegistrarError::BadParams(format!("unknown subject type: {}", raw)))?,
        ),
        None => None,
    };
    let filters = SubjectFilters {
        active,
        subject_type,
        strand_id: optional_str(req, "strandId"),
        search: optional_str(req, "search"),
    };
    Ok(json!({ "subjects": curriculum::list_subjects(conn, &filters)? }))
}

fn handle_subjects_get(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let subject_id = required_str(req, "subjectId")?;
    curriculum::get_subject(conn, &subject_id)
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let input = subject_input(req)?;
    let id = curriculum::create_subject(conn, &input)?;
    Ok(json!({ "subjectId": id }))
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let subject_id = required_str(req, "subjectId")?;
    let input = subject_input(req)?;
    curriculum::update_subject(conn, &subject_id, &input)?;
    Ok(json!({ "ok": true }))
}

fn handle_subjects_set_active(state: &mut AppState, req: &Request, active: bool) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let subject_id = required_str(req, "subjectId")?;
    curriculum::set_subject_active(conn, &subject_id, active)?;
    Ok(json!({ "subjectId": subject_id, "isActive": active }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "tracks.list" => handle_tracks_list(state, req),
        "tracks.create" => handle_tracks_create(state, req),
        "tracks.update" => handle_code_name_update(state, req, CurriculumTable::Tracks, "trackId"),
        "tracks.toggleActive" => handle_toggle_active(state, req, CurriculumTable::Tracks, "trackId"),
        "strands.create" => handle_strands_create(state, req),
        "strands.update" => handle_code_name_update(state, req, CurriculumTable::Strands, "strandId"),
        "strands.toggleActive" => handle_toggle_active(state, req, CurriculumTable::Strands, "strandId"),
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.get" => handle_subjects_get(state, req),
        "subjects.create" => handle_subjects_create(state, req),
        "subjects.update" => handle_subjects_update(state, req),
        "subjects.deactivate" => handle_subjects_set_active(state, req, false),
        "subjects.restore" => handle_subjects_set_active(state, req, true),
        _ => return None,
    };
    Some(respond(req, result))
}
