use crate::error::RegistrarError;
use crate::ipc::helpers::{db_conn, optional_str, page, paged, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::teachers::{self, ProfileInput, TrainingInput};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

const TEACHERS_PER_PAGE: i64 = 15;

fn object_param<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, RegistrarError> {
    let raw = req.params.get(key).cloned().unwrap_or(Value::Null);
    if raw.is_null() {
        return Err(RegistrarError::BadParams(format!("missing params.{key}")));
    }
    serde_json::from_value(raw).map_err(|e| RegistrarError::BadParams(format!("invalid {key}: {e}")))
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let search = optional_str(req, "search");
    let page = page(req, TEACHERS_PER_PAGE)?;
    let (rows, total) = teachers::list_teachers(conn, search.as_deref(), page)?;
    Ok(paged(rows, total, page))
}

fn handle_teachers_get(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let teacher_id = required_str(req, "teacherId")?;
    teachers::get_teacher(conn, &teacher_id)
}

fn handle_teachers_update_profile(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let teacher_id = required_str(req, "teacherId")?;
    let input: ProfileInput = object_param(req, "profile")?;
    teachers::update_profile(conn, &teacher_id, &input)?;
    teachers::get_teacher(conn, &teacher_id)
}

fn handle_teachers_add_training(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let teacher_id = required_str(req, "teacherId")?;
    let input: TrainingInput = object_param(req, "training")?;
    let id = teachers::add_training(conn, &teacher_id, &input)?;
    Ok(json!({ "trainingId": id }))
}

fn handle_teachers_remove_training(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let conn = db_conn(state)?;
    let teacher_id = required_str(req, "teacherId")?;
    let training_id = required_str(req, "trainingId")?;
    teachers::remove_training(conn, &teacher_id, &training_id)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "teachers.list" => handle_teachers_list(state, req),
        "teachers.get" => handle_teachers_get(state, req),
        "teachers.updateProfile" => handle_teachers_update_profile(state, req),
        "teachers.addTraining" => handle_teachers_add_training(state, req),
        "teachers.removeTraining" => handle_teachers_remove_training(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
