use crate::error::RegistrarError;
use crate::imports::{self, ImportKind, StagedBatch, StagedStudent};
use crate::ipc::helpers::{db_conn, out_dir, required_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::students::full_name;
use serde_json::{json, Value};
use std::path::PathBuf;
use uuid::Uuid;

fn student_preview(s: &StagedStudent) -> Value {
    let st = &s.student;
    json!({
        "row": s.row,
        "lrn": st.lrn,
        "name": full_name(&st.last_name, &st.first_name, st.middle_name.as_deref(), st.suffix.as_deref()),
        "birthdate": st.birthdate.format("%Y-%m-%d").to_string(),
        "gender": st.gender.as_str(),
    })
}

fn handle_upload(state: &mut AppState, req: &Request, kind: ImportKind) -> Result<Value, RegistrarError> {
    let path = PathBuf::from(required_str(req, "path")?);
    let conn = db_conn(state)?;
    let sheet = imports::load_sheet(&path)?;
    let (batch, preview, invalid) = match kind {
        ImportKind::Students => {
            let (staged, invalid) = imports::stage_students(conn, &sheet)?;
            let preview: Vec<Value> = staged.iter().map(student_preview).collect();
            (StagedBatch::Students(staged), preview, invalid)
        }
        ImportKind::Grades => {
            let (staged, invalid) = imports::stage_grades(conn, &sheet)?;
            let preview: Vec<Value> = staged.iter().map(|g| json!(g)).collect();
            (StagedBatch::Grades(staged), preview, invalid)
        }
    };

    let batch_id = Uuid::new_v4().to_string();
    let valid = batch.len();
    tracing::info!(
        kind = kind.as_str(),
        batch_id = %batch_id,
        valid,
        invalid = invalid.len(),
        "import staged"
    );
    state.staged_imports.insert(batch_id.clone(), batch);
    Ok(json!({
        "batchId": batch_id,
        "kind": kind.as_str(),
        "validCount": valid,
        "invalidCount": invalid.len(),
        "valid": preview,
        "invalid": invalid,
    }))
}

fn handle_confirm(state: &mut AppState, req: &Request, kind: ImportKind) -> Result<Value, RegistrarError> {
    let batch_id = required_str(req, "batchId")?;
    db_conn(state)?;
    let Some(batch) = state.staged_imports.remove(&batch_id) else {
        return Err(RegistrarError::NotFound("import batch not found".into()));
    };
    if batch.kind() != kind {
        let staged_kind = batch.kind();
        state.staged_imports.insert(batch_id, batch);
        return Err(RegistrarError::BadParams(format!(
            "batch holds {} rows, not {}",
            staged_kind.as_str(),
            kind.as_str()
        )));
    }
    let conn = db_conn(state)?;
    let report = match &batch {
        StagedBatch::Students(rows) => imports::confirm_students(conn, rows, req.user_id.as_deref()),
        StagedBatch::Grades(rows) => imports::confirm_grades(conn, rows, req.user_id.as_deref())?,
    };
    Ok(json!(report))
}

fn handle_template(state: &mut AppState, req: &Request) -> Result<Value, RegistrarError> {
    let raw = required_str(req, "kind")?;
    let kind = ImportKind::parse(&raw)
        .ok_or_else(|| RegistrarError::BadParams(format!("unknown import kind: {}", raw)))?;
    let dir = out_dir(state, req)?;
    let path = imports::write_template(kind, &dir)?;
    Ok(json!({ "path": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "imports.students.upload" => handle_upload(state, req, ImportKind::Students),
        "imports.students.confirm" => handle_confirm(state, req, ImportKind::Students),
        "imports.grades.upload" => handle_upload(state, req, ImportKind::Grades),
        "imports.grades.confirm" => handle_confirm(state, req, ImportKind::Grades),
        "imports.template" => handle_template(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
