//! Two-phase spreadsheet import: validate and stage, then confirm row by row.

use crate::audit::{self, Model};
use crate::calc;
use crate::db;
use crate::domain::EnrollmentStatus;
use crate::error::{FieldErrors, RegistrarError, Validator};
use crate::settings::GradeSettings;
use crate::sheet::{self, Sheet, SheetRow};
use crate::students::{self, NewStudent, StudentInput, LRN_TAKEN};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const STUDENT_NOT_FOUND: &str = "Student with this LRN not found.";
pub const SUBJECT_NOT_FOUND: &str = "Subject with this code not found.";
pub const NO_ACTIVE_ENROLLMENT: &str = "No active enrollment found for student.";
pub const GRADE_LOCKED: &str = "Grade is locked and cannot be modified.";
pub const LRN_DUPLICATED_IN_FILE: &str = "LRN is duplicated within the file.";

pub const STUDENT_HEADERS: [&str; 11] = [
    "lrn",
    "last_name",
    "first_name",
    "middle_name",
    "suffix",
    "birthdate",
    "gender",
    "address",
    "contact_number",
    "guardian_name",
    "guardian_contact",
];
const STUDENT_REQUIRED: [&str; 5] = ["lrn", "last_name", "first_name", "birthdate", "gender"];

pub const GRADE_HEADERS: [&str; 4] = ["lrn", "subject_code", "midterm", "finals"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Students,
    Grades,
}

impl ImportKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "students" => Some(Self::Students),
            "grades" => Some(Self::Grades),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Students => "students",
            Self::Grades => "grades",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedStudent {
    pub row: usize,
    pub student: NewStudent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedGrade {
    pub row: usize,
    pub lrn: String,
    pub student_id: String,
    pub student_name: String,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub midterm: Option<f64>,
    pub finals: Option<f64>,
}

/// Validated rows held between upload and confirm. Nothing is persisted yet.
#[derive(Debug, Clone)]
pub enum StagedBatch {
    Students(Vec<StagedStudent>),
    Grades(Vec<StagedGrade>),
}

impl StagedBatch {
    pub fn kind(&self) -> ImportKind {
        match self {
            StagedBatch::Students(_) => ImportKind::Students,
            StagedBatch::Grades(_) => ImportKind::Grades,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StagedBatch::Students(rows) => rows.len(),
            StagedBatch::Grades(rows) => rows.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowErrors {
    pub row: usize,
    pub data: Map<String, Value>,
    pub errors: FieldErrors,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmReport {
    pub imported: usize,
    pub errors: Vec<RowFailure>,
}

fn row_data(row: &SheetRow, headers: &[String]) -> Map<String, Value> {
    headers
        .iter()
        .filter(|h| !h.is_empty())
        .map(|h| {
            (
                h.clone(),
                json!(row.cells.get(h).cloned().unwrap_or_default()),
            )
        })
        .collect()
}

fn require_headers(sheet: &Sheet, required: &[&str]) -> Result<(), RegistrarError> {
    let present: HashSet<&str> = sheet.headers.iter().map(|h| h.as_str()).collect();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|h| !present.contains(h))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(RegistrarError::Import {
        message: format!("missing required columns: {}", missing.join(", ")),
    })
}

pub fn load_sheet(path: &Path) -> Result<Sheet, RegistrarError> {
    sheet::read_sheet(path).map_err(|e| RegistrarError::Import {
        message: format!("{e:#}"),
    })
}

fn student_input(row: &SheetRow) -> StudentInput {
    let cell = |k: &str| row.get(k).map(|s| s.to_string());
    StudentInput {
        lrn: cell("lrn"),
        last_name: cell("last_name"),
        first_name: cell("first_name"),
        middle_name: cell("middle_name"),
        suffix: cell("suffix"),
        birthdate: cell("birthdate"),
        gender: cell("gender"),
        address: cell("address"),
        contact_number: cell("contact_number"),
        guardian_name: cell("guardian_name"),
        guardian_contact: cell("guardian_contact"),
        guardian_relationship: cell("guardian_relationship"),
        religion: cell("religion"),
        father_name: cell("father_name"),
        mother_name: cell("mother_name"),
        previous_school: cell("previous_school"),
        learning_modality: cell("learning_modality"),
        status: None,
    }
}

/// Validates every row of a student sheet. Returns staged rows and per-row errors.
pub fn stage_students(
    conn: &Connection,
    sheet: &Sheet,
) -> Result<(Vec<StagedStudent>, Vec<RowErrors>), RegistrarError> {
    require_headers(sheet, &STUDENT_REQUIRED)?;
    let mut staged = Vec::new();
    let mut invalid = Vec::new();
    let mut seen_lrns: HashSet<String> = HashSet::new();

    for row in sheet.rows.iter().filter(|r| !r.is_blank()) {
        let input = student_input(row);
        let mut result = students::validate_input(&input, None);
        if let Ok(student) = &result {
            let mut extra = Validator::new();
            if students::lrn_taken(conn, &student.lrn, None)? {
                extra.add("lrn", LRN_TAKEN);
            } else if !seen_lrns.insert(student.lrn.clone()) {
                extra.add("lrn", LRN_DUPLICATED_IN_FILE);
            }
            if !extra.is_empty() {
                result = Err(extra);
            }
        }
        match result {
            Ok(student) => staged.push(StagedStudent {
                row: row.row_number,
                student,
            }),
            Err(v) => invalid.push(RowErrors {
                row: row.row_number,
                data: row_data(row, &sheet.headers),
                errors: v.into_fields(),
            }),
        }
    }
    Ok((staged, invalid))
}

/// Inserts each staged student on its own; a failing row does not stop the rest.
pub fn confirm_students(conn: &Connection, rows: &[StagedStudent], actor_id: Option<&str>) -> ConfirmReport {
    let mut report = ConfirmReport {
        imported: 0,
        errors: Vec::new(),
    };
    for staged in rows {
        let outcome = match students::lrn_taken(conn, &staged.student.lrn, None) {
            Ok(true) => Err(RegistrarError::Conflict(LRN_TAKEN.to_string())),
            Ok(false) => students::insert_student(conn, &staged.student, actor_id).map(|_| ()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => report.imported += 1,
            Err(e) => report.errors.push(RowFailure {
                row: staged.row,
                message: e.to_string(),
            }),
        }
    }
    tracing::info!(
        imported = report.imported,
        failed = report.errors.len(),
        "student import confirmed"
    );
    report
}

fn parse_component(v: &mut Validator, field: &str, raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    match raw.trim().parse::<f64>() {
        Ok(x) if x.is_finite() && (50.0..=100.0).contains(&x) => Some(x),
        Ok(_) => {
            v.add(field, format!("The {field} must be between 50 and 100."));
            None
        }
        Err(_) => {
            v.add(field, format!("The {field} must be a number."));
            None
        }
    }
}

pub fn stage_grades(
    conn: &Connection,
    sheet: &Sheet,
) -> Result<(Vec<StagedGrade>, Vec<RowErrors>), RegistrarError> {
    require_headers(sheet, &GRADE_HEADERS)?;
    let mut student_stmt = conn.prepare(
        "SELECT id, last_name, first_name, middle_name, suffix FROM students WHERE lrn = ?",
    )?;
    let mut subject_stmt = conn.prepare("SELECT id, name FROM subjects WHERE code = ?")?;

    let mut staged = Vec::new();
    let mut invalid = Vec::new();
    for row in sheet.rows.iter().filter(|r| !r.is_blank()) {
        let mut v = Validator::new();
        let lrn = row.get("lrn").map(|s| s.trim().to_string());
        match &lrn {
            None => v.add("lrn", "The lrn field is required."),
            Some(l) if l.chars().count() != 12 => v.add("lrn", "The lrn must be 12 characters."),
            Some(_) => {}
        }
        let code = row.get("subject_code").map(|s| s.trim().to_string());
        if code.is_none() {
            v.add("subject_code", "The subject code field is required.");
        }
        let midterm = parse_component(&mut v, "midterm", row.get("midterm"));
        let finals = parse_component(&mut v, "finals", row.get("finals"));

        let mut student = None;
        if let (true, Some(l)) = (v.is_empty(), &lrn) {
            student = student_stmt
                .query_row([l], |r| {
                    let last: String = r.get(1)?;
                    let first: String = r.get(2)?;
                    let middle: Option<String> = r.get(3)?;
                    let suffix: Option<String> = r.get(4)?;
                    Ok((
                        r.get::<_, String>(0)?,
                        students::full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                    ))
                })
                .optional()?;
            if student.is_none() {
                v.add("lrn", STUDENT_NOT_FOUND);
            }
        }
        let mut subject = None;
        if let Some(c) = &code {
            subject = subject_stmt
                .query_row([c], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
                .optional()?;
            if subject.is_none() {
                v.add("subject_code", SUBJECT_NOT_FOUND);
            }
        }

        match (v.is_empty(), lrn, student, code, subject) {
            (true, Some(lrn), Some((student_id, student_name)), Some(subject_code), Some((subject_id, subject_name))) => {
                staged.push(StagedGrade {
                    row: row.row_number,
                    lrn,
                    student_id,
                    student_name,
                    subject_id,
                    subject_code,
                    subject_name,
                    midterm,
                    finals,
                })
            }
            _ => invalid.push(RowErrors {
                row: row.row_number,
                data: row_data(row, &sheet.headers),
                errors: v.into_fields(),
            }),
        }
    }
    Ok((staged, invalid))
}

fn apply_grade_row(
    conn: &Connection,
    row: &StagedGrade,
    settings: &GradeSettings,
    actor_id: Option<&str>,
) -> Result<(), RegistrarError> {
    let enrollment_id: Option<String> = conn
        .query_row(
            "SELECT id FROM enrollments WHERE student_id = ? AND status = ?
             ORDER BY created_at DESC, id DESC LIMIT 1",
            (&row.student_id, EnrollmentStatus::Enrolled.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    let Some(enrollment_id) = enrollment_id else {
        return Err(RegistrarError::NotFound(NO_ACTIVE_ENROLLMENT.to_string()));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    let existing: Option<(String, Option<f64>, Option<f64>, i64)> = tx
        .query_row(
            "SELECT id, midterm, finals, is_locked FROM grades WHERE enrollment_id = ? AND subject_id = ?",
            (&enrollment_id, &row.subject_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let (grade_id, old_midterm, old_finals, before) = match existing {
        Some((_, _, _, locked)) if locked != 0 => {
            return Err(RegistrarError::Conflict(GRADE_LOCKED.to_string()));
        }
        Some((id, m, f, _)) => {
            let before = audit::snapshot(&tx, Model::Grade, &id)?;
            (id, m, f, before)
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO grades(id, enrollment_id, subject_id, is_locked) VALUES(?, ?, ?, 0)",
                (&id, &enrollment_id, &row.subject_id),
            )
            .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
            (id, None, None, None)
        }
    };

    let midterm = row.midterm.or(old_midterm);
    let finals = row.finals.or(old_finals);
    let result = calc::compute_final_grade(midterm, finals, settings.import_policy(), settings.passing_grade);
    tx.execute(
        "UPDATE grades SET midterm = ?, finals = ?, final_grade = ?, remarks = ?, encoded_by = ?, updated_at = ?
         WHERE id = ?",
        (
            midterm,
            finals,
            result.final_grade,
            result.remarks.map(|r| r.as_str()),
            actor_id,
            db::now_ts(),
            &grade_id,
        ),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    match &before {
        Some(before) => audit::updated(&tx, actor_id, Model::Grade, &grade_id, before)?,
        None => audit::created(&tx, actor_id, Model::Grade, &grade_id)?,
    }
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;
    Ok(())
}

/// Applies each staged grade row in its own transaction.
pub fn confirm_grades(
    conn: &Connection,
    rows: &[StagedGrade],
    actor_id: Option<&str>,
) -> Result<ConfirmReport, RegistrarError> {
    let settings = GradeSettings::load(conn)?;
    let mut report = ConfirmReport {
        imported: 0,
        errors: Vec::new(),
    };
    for row in rows {
        match apply_grade_row(conn, row, &settings, actor_id) {
            Ok(()) => report.imported += 1,
            Err(e) => report.errors.push(RowFailure {
                row: row.row,
                message: e.to_string(),
            }),
        }
    }
    tracing::info!(
        imported = report.imported,
        failed = report.errors.len(),
        policy = settings.import_policy().name(),
        "grade import confirmed"
    );
    Ok(report)
}

/// Header row plus one sample row.
pub fn template(kind: ImportKind) -> (&'static [&'static str], Vec<String>) {
    let (headers, sample): (&'static [&'static str], &[&str]) = match kind {
        ImportKind::Students => (
            &STUDENT_HEADERS,
            &[
                "123456789012",
                "Dela Cruz",
                "Juan",
                "Santos",
                "",
                "2008-05-15",
                "male",
                "Manila, Philippines",
                "09171234567",
                "Maria Dela Cruz",
                "09179876543",
            ],
        ),
        ImportKind::Grades => (&GRADE_HEADERS, &["123456789012", "ORAL-COM", "85", "88"]),
    };
    (headers, sample.iter().map(|s| s.to_string()).collect())
}

pub fn write_template(kind: ImportKind, out_dir: &Path) -> Result<PathBuf, RegistrarError> {
    let (headers, sample) = template(kind);
    let path = out_dir.join(format!("{}-import-template.csv", kind.as_str()));
    sheet::write_csv(&path, headers, &[sample]).map_err(|e| RegistrarError::Io(format!("{e:#}")))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_match_their_headers() {
        for kind in [ImportKind::Students, ImportKind::Grades] {
            let (headers, sample) = template(kind);
            assert_eq!(headers.len(), sample.len(), "{:?}", kind);
        }
    }

    #[test]
    fn grade_components_allow_blank_and_bound_50_100() {
        let mut v = Validator::new();
        assert_eq!(parse_component(&mut v, "midterm", None), None);
        assert_eq!(parse_component(&mut v, "midterm", Some("60")), Some(60.0));
        assert!(v.is_empty());
        assert_eq!(parse_component(&mut v, "finals", Some("49.5")), None);
        assert_eq!(parse_component(&mut v, "midterm", Some("abc")), None);
        let errs = v.into_fields();
        assert_eq!(errs["finals"], vec!["The finals must be between 50 and 100."]);
        assert_eq!(errs["midterm"], vec!["The midterm must be a number."]);
    }
}
