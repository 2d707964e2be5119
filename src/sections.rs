use crate::audit::{self, Model};
use crate::calendar;
use crate::db;
use crate::domain::{grade_level_label, grade_level_valid, EnrollmentStatus};
use crate::error::{RegistrarError, Validator};
use crate::settings;
use crate::students::full_name;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

pub const HAS_ENROLLMENTS: &str = "Cannot delete section with existing enrollments.";

#[derive(Debug, Clone)]
pub struct SectionInput {
    pub name: String,
    pub semester_id: String,
    pub strand_id: String,
    pub grade_level: i64,
    pub max_capacity: Option<i64>,
    pub adviser_id: Option<String>,
}

fn validate(conn: &Connection, input: &SectionInput, section_id: Option<&str>) -> Result<(), RegistrarError> {
    let mut v = Validator::new();
    let name = input.name.trim();
    if name.is_empty() {
        v.add("name", "The name field is required.");
    } else if name.chars().count() > 100 {
        v.add("name", "The name may not be greater than 100 characters.");
    } else {
        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM sections WHERE semester_id = ? AND name = ? AND id <> ?",
                (&input.semester_id, name, section_id.unwrap_or("")),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            v.add("name", "The name has already been taken for this semester.");
        }
    }
    if !grade_level_valid(input.grade_level) {
        v.add("grade_level", "The grade level must be 11 or 12.");
    }
    if let Some(cap) = input.max_capacity {
        if cap < 1 {
            v.add("max_capacity", "The max capacity must be at least 1.");
        }
    }
    let semester: Option<i64> = conn
        .query_row("SELECT 1 FROM semesters WHERE id = ?", [&input.semester_id], |r| r.get(0))
        .optional()?;
    if semester.is_none() {
        v.add("semester_id", "The selected semester is invalid.");
    }
    let strand: Option<i64> = conn
        .query_row("SELECT 1 FROM strands WHERE id = ?", [&input.strand_id], |r| r.get(0))
        .optional()?;
    if strand.is_none() {
        v.add("strand_id", "The selected strand is invalid.");
    }
    if let Some(adviser) = &input.adviser_id {
        let role: Option<String> = conn
            .query_row("SELECT role FROM users WHERE id = ?", [adviser], |r| r.get(0))
            .optional()?;
        if role.as_deref() != Some("teacher") {
            v.add("adviser_id", "The adviser must be a teacher account.");
        }
    }
    v.finish()
}

pub fn create_section(conn: &Connection, input: &SectionInput, actor_id: Option<&str>) -> Result<String, RegistrarError> {
    validate(conn, input, None)?;
    let capacity = match input.max_capacity {
        Some(c) => c,
        None => settings::default_capacity(conn)?,
    };
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sections(id, semester_id, strand_id, grade_level, name, max_capacity, adviser_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &input.semester_id,
            &input.strand_id,
            input.grade_level,
            input.name.trim(),
            capacity,
            input.adviser_id.as_deref(),
            db::now_ts(),
        ),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    audit::created(conn, actor_id, Model::Section, &id)?;
    Ok(id)
}

pub fn update_section(
    conn: &Connection,
    section_id: &str,
    input: &SectionInput,
    actor_id: Option<&str>,
) -> Result<(), RegistrarError> {
    let Some(before) = audit::snapshot(conn, Model::Section, section_id)? else {
        return Err(RegistrarError::not_found("section"));
    };
    validate(conn, input, Some(section_id))?;
    conn.execute(
        "UPDATE sections SET semester_id = ?, strand_id = ?, grade_level = ?, name = ?,
            max_capacity = COALESCE(?, max_capacity), adviser_id = ?
         WHERE id = ?",
        (
            &input.semester_id,
            &input.strand_id,
            input.grade_level,
            input.name.trim(),
            input.max_capacity,
            input.adviser_id.as_deref(),
            section_id,
        ),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    audit::updated(conn, actor_id, Model::Section, section_id, &before)
}

pub fn delete_section(conn: &Connection, section_id: &str, actor_id: Option<&str>) -> Result<(), RegistrarError> {
    let Some(before) = audit::snapshot(conn, Model::Section, section_id)? else {
        return Err(RegistrarError::not_found("section"));
    };
    let refs: i64 = conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE section_id = ?",
        [section_id],
        |r| r.get(0),
    )?;
    if refs > 0 {
        return Err(RegistrarError::Conflict(HAS_ENROLLMENTS.to_string()));
    }
    conn.execute("DELETE FROM sections WHERE id = ?", [section_id])
        .map_err(|e| RegistrarError::db("db_delete_failed", e))?;
    audit::deleted(conn, actor_id, Model::Section, section_id, &before)
}

#[derive(Debug, Clone, Default)]
pub struct SectionFilters {
    pub semester_id: Option<String>,
    pub strand_id: Option<String>,
    pub grade_level: Option<i64>,
    pub adviser_id: Option<String>,
}

const SECTION_SELECT: &str = "SELECT sec.id, sec.name, sec.grade_level, sec.max_capacity, sec.semester_id,
        sec.strand_id, str.code, sec.adviser_id, u.name,
        (SELECT COUNT(*) FROM enrollments e WHERE e.section_id = sec.id AND e.status = 'enrolled')
     FROM sections sec
     JOIN strands str ON str.id = sec.strand_id
     LEFT JOIN users u ON u.id = sec.adviser_id";

fn section_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let grade_level: i64 = r.get(2)?;
    let max: i64 = r.get(3)?;
    let enrolled: i64 = r.get(9)?;
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "name": r.get::<_, String>(1)?,
        "gradeLevel": grade_level,
        "gradeLevelLabel": grade_level_label(grade_level),
        "maxCapacity": max,
        "semesterId": r.get::<_, String>(4)?,
        "strandId": r.get::<_, String>(5)?,
        "strand": r.get::<_, String>(6)?,
        "adviserId": r.get::<_, Option<String>>(7)?,
        "adviser": r.get::<_, Option<String>>(8)?,
        "enrolledCount": enrolled,
        "isFull": enrolled >= max,
    }))
}

/// Defaults to the active semester when no semester filter is given.
pub fn list_sections(conn: &Connection, f: &SectionFilters) -> Result<Vec<Value>, RegistrarError> {
    let semester_id = match &f.semester_id {
        Some(s) => Some(s.clone()),
        None => calendar::active_semester_id(conn)?,
    };
    let sql = format!(
        "{SECTION_SELECT}
         WHERE (?1 IS NULL OR sec.semester_id = ?1)
           AND (?2 IS NULL OR sec.strand_id = ?2)
           AND (?3 IS NULL OR sec.grade_level = ?3)
           AND (?4 IS NULL OR sec.adviser_id = ?4)
         ORDER BY sec.grade_level, sec.name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (
                semester_id.as_deref(),
                f.strand_id.as_deref(),
                f.grade_level,
                f.adviser_id.as_deref(),
            ),
            section_json,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn get_section(conn: &Connection, section_id: &str) -> Result<Value, RegistrarError> {
    let mut section = conn
        .query_row(&format!("{SECTION_SELECT} WHERE sec.id = ?"), [section_id], section_json)
        .optional()?
        .ok_or_else(|| RegistrarError::not_found("section"))?;

    let mut stmt = conn.prepare(
        "SELECT e.id, e.status, st.id, st.lrn, st.last_name, st.first_name, st.middle_name, st.suffix, st.gender
         FROM enrollments e JOIN students st ON st.id = e.student_id
         WHERE e.section_id = ?
         ORDER BY st.last_name, st.first_name",
    )?;
    let students = stmt
        .query_map([section_id], |r| {
            let last: String = r.get(4)?;
            let first: String = r.get(5)?;
            let middle: Option<String> = r.get(6)?;
            let suffix: Option<String> = r.get(7)?;
            let status: String = r.get(1)?;
            Ok(json!({
                "enrollmentId": r.get::<_, String>(0)?,
                "status": status,
                "statusLabel": EnrollmentStatus::parse(&status).map(|s| s.label()),
                "studentId": r.get::<_, String>(2)?,
                "lrn": r.get::<_, String>(3)?,
                "name": full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                "gender": r.get::<_, String>(8)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    section["students"] = json!(students);
    Ok(section)
}
