//! Tracks, strands, subjects, and the strand/subject pivot.

use crate::domain::{grade_level_valid, SubjectType};
use crate::error::{RegistrarError, Validator};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurriculumTable {
    Tracks,
    Strands,
}

impl CurriculumTable {
    fn table(self) -> &'static str {
        match self {
            CurriculumTable::Tracks => "tracks",
            CurriculumTable::Strands => "strands",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            CurriculumTable::Tracks => "track",
            CurriculumTable::Strands => "strand",
        }
    }
}

fn validate_code_name(
    conn: &Connection,
    table: CurriculumTable,
    code: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), RegistrarError> {
    let mut v = Validator::new();
    if code.trim().is_empty() {
        v.add("code", "The code field is required.");
    } else if code.chars().count() > 20 {
        v.add("code", "The code may not be greater than 20 characters.");
    } else {
        let sql = format!(
            "SELECT id FROM {} WHERE code = ? AND id <> ?",
            table.table()
        );
        let taken: Option<String> = conn
            .query_row(&sql, (code.trim(), exclude_id.unwrap_or("")), |r| r.get(0))
            .optional()?;
        if taken.is_some() {
            v.add("code", "The code has already been taken.");
        }
    }
    if name.trim().is_empty() {
        v.add("name", "The name field is required.");
    } else if name.chars().count() > 255 {
        v.add("name", "The name may not be greater than 255 characters.");
    }
    v.finish()
}

pub fn create_track(conn: &Connection, code: &str, name: &str, sort_order: i64) -> Result<String, RegistrarError> {
    validate_code_name(conn, CurriculumTable::Tracks, code, name, None)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tracks(id, code, name, is_active, sort_order) VALUES(?, ?, ?, 1, ?)",
        (&id, code.trim(), name.trim(), sort_order),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    Ok(id)
}

pub fn create_strand(
    conn: &Connection,
    track_id: &str,
    code: &str,
    name: &str,
    sort_order: i64,
) -> Result<String, RegistrarError> {
    ensure_exists(conn, "tracks", track_id, "track")?;
    validate_code_name(conn, CurriculumTable::Strands, code, name, None)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO strands(id, track_id, code, name, is_active, sort_order) VALUES(?, ?, ?, ?, 1, ?)",
        (&id, track_id, code.trim(), name.trim(), sort_order),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    Ok(id)
}

pub fn update_code_name(
    conn: &Connection,
    table: CurriculumTable,
    id: &str,
    code: &str,
    name: &str,
    sort_order: Option<i64>,
) -> Result<(), RegistrarError> {
    ensure_exists(conn, table.table(), id, table.noun())?;
    validate_code_name(conn, table, code, name, Some(id))?;
    let sql = format!(
        "UPDATE {} SET code = ?, name = ?, sort_order = COALESCE(?, sort_order) WHERE id = ?",
        table.table()
    );
    conn.execute(&sql, (code.trim(), name.trim(), sort_order, id))
        .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    Ok(())
}

pub fn toggle_active(conn: &Connection, table: CurriculumTable, id: &str) -> Result<bool, RegistrarError> {
    let sql = format!("SELECT is_active FROM {} WHERE id = ?", table.table());
    let current: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    let Some(current) = current else {
        return Err(RegistrarError::not_found(table.noun()));
    };
    let next = current == 0;
    let sql = format!("UPDATE {} SET is_active = ? WHERE id = ?", table.table());
    conn.execute(&sql, (next as i64, id))
        .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    Ok(next)
}

pub fn ensure_exists(conn: &Connection, table: &str, id: &str, noun: &str) -> Result<(), RegistrarError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    if found.is_none() {
        return Err(RegistrarError::not_found(noun));
    }
    Ok(())
}

/// Tracks with their strands nested, in display order.
pub fn list_tracks(conn: &Connection, active_only: bool) -> Result<Vec<Value>, RegistrarError> {
    let mut stmt = conn.prepare(
        "SELECT id, code, name, is_active, sort_order FROM tracks
         WHERE (? = 0 OR is_active = 1)
         ORDER BY sort_order, code",
    )?;
    let tracks = stmt
        .query_map([active_only as i64], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, i64>(4)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut strand_stmt = conn.prepare(
        "SELECT id, code, name, is_active, sort_order FROM strands
         WHERE track_id = ? AND (? = 0 OR is_active = 1)
         ORDER BY sort_order, code",
    )?;
    let mut out = Vec::with_capacity(tracks.len());
    for (id, code, name, is_active, sort_order) in tracks {
        let strands = strand_stmt
            .query_map((&id, active_only as i64), |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "code": r.get::<_, String>(1)?,
                    "name": r.get::<_, String>(2)?,
                    "isActive": r.get::<_, i64>(3)? != 0,
                    "sortOrder": r.get::<_, i64>(4)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        out.push(json!({
            "id": id,
            "code": code,
            "name": name,
            "isActive": is_active != 0,
            "sortOrder": sort_order,
            "strands": strands,
        }));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrandMapping {
    pub strand_id: String,
    pub grade_level: i64,
    pub semester: i64,
    pub sort_order: i64,
}

#[derive(Debug, Clone)]
pub struct SubjectInput {
    pub code: String,
    pub name: String,
    pub subject_type: SubjectType,
    pub hours: i64,
    pub prerequisite_id: Option<String>,
    /// `None` leaves the existing pivot rows untouched on update.
    pub strands: Option<Vec<StrandMapping>>,
}

/// Walks the single-parent prerequisite chain from `start`. True if it reaches `target`
/// or loops on itself.
pub fn chain_reaches<F>(start: &str, target: &str, mut next: F) -> Result<bool, RegistrarError>
where
    F: FnMut(&str) -> Result<Option<String>, RegistrarError>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut cur = start.to_string();
    loop {
        if cur == target {
            return Ok(true);
        }
        if !seen.insert(cur.clone()) {
            return Ok(true);
        }
        match next(&cur)? {
            Some(parent) => cur = parent,
            None => return Ok(false),
        }
    }
}

fn prerequisite_of(conn: &Connection, subject_id: &str) -> Result<Option<String>, RegistrarError> {
    let v: Option<Option<String>> = conn
        .query_row(
            "SELECT prerequisite_id FROM subjects WHERE id = ?",
            [subject_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.flatten())
}

fn validate_subject(
    conn: &Connection,
    input: &SubjectInput,
    subject_id: Option<&str>,
) -> Result<(), RegistrarError> {
    let mut v = Validator::new();
    let code = input.code.trim();
    if code.is_empty() {
        v.add("code", "The code field is required.");
    } else if code.chars().count() > 20 {
        v.add("code", "The code may not be greater than 20 characters.");
    } else {
        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM subjects WHERE code = ? AND id <> ?",
                (code, subject_id.unwrap_or("")),
                |r| r.get(0),
            )
            .optional()?;
        if taken.is_some() {
            v.add("code", "The code has already been taken.");
        }
    }
    if input.name.trim().is_empty() {
        v.add("name", "The name field is required.");
    } else if input.name.chars().count() > 255 {
        v.add("name", "The name may not be greater than 255 characters.");
    }
    if input.hours < 1 {
        v.add("hours", "The hours must be at least 1.");
    }
    if let Some(prereq) = input.prerequisite_id.as_deref() {
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM subjects WHERE id = ?", [prereq], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            v.add("prerequisite_id", "The selected prerequisite is invalid.");
        }
    }
    if let Some(strands) = &input.strands {
        let mut keys = HashSet::new();
        for (i, m) in strands.iter().enumerate() {
            let field = format!("strands.{i}");
            if !grade_level_valid(m.grade_level) {
                v.add(&format!("{field}.grade_level"), "The grade level must be 11 or 12.");
            }
            if !matches!(m.semester, 1 | 2) {
                v.add(&format!("{field}.semester"), "The semester must be 1 or 2.");
            }
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM strands WHERE id = ?", [&m.strand_id], |r| r.get(0))
                .optional()?;
            if exists.is_none() {
                v.add(&format!("{field}.strand_id"), "The selected strand is invalid.");
            }
            if !keys.insert((m.strand_id.clone(), m.grade_level, m.semester)) {
                v.add(&field, "Duplicate strand mapping.");
            }
        }
    }
    v.finish()?;

    if let (Some(id), Some(prereq)) = (subject_id, input.prerequisite_id.as_deref()) {
        if chain_reaches(prereq, id, |s| prerequisite_of(conn, s))? {
            return Err(RegistrarError::Conflict(
                "The selected prerequisite would create a prerequisite cycle.".to_string(),
            ));
        }
    }
    Ok(())
}

fn sync_strands(conn: &Connection, subject_id: &str, strands: &[StrandMapping]) -> Result<(), RegistrarError> {
    conn.execute("DELETE FROM strand_subject WHERE subject_id = ?", [subject_id])
        .map_err(|e| RegistrarError::db("db_delete_failed", e))?;
    for m in strands {
        conn.execute(
            "INSERT INTO strand_subject(subject_id, strand_id, grade_level, semester, sort_order)
             VALUES(?, ?, ?, ?, ?)",
            (subject_id, &m.strand_id, m.grade_level, m.semester, m.sort_order),
        )
        .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    }
    Ok(())
}

pub fn create_subject(conn: &Connection, input: &SubjectInput) -> Result<String, RegistrarError> {
    validate_subject(conn, input, None)?;
    let id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO subjects(id, code, name, type, hours, prerequisite_id, is_active)
         VALUES(?, ?, ?, ?, ?, ?, 1)",
        (
            &id,
            input.code.trim(),
            input.name.trim(),
            input.subject_type.as_str(),
            input.hours,
            input.prerequisite_id.as_deref(),
        ),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    if let Some(strands) = &input.strands {
        sync_strands(&tx, &id, strands)?;
    }
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;
    Ok(id)
}

pub fn update_subject(conn: &Connection, subject_id: &str, input: &SubjectInput) -> Result<(), RegistrarError> {
    ensure_exists(conn, "subjects", subject_id, "subject")?;
    validate_subject(conn, input, Some(subject_id))?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    tx.execute(
        "UPDATE subjects SET code = ?, name = ?, type = ?, hours = ?, prerequisite_id = ? WHERE id = ?",
        (
            input.code.trim(),
            input.name.trim(),
            input.subject_type.as_str(),
            input.hours,
            input.prerequisite_id.as_deref(),
            subject_id,
        ),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    if let Some(strands) = &input.strands {
        sync_strands(&tx, subject_id, strands)?;
    }
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;
    Ok(())
}

/// Subjects are never deleted; deactivation hides them from subject loads.
pub fn set_subject_active(conn: &Connection, subject_id: &str, active: bool) -> Result<(), RegistrarError> {
    let n = conn
        .execute(
            "UPDATE subjects SET is_active = ? WHERE id = ?",
            (active as i64, subject_id),
        )
        .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    if n == 0 {
        return Err(RegistrarError::not_found("subject"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub subject_type: String,
    pub hours: i64,
    pub prerequisite_id: Option<String>,
    pub prerequisite_code: Option<String>,
    pub is_active: bool,
}

fn subject_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<SubjectRow> {
    Ok(SubjectRow {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        subject_type: r.get(3)?,
        hours: r.get(4)?,
        prerequisite_id: r.get(5)?,
        prerequisite_code: r.get(6)?,
        is_active: r.get::<_, i64>(7)? != 0,
    })
}

const SUBJECT_SELECT: &str = "SELECT s.id, s.code, s.name, s.type, s.hours, s.prerequisite_id, p.code, s.is_active
     FROM subjects s LEFT JOIN subjects p ON p.id = s.prerequisite_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveFilter {
    Active,
    Inactive,
    All,
}

#[derive(Debug, Clone)]
pub struct SubjectFilters {
    pub active: ActiveFilter,
    pub subject_type: Option<SubjectType>,
    pub strand_id: Option<String>,
    pub search: Option<String>,
}

pub fn list_subjects(conn: &Connection, f: &SubjectFilters) -> Result<Vec<SubjectRow>, RegistrarError> {
    let active_flag: i64 = match f.active {
        ActiveFilter::Active => 1,
        ActiveFilter::Inactive => 0,
        ActiveFilter::All => -1,
    };
    let search = f
        .search
        .as_deref()
        .map(|s| format!("%{}%", s.trim()))
        .unwrap_or_default();
    let sql = format!(
        "{SUBJECT_SELECT}
         WHERE (?1 = -1 OR s.is_active = ?1)
           AND (?2 IS NULL OR s.type = ?2)
           AND (?3 IS NULL OR EXISTS(SELECT 1 FROM strand_subject ss WHERE ss.subject_id = s.id AND ss.strand_id = ?3))
           AND (?4 = '' OR s.code LIKE ?4 OR s.name LIKE ?4)
         ORDER BY s.code"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            (
                active_flag,
                f.subject_type.map(|t| t.as_str()),
                f.strand_id.as_deref(),
                search.as_str(),
            ),
            subject_row,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn get_subject(conn: &Connection, subject_id: &str) -> Result<Value, RegistrarError> {
    let sql = format!("{SUBJECT_SELECT} WHERE s.id = ?");
    let subject = conn
        .query_row(&sql, [subject_id], subject_row)
        .optional()?
        .ok_or_else(|| RegistrarError::not_found("subject"))?;

    let mut stmt = conn.prepare(
        "SELECT ss.strand_id, st.code, ss.grade_level, ss.semester, ss.sort_order
         FROM strand_subject ss JOIN strands st ON st.id = ss.strand_id
         WHERE ss.subject_id = ?
         ORDER BY st.code, ss.grade_level, ss.semester",
    )?;
    let strands = stmt
        .query_map([subject_id], |r| {
            Ok(json!({
                "strandId": r.get::<_, String>(0)?,
                "strandCode": r.get::<_, String>(1)?,
                "gradeLevel": r.get::<_, i64>(2)?,
                "semester": r.get::<_, i64>(3)?,
                "sortOrder": r.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "subject": subject, "strands": strands }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn walk(graph: &HashMap<&str, &str>, start: &str, target: &str) -> bool {
        chain_reaches(start, target, |s| Ok(graph.get(s).map(|p| p.to_string())))
            .expect("walk")
    }

    #[test]
    fn detects_direct_and_transitive_cycles() {
        // A requires B, B requires C.
        let graph: HashMap<&str, &str> = [("A", "B"), ("B", "C")].into_iter().collect();
        // Setting C's prerequisite to A closes the loop.
        assert!(walk(&graph, "A", "C"));
        // Setting C's prerequisite to some unrelated D does not.
        assert!(!walk(&graph, "D", "C"));
        // A subject cannot be its own prerequisite.
        assert!(walk(&graph, "C", "C"));
    }

    #[test]
    fn stops_on_preexisting_loop() {
        let graph: HashMap<&str, &str> = [("X", "Y"), ("Y", "X")].into_iter().collect();
        assert!(walk(&graph, "X", "Z"));
    }
}
