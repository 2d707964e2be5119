//! Grade sheets per section and subject: entry, lock, unlock.

use crate::audit::{self, Model};
use crate::calc;
use crate::calendar;
use crate::capabilities::{Actor, UserRole};
use crate::db;
use crate::domain::{grade_level_label, EnrollmentStatus};
use crate::error::{RegistrarError, Validator};
use crate::settings::GradeSettings;
use crate::students::full_name;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Teachers only reach sections they advise.
pub fn ensure_section_access(conn: &Connection, actor: &Actor, section_id: &str) -> Result<(), RegistrarError> {
    let adviser: Option<Option<String>> = conn
        .query_row(
            "SELECT adviser_id FROM sections WHERE id = ?",
            [section_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(adviser) = adviser else {
        return Err(RegistrarError::not_found("section"));
    };
    match actor.role {
        UserRole::Admin | UserRole::Registrar => Ok(()),
        UserRole::Teacher => match (&actor.user_id, adviser) {
            (Some(uid), Some(adv)) if *uid == adv => Ok(()),
            (None, _) => Err(RegistrarError::Forbidden(
                "teacher requests must carry userId".to_string(),
            )),
            _ => Err(RegistrarError::Forbidden(
                "section is not advised by this teacher".to_string(),
            )),
        },
        UserRole::Student => Err(RegistrarError::Forbidden("students cannot view grade sheets".to_string())),
    }
}

/// Sections of the active semester with per-subject entry progress.
pub fn sections_for(conn: &Connection, actor: &Actor) -> Result<Value, RegistrarError> {
    let active = calendar::active_term(conn)?;
    let Some(semester_id) = active.semester_id.clone() else {
        return Ok(json!({ "activeTerm": active, "sections": [] }));
    };
    let semester_no = active.semester_number.unwrap_or(1);
    let adviser_filter: Option<String> = match actor.role {
        UserRole::Teacher => match &actor.user_id {
            Some(uid) => Some(uid.clone()),
            None => {
                return Err(RegistrarError::Forbidden(
                    "teacher requests must carry userId".to_string(),
                ))
            }
        },
        UserRole::Admin | UserRole::Registrar | UserRole::Student => None,
    };

    let mut stmt = conn.prepare(
        "SELECT sec.id, sec.name, sec.grade_level, sec.strand_id, str.code, u.name,
                (SELECT COUNT(*) FROM enrollments e WHERE e.section_id = sec.id AND e.status = 'enrolled')
         FROM sections sec
         JOIN strands str ON str.id = sec.strand_id
         LEFT JOIN users u ON u.id = sec.adviser_id
         WHERE sec.semester_id = ? AND (? IS NULL OR sec.adviser_id = ?)
         ORDER BY sec.grade_level, sec.name",
    )?;
    let sections = stmt
        .query_map(
            (&semester_id, adviser_filter.as_deref(), adviser_filter.as_deref()),
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, i64>(6)?,
                ))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut subj_stmt = conn.prepare(
        "SELECT s.id, s.code, s.name
         FROM strand_subject ss JOIN subjects s ON s.id = ss.subject_id
         WHERE ss.strand_id = ? AND ss.grade_level = ? AND ss.semester = ? AND s.is_active = 1
         ORDER BY ss.sort_order, s.code",
    )?;
    let mut entered_stmt = conn.prepare(
        "SELECT COUNT(*) FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
         WHERE e.section_id = ? AND e.status = 'enrolled' AND g.subject_id = ? AND g.final_grade IS NOT NULL",
    )?;
    let mut locked_stmt = conn.prepare(
        "SELECT COUNT(*) FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
         WHERE e.section_id = ? AND g.subject_id = ? AND g.is_locked = 1",
    )?;

    let mut out = Vec::with_capacity(sections.len());
    for (id, name, grade_level, strand_id, strand_code, adviser, enrolled) in sections {
        let subjects = subj_stmt
            .query_map((&strand_id, grade_level, semester_no), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        let mut subject_rows = Vec::with_capacity(subjects.len());
        for (sid, code, sname) in subjects {
            let entered: i64 = entered_stmt.query_row((&id, &sid), |r| r.get(0))?;
            let locked: i64 = locked_stmt.query_row((&id, &sid), |r| r.get(0))?;
            subject_rows.push(json!({
                "id": sid,
                "code": code,
                "name": sname,
                "gradesTotal": enrolled,
                "gradesEntered": entered,
                "isLocked": locked > 0,
            }));
        }
        out.push(json!({
            "id": id,
            "name": name,
            "gradeLevel": grade_level,
            "gradeLevelLabel": grade_level_label(grade_level),
            "strand": strand_code,
            "adviser": adviser,
            "enrolledCount": enrolled,
            "subjects": subject_rows,
        }));
    }
    Ok(json!({ "activeTerm": active, "sections": out }))
}

pub fn sheet(conn: &Connection, section_id: &str, subject_id: &str) -> Result<Value, RegistrarError> {
    let section = conn
        .query_row(
            "SELECT sec.name, sec.grade_level, str.code FROM sections sec
             JOIN strands str ON str.id = sec.strand_id WHERE sec.id = ?",
            [section_id],
            |r| {
                Ok(json!({
                    "id": section_id,
                    "name": r.get::<_, String>(0)?,
                    "gradeLevel": r.get::<_, i64>(1)?,
                    "strand": r.get::<_, String>(2)?,
                }))
            },
        )
        .optional()?
        .ok_or_else(|| RegistrarError::not_found("section"))?;
    let subject = conn
        .query_row(
            "SELECT code, name FROM subjects WHERE id = ?",
            [subject_id],
            |r| {
                Ok(json!({
                    "id": subject_id,
                    "code": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                }))
            },
        )
        .optional()?
        .ok_or_else(|| RegistrarError::not_found("subject"))?;

    let mut stmt = conn.prepare(
        "SELECT g.id, st.id, st.lrn, st.last_name, st.first_name, st.middle_name, st.suffix,
                g.midterm, g.finals, g.final_grade, g.remarks, g.is_locked
         FROM grades g
         JOIN enrollments e ON e.id = g.enrollment_id
         JOIN students st ON st.id = e.student_id
         WHERE e.section_id = ? AND g.subject_id = ? AND e.status = ?
         ORDER BY st.last_name, st.first_name",
    )?;
    let rows = stmt
        .query_map(
            (section_id, subject_id, EnrollmentStatus::Enrolled.as_str()),
            |r| {
                let last: String = r.get(3)?;
                let first: String = r.get(4)?;
                let middle: Option<String> = r.get(5)?;
                let suffix: Option<String> = r.get(6)?;
                Ok(json!({
                    "gradeId": r.get::<_, String>(0)?,
                    "studentId": r.get::<_, String>(1)?,
                    "lrn": r.get::<_, String>(2)?,
                    "studentName": full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                    "midterm": r.get::<_, Option<f64>>(7)?,
                    "finals": r.get::<_, Option<f64>>(8)?,
                    "finalGrade": r.get::<_, Option<f64>>(9)?,
                    "remarks": r.get::<_, Option<String>>(10)?,
                    "isLocked": r.get::<_, i64>(11)? != 0,
                }))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let settings = GradeSettings::load(conn)?;
    Ok(json!({
        "section": section,
        "subject": subject,
        "settings": settings.to_json(),
        "rows": rows,
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeEntry {
    pub grade_id: String,
    pub midterm: Option<f64>,
    pub finals: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub updated: usize,
    pub skipped_locked: usize,
}

fn check_component(v: &mut Validator, field: String, value: Option<f64>) {
    if let Some(x) = value {
        if !x.is_finite() || !(0.0..=100.0).contains(&x) {
            v.add(&field, "The grade must be between 0 and 100.");
        }
    }
}

/// Validates every row before touching storage, then writes in one transaction.
/// Locked grades are left as they are and only counted.
pub fn save(
    conn: &Connection,
    section_id: &str,
    subject_id: &str,
    entries: &[GradeEntry],
    actor_id: Option<&str>,
) -> Result<SaveOutcome, RegistrarError> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.is_locked FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
         WHERE e.section_id = ? AND g.subject_id = ?",
    )?;
    let owned: HashMap<String, bool> = stmt
        .query_map((section_id, subject_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? != 0))
        })
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())?;

    let mut v = Validator::new();
    for (i, entry) in entries.iter().enumerate() {
        if !owned.contains_key(&entry.grade_id) {
            v.add(
                &format!("grades.{i}.grade_id"),
                "The grade does not belong to this section and subject.",
            );
        }
        check_component(&mut v, format!("grades.{i}.midterm"), entry.midterm);
        check_component(&mut v, format!("grades.{i}.finals"), entry.finals);
    }
    v.finish()?;

    let settings = GradeSettings::load(conn)?;
    let policy = settings.entry_policy();
    let now = db::now_ts();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    let mut outcome = SaveOutcome {
        updated: 0,
        skipped_locked: 0,
    };
    for entry in entries {
        // Re-read inside the transaction so a lock taken since validation still wins.
        let locked: i64 = tx
            .query_row("SELECT is_locked FROM grades WHERE id = ?", [&entry.grade_id], |r| r.get(0))
            .map_err(|e| RegistrarError::db("db_query_failed", e))?;
        if locked != 0 {
            outcome.skipped_locked += 1;
            continue;
        }
        let before = audit::snapshot(&tx, Model::Grade, &entry.grade_id)?;
        let result = calc::compute_final_grade(entry.midterm, entry.finals, policy, settings.passing_grade);
        tx.execute(
            "UPDATE grades SET midterm = ?, finals = ?, final_grade = ?, remarks = ?, encoded_by = ?, updated_at = ?
             WHERE id = ?",
            (
                entry.midterm,
                entry.finals,
                result.final_grade,
                result.remarks.map(|r| r.as_str()),
                actor_id,
                &now,
                &entry.grade_id,
            ),
        )
        .map_err(|e| RegistrarError::db("db_update_failed", e))?;
        if let Some(before) = &before {
            audit::updated(&tx, actor_id, Model::Grade, &entry.grade_id, before)?;
        }
        outcome.updated += 1;
    }
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;

    tracing::info!(
        section_id = %section_id,
        subject_id = %subject_id,
        updated = outcome.updated,
        skipped_locked = outcome.skipped_locked,
        "grades saved"
    );
    Ok(outcome)
}

/// Sets the lock flag on every grade of the section for the subject. Returns rows touched.
pub fn set_locked(
    conn: &Connection,
    section_id: &str,
    subject_id: &str,
    locked: bool,
    actor_id: Option<&str>,
) -> Result<usize, RegistrarError> {
    crate::curriculum::ensure_exists(conn, "sections", section_id, "section")?;
    crate::curriculum::ensure_exists(conn, "subjects", subject_id, "subject")?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    let ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT g.id FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
             WHERE e.section_id = ? AND g.subject_id = ?",
        )?;
        let rows = stmt
            .query_map((section_id, subject_id), |r| r.get(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        rows
    };
    for id in &ids {
        let before = audit::snapshot(&tx, Model::Grade, id)?;
        tx.execute("UPDATE grades SET is_locked = ? WHERE id = ?", (locked as i64, id))
            .map_err(|e| RegistrarError::db("db_update_failed", e))?;
        if let Some(before) = &before {
            audit::updated(&tx, actor_id, Model::Grade, id, before)?;
        }
    }
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;
    tracing::info!(
        section_id = %section_id,
        subject_id = %subject_id,
        locked,
        grades = ids.len(),
        "grade lock changed"
    );
    Ok(ids.len())
}
