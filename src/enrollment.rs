//! Enrollment lifecycle: enroll with subject load, status transitions, prerequisite check.

use crate::audit::{self, Model};
use crate::calendar;
use crate::db;
use crate::domain::{grade_level_label, EnrollmentStatus, GradeRemarks, Page};
use crate::error::{RegistrarError, Validator};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

pub const DUPLICATE_ENROLLMENT: &str = "This student is already enrolled for the selected semester.";

#[derive(Debug, Clone)]
pub struct EnrollInput {
    pub student_id: String,
    pub section_id: String,
    pub semester_id: String,
    pub subject_ids: Vec<String>,
    pub remarks: Option<String>,
    pub actor_id: Option<String>,
}

struct SectionInfo {
    semester_id: String,
    strand_id: String,
    grade_level: i64,
}

fn section_info(conn: &Connection, section_id: &str) -> Result<Option<SectionInfo>, RegistrarError> {
    Ok(conn
        .query_row(
            "SELECT semester_id, strand_id, grade_level FROM sections WHERE id = ?",
            [section_id],
            |r| {
                Ok(SectionInfo {
                    semester_id: r.get(0)?,
                    strand_id: r.get(1)?,
                    grade_level: r.get(2)?,
                })
            },
        )
        .optional()?)
}

fn exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, RegistrarError> {
    let v: Option<i64> = conn.query_row(sql, [id], |r| r.get(0)).optional()?;
    Ok(v.is_some())
}

fn dedupe(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Creates a pending enrollment plus one empty grade row per subject.
pub fn enroll(conn: &Connection, input: &EnrollInput) -> Result<String, RegistrarError> {
    let subject_ids = dedupe(&input.subject_ids);
    let mut v = Validator::new();
    if !exists(conn, "SELECT 1 FROM students WHERE id = ?", &input.student_id)? {
        v.add("student_id", "The selected student is invalid.");
    }
    if !exists(conn, "SELECT 1 FROM semesters WHERE id = ?", &input.semester_id)? {
        v.add("semester_id", "The selected semester is invalid.");
    }
    let section = section_info(conn, &input.section_id)?;
    match &section {
        None => v.add("section_id", "The selected section is invalid."),
        Some(s) if s.semester_id != input.semester_id => v.add(
            "section_id",
            "The selected section does not belong to the selected semester.",
        ),
        Some(_) => {}
    }
    if subject_ids.is_empty() {
        v.add("subject_ids", "The subject ids field must have at least 1 items.");
    }
    for (i, sid) in subject_ids.iter().enumerate() {
        if !exists(conn, "SELECT 1 FROM subjects WHERE id = ?", sid)? {
            v.add(&format!("subject_ids.{i}"), "The selected subject is invalid.");
        }
    }
    v.finish()?;
    let Some(section) = section else {
        return Err(RegistrarError::not_found("section"));
    };

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM enrollments WHERE student_id = ? AND semester_id = ?",
            (&input.student_id, &input.semester_id),
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(RegistrarError::Conflict(DUPLICATE_ENROLLMENT.to_string()));
    }

    let enrollment_id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO enrollments(id, student_id, section_id, semester_id, strand_id, grade_level, status, remarks, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &enrollment_id,
            &input.student_id,
            &input.section_id,
            &input.semester_id,
            &section.strand_id,
            section.grade_level,
            EnrollmentStatus::Pending.as_str(),
            input.remarks.as_deref(),
            &now,
        ),
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
            RegistrarError::Conflict(DUPLICATE_ENROLLMENT.to_string())
        }
        other => RegistrarError::db("db_insert_failed", other),
    })?;
    let actor_id = input.actor_id.as_deref();
    audit::created(&tx, actor_id, Model::Enrollment, &enrollment_id)?;
    for sid in &subject_ids {
        let grade_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO grades(id, enrollment_id, subject_id, is_locked, updated_at) VALUES(?, ?, ?, 0, ?)",
            (&grade_id, &enrollment_id, sid, &now),
        )
        .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
        audit::created(&tx, actor_id, Model::Grade, &grade_id)?;
    }
    log_status(&tx, &enrollment_id, None, EnrollmentStatus::Pending, actor_id)?;
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;

    tracing::info!(
        enrollment_id = %enrollment_id,
        student_id = %input.student_id,
        subjects = subject_ids.len(),
        "enrollment created"
    );
    Ok(enrollment_id)
}

fn log_status(
    conn: &Connection,
    enrollment_id: &str,
    from: Option<EnrollmentStatus>,
    to: EnrollmentStatus,
    actor_id: Option<&str>,
) -> Result<(), RegistrarError> {
    conn.execute(
        "INSERT INTO enrollment_status_log(id, enrollment_id, from_status, to_status, changed_by, changed_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            enrollment_id,
            from.map(|s| s.as_str()),
            to.as_str(),
            actor_id,
            db::now_ts(),
        ),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    Ok(())
}

pub fn parse_stored_status(raw: &str) -> Result<EnrollmentStatus, RegistrarError> {
    EnrollmentStatus::parse(raw).ok_or_else(|| {
        RegistrarError::Conflict(format!("stored enrollment status is not recognized: {raw}"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: EnrollmentStatus,
    pub to: EnrollmentStatus,
    pub changed: bool,
}

/// Moves an enrollment forward. Re-applying the current status is a no-op.
pub fn transition_status(
    conn: &Connection,
    enrollment_id: &str,
    target: EnrollmentStatus,
    actor_id: Option<&str>,
) -> Result<Transition, RegistrarError> {
    if target == EnrollmentStatus::Pending {
        return Err(RegistrarError::field(
            "status",
            "The status must be one of: enrolled, dropped, transferred.",
        ));
    }
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM enrollments WHERE id = ?",
            [enrollment_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Err(RegistrarError::not_found("enrollment"));
    };
    let from = parse_stored_status(&current)?;
    if from == target {
        return Ok(Transition {
            from,
            to: target,
            changed: false,
        });
    }
    if !from.can_transition_to(target) {
        return Err(RegistrarError::InvalidTransition(format!(
            "cannot change enrollment status from {} to {}",
            from.as_str(),
            target.as_str()
        )));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    let before = audit::snapshot(&tx, Model::Enrollment, enrollment_id)?
        .ok_or_else(|| RegistrarError::not_found("enrollment"))?;
    let updated = if target == EnrollmentStatus::Enrolled {
        tx.execute(
            "UPDATE enrollments SET status = ?, enrolled_at = COALESCE(enrolled_at, ?) WHERE id = ?",
            (target.as_str(), db::now_ts(), enrollment_id),
        )
    } else {
        tx.execute(
            "UPDATE enrollments SET status = ? WHERE id = ?",
            (target.as_str(), enrollment_id),
        )
    };
    updated.map_err(|e| RegistrarError::db("db_update_failed", e))?;
    audit::updated(&tx, actor_id, Model::Enrollment, enrollment_id, &before)?;
    log_status(&tx, enrollment_id, Some(from), target, actor_id)?;
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;

    tracing::info!(
        enrollment_id = %enrollment_id,
        from = from.as_str(),
        to = target.as_str(),
        "enrollment status changed"
    );
    Ok(Transition {
        from,
        to: target,
        changed: true,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSubject {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub subject_type: String,
    pub hours: i64,
    pub prerequisite_id: Option<String>,
    pub sort_order: i64,
}

/// Active subjects mapped to the strand for this grade level and semester number.
pub fn subject_load(
    conn: &Connection,
    strand_id: &str,
    grade_level: i64,
    semester_id: &str,
) -> Result<Vec<LoadSubject>, RegistrarError> {
    let ctx = calendar::semester_context(conn, semester_id)?;
    let mut stmt = conn.prepare(
        "SELECT s.id, s.code, s.name, s.type, s.hours, s.prerequisite_id, ss.sort_order
         FROM strand_subject ss
         JOIN subjects s ON s.id = ss.subject_id
         WHERE ss.strand_id = ? AND ss.grade_level = ? AND ss.semester = ? AND s.is_active = 1
         ORDER BY ss.sort_order, s.code",
    )?;
    let rows = stmt
        .query_map((strand_id, grade_level, ctx.number), |r| {
            Ok(LoadSubject {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
                subject_type: r.get(3)?,
                hours: r.get(4)?,
                prerequisite_id: r.get(5)?,
                sort_order: r.get(6)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteIssue {
    pub subject_id: String,
    pub subject_name: String,
    pub prerequisite_id: String,
    pub prerequisite: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteCheck {
    pub has_issues: bool,
    pub issues: Vec<PrerequisiteIssue>,
}

/// Advisory only: unmet prerequisites are reported, never enforced.
pub fn check_prerequisites(
    conn: &Connection,
    student_id: &str,
    subject_ids: &[String],
) -> Result<PrerequisiteCheck, RegistrarError> {
    let mut subj_stmt = conn.prepare(
        "SELECT s.name, p.id, p.name
         FROM subjects s JOIN subjects p ON p.id = s.prerequisite_id
         WHERE s.id = ?",
    )?;
    let mut passed_stmt = conn.prepare(
        "SELECT 1 FROM grades g JOIN enrollments e ON e.id = g.enrollment_id
         WHERE e.student_id = ? AND g.subject_id = ? AND g.remarks = ?
         LIMIT 1",
    )?;

    let mut issues = Vec::new();
    for subject_id in dedupe(subject_ids) {
        let row = subj_stmt
            .query_row([&subject_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })
            .optional()?;
        let Some((subject_name, prereq_id, prereq_name)) = row else {
            continue;
        };
        let passed: Option<i64> = passed_stmt
            .query_row(
                (student_id, &prereq_id, GradeRemarks::Passed.as_str()),
                |r| r.get(0),
            )
            .optional()?;
        if passed.is_none() {
            issues.push(PrerequisiteIssue {
                message: format!("Prerequisite '{}' not yet passed.", prereq_name),
                subject_id,
                subject_name,
                prerequisite_id: prereq_id,
                prerequisite: prereq_name,
            });
        }
    }
    Ok(PrerequisiteCheck {
        has_issues: !issues.is_empty(),
        issues,
    })
}

pub fn available_sections(
    conn: &Connection,
    strand_id: &str,
    grade_level: i64,
    semester_id: &str,
) -> Result<Vec<Value>, RegistrarError> {
    let mut stmt = conn.prepare(
        "SELECT sec.id, sec.name, sec.grade_level, sec.max_capacity, u.name,
                (SELECT COUNT(*) FROM enrollments e WHERE e.section_id = sec.id AND e.status = 'enrolled')
         FROM sections sec LEFT JOIN users u ON u.id = sec.adviser_id
         WHERE sec.strand_id = ? AND sec.grade_level = ? AND sec.semester_id = ?
         ORDER BY sec.name",
    )?;
    let rows = stmt
        .query_map((strand_id, grade_level, semester_id), |r| {
            let max: i64 = r.get(3)?;
            let enrolled: i64 = r.get(5)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "gradeLevel": r.get::<_, i64>(2)?,
                "maxCapacity": max,
                "adviser": r.get::<_, Option<String>>(4)?,
                "enrolledCount": enrolled,
                "isFull": enrolled >= max,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn get_enrollment(conn: &Connection, enrollment_id: &str) -> Result<Value, RegistrarError> {
    let head = conn
        .query_row(
            "SELECT e.id, e.status, e.grade_level, e.enrolled_at, e.created_at, e.remarks,
                    st.id, st.lrn, st.last_name, st.first_name, st.middle_name, st.suffix,
                    sec.id, sec.name, str.id, str.code, str.name, e.semester_id
             FROM enrollments e
             JOIN students st ON st.id = e.student_id
             JOIN sections sec ON sec.id = e.section_id
             LEFT JOIN strands str ON str.id = e.strand_id
             WHERE e.id = ?",
            [enrollment_id],
            |r| {
                let last: String = r.get(8)?;
                let first: String = r.get(9)?;
                let middle: Option<String> = r.get(10)?;
                let suffix: Option<String> = r.get(11)?;
                Ok((
                    json!({
                        "id": r.get::<_, String>(0)?,
                        "status": r.get::<_, String>(1)?,
                        "gradeLevel": r.get::<_, i64>(2)?,
                        "enrolledAt": r.get::<_, Option<String>>(3)?,
                        "createdAt": r.get::<_, String>(4)?,
                        "remarks": r.get::<_, Option<String>>(5)?,
                        "student": {
                            "id": r.get::<_, String>(6)?,
                            "lrn": r.get::<_, String>(7)?,
                            "fullName": crate::students::full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                        },
                        "section": { "id": r.get::<_, String>(12)?, "name": r.get::<_, String>(13)? },
                        "strand": {
                            "id": r.get::<_, Option<String>>(14)?,
                            "code": r.get::<_, Option<String>>(15)?,
                            "name": r.get::<_, Option<String>>(16)?,
                        },
                    }),
                    r.get::<_, String>(17)?,
                ))
            },
        )
        .optional()?;
    let Some((mut out, semester_id)) = head else {
        return Err(RegistrarError::not_found("enrollment"));
    };
    out["semester"] = json!(calendar::semester_context(conn, &semester_id)?);

    let mut stmt = conn.prepare(
        "SELECT g.id, s.id, s.code, s.name, g.midterm, g.finals, g.final_grade, g.remarks, g.is_locked
         FROM grades g JOIN subjects s ON s.id = g.subject_id
         WHERE g.enrollment_id = ?
         ORDER BY s.code",
    )?;
    let subjects = stmt
        .query_map([enrollment_id], |r| {
            Ok(json!({
                "gradeId": r.get::<_, String>(0)?,
                "subjectId": r.get::<_, String>(1)?,
                "code": r.get::<_, String>(2)?,
                "name": r.get::<_, String>(3)?,
                "midterm": r.get::<_, Option<f64>>(4)?,
                "finals": r.get::<_, Option<f64>>(5)?,
                "finalGrade": r.get::<_, Option<f64>>(6)?,
                "remarks": r.get::<_, Option<String>>(7)?,
                "isLocked": r.get::<_, i64>(8)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    out["subjects"] = json!(subjects);

    let mut log_stmt = conn.prepare(
        "SELECT from_status, to_status, changed_by, changed_at
         FROM enrollment_status_log WHERE enrollment_id = ?
         ORDER BY changed_at, rowid",
    )?;
    let history = log_stmt
        .query_map([enrollment_id], |r| {
            Ok(json!({
                "from": r.get::<_, Option<String>>(0)?,
                "to": r.get::<_, String>(1)?,
                "changedBy": r.get::<_, Option<String>>(2)?,
                "changedAt": r.get::<_, String>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    out["statusHistory"] = json!(history);
    Ok(out)
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentFilters {
    pub search: Option<String>,
    pub status: Option<EnrollmentStatus>,
    pub semester_id: Option<String>,
}

pub fn list_enrollments(
    conn: &Connection,
    f: &EnrollmentFilters,
    page: Page,
) -> Result<(Vec<Value>, i64), RegistrarError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(s) = f.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(st.lrn LIKE ? OR st.last_name LIKE ? OR st.first_name LIKE ?)");
        let like = format!("%{s}%");
        for _ in 0..3 {
            binds.push(SqlValue::Text(like.clone()));
        }
    }
    if let Some(status) = f.status {
        clauses.push("e.status = ?");
        binds.push(SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(sem) = &f.semester_id {
        clauses.push("e.semester_id = ?");
        binds.push(SqlValue::Text(sem.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM enrollments e JOIN students st ON st.id = e.student_id {where_sql}"
        ),
        params_from_iter(binds.iter()),
        |r| r.get(0),
    )?;

    let mut page_binds = binds.clone();
    page_binds.push(SqlValue::Integer(page.per_page));
    page_binds.push(SqlValue::Integer(page.offset()));
    let sql = format!(
        "SELECT e.id, e.status, e.grade_level, e.created_at, st.id, st.lrn, st.last_name, st.first_name,
                st.middle_name, st.suffix, sec.name, str.code
         FROM enrollments e
         JOIN students st ON st.id = e.student_id
         JOIN sections sec ON sec.id = e.section_id
         LEFT JOIN strands str ON str.id = e.strand_id
         {where_sql}
         ORDER BY e.created_at DESC, e.id
         LIMIT ? OFFSET ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(page_binds.iter()), |r| {
            let last: String = r.get(6)?;
            let first: String = r.get(7)?;
            let middle: Option<String> = r.get(8)?;
            let suffix: Option<String> = r.get(9)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "status": r.get::<_, String>(1)?,
                "gradeLevel": r.get::<_, i64>(2)?,
                "gradeLevelLabel": grade_level_label(r.get::<_, i64>(2)?),
                "createdAt": r.get::<_, String>(3)?,
                "studentId": r.get::<_, String>(4)?,
                "lrn": r.get::<_, String>(5)?,
                "studentName": crate::students::full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                "section": r.get::<_, String>(10)?,
                "strand": r.get::<_, Option<String>>(11)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok((rows, total))
}

/// Readiness flags for the enrollment wizard.
pub fn setup_checklist(conn: &Connection) -> Result<Value, RegistrarError> {
    let active = calendar::active_term(conn)?;
    let count = |sql: &str| -> Result<i64, RegistrarError> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let sections_in_active: i64 = match &active.semester_id {
        Some(sem) => conn.query_row(
            "SELECT COUNT(*) FROM sections WHERE semester_id = ?",
            [sem],
            |r| r.get(0),
        )?,
        None => 0,
    };
    let checks = json!({
        "activeSchoolYear": active.school_year_id.is_some(),
        "activeSemester": active.semester_id.is_some(),
        "tracks": count("SELECT COUNT(*) FROM tracks WHERE is_active = 1")? > 0,
        "strands": count("SELECT COUNT(*) FROM strands WHERE is_active = 1")? > 0,
        "subjects": count("SELECT COUNT(*) FROM subjects WHERE is_active = 1")? > 0,
        "subjectMappings": count("SELECT COUNT(*) FROM strand_subject")? > 0,
        "sections": sections_in_active > 0,
        "students": count("SELECT COUNT(*) FROM students")? > 0,
    });
    let ready = checks
        .as_object()
        .map(|m| m.values().all(|v| v.as_bool() == Some(true)))
        .unwrap_or(false);
    Ok(json!({ "checks": checks, "ready": ready, "enrollmentOpen": active.enrollment_open }))
}
