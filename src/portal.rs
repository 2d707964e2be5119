//! Self-service views: a student's own records and a teacher's advisory classes.
//! Every lookup is keyed by the requesting account, never by a client-supplied id.

use crate::calendar;
use crate::domain::{semester_label, EnrollmentStatus, GradeRemarks, SubjectType};
use crate::error::RegistrarError;
use crate::sections::{self, SectionFilters};
use crate::students::{self, full_name};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

pub fn my_profile(conn: &Connection, account_id: &str) -> Result<Value, RegistrarError> {
    let student_id = students::student_for_account(conn, account_id)?;
    students::get_student(conn, &student_id)
}

/// Subjects of the enrolled enrollment in the active semester; empty when there is none.
pub fn my_subjects(conn: &Connection, account_id: &str) -> Result<Value, RegistrarError> {
    let student_id = students::student_for_account(conn, account_id)?;
    let term = calendar::active_term(conn)?;
    let Some(semester_id) = term.semester_id.clone() else {
        return Ok(json!({ "studentId": student_id, "semester": null, "subjects": [] }));
    };
    let enrollment_id: Option<String> = conn
        .query_row(
            "SELECT id FROM enrollments WHERE student_id = ? AND semester_id = ? AND status = ?",
            (&student_id, &semester_id, EnrollmentStatus::Enrolled.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    let subjects = match enrollment_id {
        None => Vec::new(),
        Some(id) => {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.code, s.name, s.type, s.hours
                 FROM grades g JOIN subjects s ON s.id = g.subject_id
                 WHERE g.enrollment_id = ?
                 ORDER BY s.code",
            )?;
            let rows = stmt
                .query_map([&id], |r| {
                    let raw_type: String = r.get(3)?;
                    Ok(json!({
                        "id": r.get::<_, String>(0)?,
                        "code": r.get::<_, String>(1)?,
                        "name": r.get::<_, String>(2)?,
                        "type": SubjectType::parse(&raw_type).map(|t| t.label().to_string()).unwrap_or(raw_type),
                        "hours": r.get::<_, i64>(4)?,
                    }))
                })
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
            rows
        }
    };
    Ok(json!({
        "studentId": student_id,
        "semester": {
            "id": semester_id,
            "label": term.semester_label,
            "schoolYear": term.school_year_name,
        },
        "subjects": subjects,
    }))
}

/// Every enrollment with its grades, newest first.
pub fn my_grades(conn: &Connection, account_id: &str) -> Result<Value, RegistrarError> {
    let student_id = students::student_for_account(conn, account_id)?;
    let mut stmt = conn.prepare(
        "SELECT e.id, e.status, sem.number, sy.name, sec.name, str.name
         FROM enrollments e
         JOIN semesters sem ON sem.id = e.semester_id
         JOIN school_years sy ON sy.id = sem.school_year_id
         JOIN sections sec ON sec.id = e.section_id
         LEFT JOIN strands str ON str.id = e.strand_id
         WHERE e.student_id = ?
         ORDER BY e.created_at DESC, e.id",
    )?;
    let enrollments = stmt
        .query_map([&student_id], |r| {
            let status: String = r.get(1)?;
            Ok((
                r.get::<_, String>(0)?,
                json!({
                    "id": r.get::<_, String>(0)?,
                    "semester": format!("{} {}", semester_label(r.get(2)?), r.get::<_, String>(3)?),
                    "section": r.get::<_, String>(4)?,
                    "strand": r.get::<_, Option<String>>(5)?,
                    "status": EnrollmentStatus::parse(&status).map(|s| s.label().to_string()).unwrap_or(status),
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut grade_stmt = conn.prepare(
        "SELECT s.code, s.name, g.midterm, g.finals, g.final_grade, g.remarks
         FROM grades g JOIN subjects s ON s.id = g.subject_id
         WHERE g.enrollment_id = ?
         ORDER BY s.code",
    )?;
    let mut out = Vec::with_capacity(enrollments.len());
    for (id, mut e) in enrollments {
        let grades = grade_stmt
            .query_map([&id], |r| {
                let remarks: Option<String> = r.get(5)?;
                Ok(json!({
                    "subjectCode": r.get::<_, String>(0)?,
                    "subjectName": r.get::<_, String>(1)?,
                    "midterm": r.get::<_, Option<f64>>(2)?,
                    "finals": r.get::<_, Option<f64>>(3)?,
                    "finalGrade": r.get::<_, Option<f64>>(4)?,
                    "remarks": remarks.as_deref().and_then(GradeRemarks::parse).map(|g| g.label()),
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        e["grades"] = json!(grades);
        out.push(e);
    }
    Ok(json!({ "studentId": student_id, "enrollments": out }))
}

/// Sections the teacher advises in the active semester.
pub fn my_sections(conn: &Connection, account_id: &str) -> Result<Value, RegistrarError> {
    let Some(semester_id) = calendar::active_semester_id(conn)? else {
        return Ok(json!({ "sections": [] }));
    };
    let filters = SectionFilters {
        semester_id: Some(semester_id),
        adviser_id: Some(account_id.to_string()),
        ..SectionFilters::default()
    };
    Ok(json!({ "sections": sections::list_sections(conn, &filters)? }))
}

/// Enrolled students across the teacher's advised sections in the active semester.
pub fn my_students(conn: &Connection, account_id: &str) -> Result<Value, RegistrarError> {
    let Some(semester_id) = calendar::active_semester_id(conn)? else {
        return Ok(json!({ "enrollments": [] }));
    };
    let mut stmt = conn.prepare(
        "SELECT e.id, sec.id, sec.name, str.code, st.id, st.lrn, st.last_name, st.first_name,
            st.middle_name, st.suffix, st.gender
         FROM enrollments e
         JOIN sections sec ON sec.id = e.section_id
         JOIN students st ON st.id = e.student_id
         LEFT JOIN strands str ON str.id = sec.strand_id
         WHERE sec.adviser_id = ? AND sec.semester_id = ? AND e.status = ?
         ORDER BY sec.name, st.last_name, st.first_name",
    )?;
    let rows = stmt
        .query_map(
            (account_id, &semester_id, EnrollmentStatus::Enrolled.as_str()),
            |r| {
                let last: String = r.get(6)?;
                let first: String = r.get(7)?;
                let middle: Option<String> = r.get(8)?;
                let suffix: Option<String> = r.get(9)?;
                Ok(json!({
                    "enrollmentId": r.get::<_, String>(0)?,
                    "sectionId": r.get::<_, String>(1)?,
                    "section": r.get::<_, String>(2)?,
                    "strand": r.get::<_, Option<String>>(3)?,
                    "student": {
                        "id": r.get::<_, String>(4)?,
                        "lrn": r.get::<_, String>(5)?,
                        "fullName": full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                        "gender": r.get::<_, String>(10)?,
                    },
                }))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "enrollments": rows }))
}
