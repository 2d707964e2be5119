use crate::audit::{self, Model};
use crate::db;
use crate::domain::{Gender, Page, StudentStatus};
use crate::error::{RegistrarError, Validator};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

pub const LRN_TAKEN: &str = "LRN already exists in the database.";

/// "Last, First Middle Suffix" with empty parts dropped.
pub fn full_name(last: &str, first: &str, middle: Option<&str>, suffix: Option<&str>) -> String {
    let mut out = format!("{}, {}", last.trim(), first.trim());
    for part in [middle, suffix].into_iter().flatten() {
        let part = part.trim();
        if !part.is_empty() {
            out.push(' ');
            out.push_str(part);
        }
    }
    out
}

/// Accepts ISO dates and US-style month/day/year.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .ok()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentInput {
    pub lrn: Option<String>,
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub suffix: Option<String>,
    pub birthdate: Option<String>,
    pub gender: Option<String>,
    pub religion: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_contact: Option<String>,
    pub guardian_relationship: Option<String>,
    pub previous_school: Option<String>,
    pub learning_modality: Option<String>,
    pub status: Option<String>,
}

pub(crate) fn trimmed(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn max_len(v: &mut Validator, field: &str, value: Option<&str>, max: usize) {
    if let Some(s) = value {
        if s.chars().count() > max {
            v.add(field, format!("The {} may not be greater than {} characters.", field.replace('_', " "), max));
        }
    }
}

fn required(v: &mut Validator, field: &str, value: Option<&str>) -> bool {
    if value.is_none() {
        v.add(field, format!("The {} field is required.", field.replace('_', " ")));
        return false;
    }
    true
}

/// A validated student ready to persist.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub lrn: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub suffix: Option<String>,
    pub birthdate: NaiveDate,
    pub gender: Gender,
    pub religion: Option<String>,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_contact: Option<String>,
    pub guardian_relationship: Option<String>,
    pub previous_school: Option<String>,
    pub learning_modality: Option<String>,
    pub status: StudentStatus,
}

/// Field rules shared by intake and spreadsheet import. No database access.
pub fn validate_input(input: &StudentInput, today: Option<NaiveDate>) -> Result<NewStudent, Validator> {
    let mut v = Validator::new();

    let lrn = trimmed(&input.lrn);
    if required(&mut v, "lrn", lrn) {
        let lrn = lrn.unwrap_or_default();
        if lrn.chars().count() != 12 {
            v.add("lrn", "The lrn must be 12 characters.");
        } else if !lrn.chars().all(|c| c.is_ascii_digit()) {
            v.add("lrn", "The lrn must contain digits only.");
        }
    }
    let last_name = trimmed(&input.last_name);
    let first_name = trimmed(&input.first_name);
    required(&mut v, "last_name", last_name);
    required(&mut v, "first_name", first_name);
    max_len(&mut v, "last_name", last_name, 100);
    max_len(&mut v, "first_name", first_name, 100);
    max_len(&mut v, "middle_name", trimmed(&input.middle_name), 100);
    max_len(&mut v, "suffix", trimmed(&input.suffix), 20);
    max_len(&mut v, "contact_number", trimmed(&input.contact_number), 20);
    max_len(&mut v, "guardian_name", trimmed(&input.guardian_name), 100);
    max_len(&mut v, "guardian_contact", trimmed(&input.guardian_contact), 20);
    max_len(&mut v, "guardian_relationship", trimmed(&input.guardian_relationship), 50);
    max_len(&mut v, "father_name", trimmed(&input.father_name), 100);
    max_len(&mut v, "mother_name", trimmed(&input.mother_name), 100);
    max_len(&mut v, "religion", trimmed(&input.religion), 100);
    max_len(&mut v, "previous_school", trimmed(&input.previous_school), 255);
    max_len(&mut v, "address", trimmed(&input.address), 500);

    let mut birthdate = None;
    let raw_birthdate = trimmed(&input.birthdate);
    if required(&mut v, "birthdate", raw_birthdate) {
        match raw_birthdate.and_then(parse_date) {
            Some(d) => {
                if let Some(today) = today {
                    if d >= today {
                        v.add("birthdate", "The birthdate must be a date before today.");
                    }
                }
                birthdate = Some(d);
            }
            None => v.add("birthdate", "The birthdate is not a valid date."),
        }
    }

    let raw_gender = trimmed(&input.gender);
    let mut gender = None;
    if required(&mut v, "gender", raw_gender) {
        gender = raw_gender.and_then(Gender::parse);
        if gender.is_none() {
            v.add("gender", "The selected gender is invalid.");
        }
    }

    let status = match trimmed(&input.status) {
        None => Some(StudentStatus::Active),
        Some(s) => StudentStatus::parse(s),
    };
    if status.is_none() {
        v.add("status", "The selected status is invalid.");
    }

    let (Some(lrn), Some(last_name), Some(first_name), Some(birthdate), Some(gender), Some(status)) =
        (lrn, last_name, first_name, birthdate, gender, status)
    else {
        return Err(v);
    };
    if !v.is_empty() {
        return Err(v);
    }
    let owned = |o: &Option<String>| trimmed(o).map(|s| s.to_string());
    Ok(NewStudent {
        lrn: lrn.to_string(),
        last_name: last_name.to_string(),
        first_name: first_name.to_string(),
        middle_name: owned(&input.middle_name),
        suffix: owned(&input.suffix),
        birthdate,
        gender,
        religion: owned(&input.religion),
        address: owned(&input.address),
        contact_number: owned(&input.contact_number),
        father_name: owned(&input.father_name),
        mother_name: owned(&input.mother_name),
        guardian_name: owned(&input.guardian_name),
        guardian_contact: owned(&input.guardian_contact),
        guardian_relationship: owned(&input.guardian_relationship),
        previous_school: owned(&input.previous_school),
        learning_modality: owned(&input.learning_modality),
        status,
    })
}

pub fn lrn_taken(conn: &Connection, lrn: &str, exclude_id: Option<&str>) -> Result<bool, RegistrarError> {
    let v: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE lrn = ? AND id <> ?",
            (lrn, exclude_id.unwrap_or("")),
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.is_some())
}

pub fn insert_student(conn: &Connection, s: &NewStudent, actor_id: Option<&str>) -> Result<String, RegistrarError> {
    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO students(id, lrn, last_name, first_name, middle_name, suffix, birthdate, gender,
            religion, address, contact_number, father_name, mother_name, guardian_name, guardian_contact,
            guardian_relationship, previous_school, learning_modality, status, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params_from_iter([
            SqlValue::Text(id.clone()),
            SqlValue::Text(s.lrn.clone()),
            SqlValue::Text(s.last_name.clone()),
            SqlValue::Text(s.first_name.clone()),
            opt_text(&s.middle_name),
            opt_text(&s.suffix),
            SqlValue::Text(s.birthdate.format("%Y-%m-%d").to_string()),
            SqlValue::Text(s.gender.as_str().to_string()),
            opt_text(&s.religion),
            opt_text(&s.address),
            opt_text(&s.contact_number),
            opt_text(&s.father_name),
            opt_text(&s.mother_name),
            opt_text(&s.guardian_name),
            opt_text(&s.guardian_contact),
            opt_text(&s.guardian_relationship),
            opt_text(&s.previous_school),
            opt_text(&s.learning_modality),
            SqlValue::Text(s.status.as_str().to_string()),
            SqlValue::Text(now.clone()),
            SqlValue::Text(now),
        ]),
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation => {
            RegistrarError::Conflict(LRN_TAKEN.to_string())
        }
        other => RegistrarError::db("db_insert_failed", other),
    })?;
    audit::created(conn, actor_id, Model::Student, &id)?;
    Ok(id)
}

fn opt_text(v: &Option<String>) -> SqlValue {
    match v {
        Some(s) => SqlValue::Text(s.clone()),
        None => SqlValue::Null,
    }
}

pub fn create_student(
    conn: &Connection,
    input: &StudentInput,
    today: NaiveDate,
    actor_id: Option<&str>,
) -> Result<String, RegistrarError> {
    let student = validate_input(input, Some(today))
        .map_err(|v| RegistrarError::Validation(v.into_fields()))?;
    if lrn_taken(conn, &student.lrn, None)? {
        return Err(RegistrarError::field("lrn", LRN_TAKEN));
    }
    let id = insert_student(conn, &student, actor_id)?;
    tracing::info!(student_id = %id, "student created");
    Ok(id)
}

pub fn update_student(
    conn: &Connection,
    student_id: &str,
    input: &StudentInput,
    today: NaiveDate,
    actor_id: Option<&str>,
) -> Result<(), RegistrarError> {
    let student = validate_input(input, Some(today))
        .map_err(|v| RegistrarError::Validation(v.into_fields()))?;
    if lrn_taken(conn, &student.lrn, Some(student_id))? {
        return Err(RegistrarError::field("lrn", LRN_TAKEN));
    }
    let Some(before) = audit::snapshot(conn, Model::Student, student_id)? else {
        return Err(RegistrarError::not_found("student"));
    };
    conn.execute(
        "UPDATE students SET lrn = ?, last_name = ?, first_name = ?, middle_name = ?, suffix = ?,
            birthdate = ?, gender = ?, religion = ?, address = ?, contact_number = ?, father_name = ?,
            mother_name = ?, guardian_name = ?, guardian_contact = ?, guardian_relationship = ?,
            previous_school = ?, learning_modality = ?, status = ?, updated_at = ?
         WHERE id = ?",
        params_from_iter([
            SqlValue::Text(student.lrn.clone()),
            SqlValue::Text(student.last_name.clone()),
            SqlValue::Text(student.first_name.clone()),
            opt_text(&student.middle_name),
            opt_text(&student.suffix),
            SqlValue::Text(student.birthdate.format("%Y-%m-%d").to_string()),
            SqlValue::Text(student.gender.as_str().to_string()),
            opt_text(&student.religion),
            opt_text(&student.address),
            opt_text(&student.contact_number),
            opt_text(&student.father_name),
            opt_text(&student.mother_name),
            opt_text(&student.guardian_name),
            opt_text(&student.guardian_contact),
            opt_text(&student.guardian_relationship),
            opt_text(&student.previous_school),
            opt_text(&student.learning_modality),
            SqlValue::Text(student.status.as_str().to_string()),
            SqlValue::Text(db::now_ts()),
            SqlValue::Text(student_id.to_string()),
        ]),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    audit::updated(conn, actor_id, Model::Student, student_id, &before)
}

/// Students are never removed; deletion marks them dropped.
pub fn drop_student(conn: &Connection, student_id: &str, actor_id: Option<&str>) -> Result<(), RegistrarError> {
    let Some(before) = audit::snapshot(conn, Model::Student, student_id)? else {
        return Err(RegistrarError::not_found("student"));
    };
    conn.execute(
        "UPDATE students SET status = ?, updated_at = ? WHERE id = ?",
        (StudentStatus::Dropped.as_str(), db::now_ts(), student_id),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    audit::updated(conn, actor_id, Model::Student, student_id, &before)?;
    tracing::info!(student_id = %student_id, "student marked dropped");
    Ok(())
}

/// Points a student record at the `student` account allowed to view it, or clears the link.
pub fn link_account(
    conn: &Connection,
    student_id: &str,
    account_id: Option<&str>,
    actor_id: Option<&str>,
) -> Result<(), RegistrarError> {
    let Some(before) = audit::snapshot(conn, Model::Student, student_id)? else {
        return Err(RegistrarError::not_found("student"));
    };
    if let Some(account) = account_id {
        let role: Option<String> = conn
            .query_row("SELECT role FROM users WHERE id = ?", [account], |r| r.get(0))
            .optional()?;
        if role.as_deref() != Some("student") {
            return Err(RegistrarError::field("account_id", "The account must be a student account."));
        }
        let other: Option<String> = conn
            .query_row(
                "SELECT id FROM students WHERE user_id = ? AND id <> ?",
                (account, student_id),
                |r| r.get(0),
            )
            .optional()?;
        if other.is_some() {
            return Err(RegistrarError::field(
                "account_id",
                "The account is already linked to another student.",
            ));
        }
    }
    conn.execute(
        "UPDATE students SET user_id = ?, updated_at = ? WHERE id = ?",
        (account_id, db::now_ts(), student_id),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    audit::updated(conn, actor_id, Model::Student, student_id, &before)
}

/// The student record linked to an account.
pub fn student_for_account(conn: &Connection, account_id: &str) -> Result<String, RegistrarError> {
    conn.query_row("SELECT id FROM students WHERE user_id = ?", [account_id], |r| r.get(0))
        .optional()?
        .ok_or_else(|| RegistrarError::NotFound("no student record is linked to this account".to_string()))
}

const STUDENT_COLUMNS: &str = "id, lrn, last_name, first_name, middle_name, suffix, birthdate, gender,
    religion, address, contact_number, father_name, mother_name, guardian_name, guardian_contact,
    guardian_relationship, previous_school, learning_modality, status, created_at, user_id";

fn student_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let last: String = r.get(2)?;
    let first: String = r.get(3)?;
    let middle: Option<String> = r.get(4)?;
    let suffix: Option<String> = r.get(5)?;
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "lrn": r.get::<_, String>(1)?,
        "fullName": full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
        "lastName": last,
        "firstName": first,
        "middleName": middle,
        "suffix": suffix,
        "birthdate": r.get::<_, String>(6)?,
        "gender": r.get::<_, String>(7)?,
        "religion": r.get::<_, Option<String>>(8)?,
        "address": r.get::<_, Option<String>>(9)?,
        "contactNumber": r.get::<_, Option<String>>(10)?,
        "fatherName": r.get::<_, Option<String>>(11)?,
        "motherName": r.get::<_, Option<String>>(12)?,
        "guardianName": r.get::<_, Option<String>>(13)?,
        "guardianContact": r.get::<_, Option<String>>(14)?,
        "guardianRelationship": r.get::<_, Option<String>>(15)?,
        "previousSchool": r.get::<_, Option<String>>(16)?,
        "learningModality": r.get::<_, Option<String>>(17)?,
        "status": r.get::<_, String>(18)?,
        "createdAt": r.get::<_, String>(19)?,
        "accountId": r.get::<_, Option<String>>(20)?,
    }))
}

/// Student with enrollment history and grades, newest enrollment last.
pub fn get_student(conn: &Connection, student_id: &str) -> Result<Value, RegistrarError> {
    let mut student = conn
        .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"),
            [student_id],
            student_json,
        )
        .optional()?
        .ok_or_else(|| RegistrarError::not_found("student"))?;

    let mut stmt = conn.prepare(
        "SELECT e.id, e.status, e.grade_level, sec.name, sem.number, sy.name, str.code
         FROM enrollments e
         JOIN sections sec ON sec.id = e.section_id
         JOIN semesters sem ON sem.id = e.semester_id
         JOIN school_years sy ON sy.id = sem.school_year_id
         LEFT JOIN strands str ON str.id = e.strand_id
         WHERE e.student_id = ?
         ORDER BY e.created_at, e.id",
    )?;
    let enrollments = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                json!({
                    "id": r.get::<_, String>(0)?,
                    "status": r.get::<_, String>(1)?,
                    "gradeLevel": r.get::<_, i64>(2)?,
                    "section": r.get::<_, String>(3)?,
                    "semester": crate::domain::semester_label(r.get::<_, i64>(4)?),
                    "schoolYear": r.get::<_, String>(5)?,
                    "strand": r.get::<_, Option<String>>(6)?,
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut grade_stmt = conn.prepare(
        "SELECT s.code, s.name, g.midterm, g.finals, g.final_grade, g.remarks, g.is_locked
         FROM grades g JOIN subjects s ON s.id = g.subject_id
         WHERE g.enrollment_id = ? ORDER BY s.code",
    )?;
    let mut history = Vec::with_capacity(enrollments.len());
    for (id, mut e) in enrollments {
        let grades = grade_stmt
            .query_map([&id], |r| {
                Ok(json!({
                    "code": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "midterm": r.get::<_, Option<f64>>(2)?,
                    "finals": r.get::<_, Option<f64>>(3)?,
                    "finalGrade": r.get::<_, Option<f64>>(4)?,
                    "remarks": r.get::<_, Option<String>>(5)?,
                    "isLocked": r.get::<_, i64>(6)? != 0,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        e["grades"] = json!(grades);
        history.push(e);
    }
    student["enrollments"] = json!(history);
    Ok(student)
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilters {
    pub search: Option<String>,
    pub status: Option<StudentStatus>,
    pub strand_id: Option<String>,
}

/// Filter clause shared by the student list and the masterlist report.
pub fn filter_clause(f: &StudentFilters) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<SqlValue> = Vec::new();
    if let Some(s) = f.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(lrn LIKE ? OR last_name LIKE ? OR first_name LIKE ?)");
        let like = format!("%{s}%");
        for _ in 0..3 {
            binds.push(SqlValue::Text(like.clone()));
        }
    }
    if let Some(status) = f.status {
        clauses.push("status = ?");
        binds.push(SqlValue::Text(status.as_str().to_string()));
    }
    if let Some(strand) = &f.strand_id {
        clauses.push(
            "EXISTS(SELECT 1 FROM enrollments e JOIN sections sec ON sec.id = e.section_id
                    WHERE e.student_id = students.id AND sec.strand_id = ?)",
        );
        binds.push(SqlValue::Text(strand.clone()));
    }
    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (sql, binds)
}

pub fn list_students(
    conn: &Connection,
    f: &StudentFilters,
    page: Page,
) -> Result<(Vec<Value>, i64), RegistrarError> {
    let (where_sql, binds) = filter_clause(f);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM students {where_sql}"),
        params_from_iter(binds.iter()),
        |r| r.get(0),
    )?;
    let mut page_binds = binds;
    page_binds.push(SqlValue::Integer(page.per_page));
    page_binds.push(SqlValue::Integer(page.offset()));
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students {where_sql}
         ORDER BY last_name, first_name, id LIMIT ? OFFSET ?"
    ))?;
    let rows = stmt
        .query_map(params_from_iter(page_binds.iter()), student_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok((rows, total))
}

/// All matching students, unpaged, in masterlist order.
pub fn all_students(conn: &Connection, f: &StudentFilters) -> Result<Vec<Value>, RegistrarError> {
    let (where_sql, binds) = filter_clause(f);
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students {where_sql} ORDER BY last_name, first_name, id"
    ))?;
    let rows = stmt
        .query_map(params_from_iter(binds.iter()), student_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

/// Same first and last name (case-insensitive) and the same birthdate.
pub fn duplicate_check(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    birthdate: &str,
    exclude_id: Option<&str>,
) -> Result<Vec<Value>, RegistrarError> {
    let Some(date) = parse_date(birthdate) else {
        return Err(RegistrarError::field("birthdate", "The birthdate is not a valid date."));
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students
         WHERE lower(first_name) = lower(?) AND lower(last_name) = lower(?) AND birthdate = ? AND id <> ?
         ORDER BY last_name, first_name"
    ))?;
    let rows = stmt
        .query_map(
            (
                first_name.trim(),
                last_name.trim(),
                date.format("%Y-%m-%d").to_string(),
                exclude_id.unwrap_or(""),
            ),
            student_json,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}
