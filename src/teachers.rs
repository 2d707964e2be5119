//! Teacher records: the service profile kept per teacher account and its training history.

use crate::db;
use crate::domain::Page;
use crate::error::{RegistrarError, Validator};
use crate::students::{max_len, parse_date, trimmed};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileInput {
    pub employee_id: Option<String>,
    pub position_title: Option<String>,
    pub appointment_status: Option<String>,
    pub sex: Option<String>,
    pub birthdate: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub highest_degree: Option<String>,
    pub degree_course: Option<String>,
    pub degree_major: Option<String>,
    pub school_graduated: Option<String>,
    pub year_graduated: Option<i64>,
    pub prc_license_number: Option<String>,
    pub prc_validity: Option<String>,
    pub eligibility: Option<String>,
    pub specialization: Option<String>,
    pub date_hired: Option<String>,
    pub teaching_hours_per_week: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrainingInput {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub training_type: Option<String>,
    pub sponsor: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub hours: Option<f64>,
}

fn text(v: Option<&str>) -> SqlValue {
    match v {
        Some(s) => SqlValue::Text(s.to_string()),
        None => SqlValue::Null,
    }
}

/// Normalizes an optional date field to `YYYY-MM-DD`, recording an error when unparsable.
fn date_field(v: &mut Validator, field: &str, raw: &Option<String>) -> Option<String> {
    let raw = trimmed(raw)?;
    match parse_date(raw) {
        Some(d) => Some(d.format("%Y-%m-%d").to_string()),
        None => {
            v.add(field, format!("The {} is not a valid date.", field.replace('_', " ")));
            None
        }
    }
}

fn int_range(v: &mut Validator, field: &str, value: Option<i64>, min: i64, max: i64) {
    if let Some(n) = value {
        if !(min..=max).contains(&n) {
            v.add(
                field,
                format!("The {} must be between {} and {}.", field.replace('_', " "), min, max),
            );
        }
    }
}

/// Only teacher accounts carry a profile.
fn ensure_teacher(conn: &Connection, user_id: &str) -> Result<(), RegistrarError> {
    let role: Option<String> = conn
        .query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?;
    match role.as_deref() {
        Some("teacher") => Ok(()),
        _ => Err(RegistrarError::not_found("teacher")),
    }
}

fn ensure_profile_row(conn: &Connection, user_id: &str) -> Result<(), RegistrarError> {
    conn.execute(
        "INSERT OR IGNORE INTO teacher_profiles(user_id, updated_at) VALUES(?, ?)",
        (user_id, db::now_ts()),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    Ok(())
}

const PROFILE_COLUMNS: [&str; 18] = [
    "employee_id",
    "position_title",
    "appointment_status",
    "sex",
    "birthdate",
    "contact_number",
    "address",
    "highest_degree",
    "degree_course",
    "degree_major",
    "school_graduated",
    "year_graduated",
    "prc_license_number",
    "prc_validity",
    "eligibility",
    "specialization",
    "date_hired",
    "teaching_hours_per_week",
];

/// Creates the profile on first save; later saves replace every field.
pub fn update_profile(conn: &Connection, user_id: &str, input: &ProfileInput) -> Result<(), RegistrarError> {
    ensure_teacher(conn, user_id)?;
    let mut v = Validator::new();
    for (field, value, max) in [
        ("employee_id", &input.employee_id, 20),
        ("position_title", &input.position_title, 255),
        ("appointment_status", &input.appointment_status, 255),
        ("sex", &input.sex, 10),
        ("contact_number", &input.contact_number, 255),
        ("address", &input.address, 1000),
        ("highest_degree", &input.highest_degree, 255),
        ("degree_course", &input.degree_course, 255),
        ("degree_major", &input.degree_major, 255),
        ("school_graduated", &input.school_graduated, 255),
        ("prc_license_number", &input.prc_license_number, 20),
        ("eligibility", &input.eligibility, 255),
        ("specialization", &input.specialization, 255),
    ] {
        max_len(&mut v, field, trimmed(value), max);
    }
    let birthdate = date_field(&mut v, "birthdate", &input.birthdate);
    let prc_validity = date_field(&mut v, "prc_validity", &input.prc_validity);
    let date_hired = date_field(&mut v, "date_hired", &input.date_hired);
    int_range(&mut v, "year_graduated", input.year_graduated, 1950, 2099);
    int_range(&mut v, "teaching_hours_per_week", input.teaching_hours_per_week, 0, 60);
    v.finish()?;

    let values = vec![
        text(trimmed(&input.employee_id)),
        text(trimmed(&input.position_title)),
        text(trimmed(&input.appointment_status)),
        text(trimmed(&input.sex)),
        text(birthdate.as_deref()),
        text(trimmed(&input.contact_number)),
        text(trimmed(&input.address)),
        text(trimmed(&input.highest_degree)),
        text(trimmed(&input.degree_course)),
        text(trimmed(&input.degree_major)),
        text(trimmed(&input.school_graduated)),
        input.year_graduated.map(SqlValue::Integer).unwrap_or(SqlValue::Null),
        text(trimmed(&input.prc_license_number)),
        text(prc_validity.as_deref()),
        text(trimmed(&input.eligibility)),
        text(trimmed(&input.specialization)),
        text(date_hired.as_deref()),
        input
            .teaching_hours_per_week
            .map(SqlValue::Integer)
            .unwrap_or(SqlValue::Null),
    ];
    ensure_profile_row(conn, user_id)?;
    let assignments = PROFILE_COLUMNS
        .iter()
        .map(|c| format!("{c} = ?"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut binds = values;
    binds.push(SqlValue::Text(db::now_ts()));
    binds.push(SqlValue::Text(user_id.to_string()));
    conn.execute(
        &format!("UPDATE teacher_profiles SET {assignments}, updated_at = ? WHERE user_id = ?"),
        params_from_iter(binds.iter()),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    tracing::info!(teacher_id = %user_id, "teacher profile saved");
    Ok(())
}

pub fn add_training(conn: &Connection, user_id: &str, input: &TrainingInput) -> Result<String, RegistrarError> {
    ensure_teacher(conn, user_id)?;
    let mut v = Validator::new();
    let title = trimmed(&input.title);
    match title {
        None => v.add("title", "The title field is required."),
        Some(t) => max_len(&mut v, "title", Some(t), 255),
    }
    max_len(&mut v, "type", trimmed(&input.training_type), 255);
    max_len(&mut v, "sponsor", trimmed(&input.sponsor), 255);
    let from = date_field(&mut v, "date_from", &input.date_from);
    let to = date_field(&mut v, "date_to", &input.date_to);
    if let (Some(f), Some(t)) = (&from, &to) {
        // ISO dates compare correctly as strings.
        if t < f {
            v.add("date_to", "The date to must be a date after or equal to date from.");
        }
    }
    if let Some(h) = input.hours {
        if !h.is_finite() || !(0.0..=9999.0).contains(&h) {
            v.add("hours", "The hours must be between 0 and 9999.");
        }
    }
    v.finish()?;

    ensure_profile_row(conn, user_id)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teacher_trainings(id, user_id, title, type, sponsor, date_from, date_to, hours, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            user_id,
            title,
            trimmed(&input.training_type),
            trimmed(&input.sponsor),
            from.as_deref(),
            to.as_deref(),
            input.hours,
            db::now_ts(),
        ),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    Ok(id)
}

pub fn remove_training(conn: &Connection, user_id: &str, training_id: &str) -> Result<(), RegistrarError> {
    let n = conn
        .execute(
            "DELETE FROM teacher_trainings WHERE id = ? AND user_id = ?",
            (training_id, user_id),
        )
        .map_err(|e| RegistrarError::db("db_delete_failed", e))?;
    if n == 0 {
        return Err(RegistrarError::not_found("training"));
    }
    Ok(())
}

/// Teacher accounts, newest first, matching name, email or employee id.
pub fn list_teachers(conn: &Connection, search: Option<&str>, page: Page) -> Result<(Vec<Value>, i64), RegistrarError> {
    let like = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{s}%"));
    let where_sql = "WHERE u.role = 'teacher'
           AND (?1 IS NULL OR u.name LIKE ?1 OR u.email LIKE ?1 OR p.employee_id LIKE ?1)";
    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM users u LEFT JOIN teacher_profiles p ON p.user_id = u.id {where_sql}"
        ),
        [like.as_deref()],
        |r| r.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.name, u.email, u.is_active, p.employee_id, p.position_title, p.specialization,
            (SELECT COUNT(*) FROM teacher_trainings t WHERE t.user_id = u.id)
         FROM users u LEFT JOIN teacher_profiles p ON p.user_id = u.id
         {where_sql}
         ORDER BY u.created_at DESC, u.id
         LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt
        .query_map((like.as_deref(), page.per_page, page.offset()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "isActive": r.get::<_, i64>(3)? != 0,
                "employeeId": r.get::<_, Option<String>>(4)?,
                "positionTitle": r.get::<_, Option<String>>(5)?,
                "specialization": r.get::<_, Option<String>>(6)?,
                "trainingCount": r.get::<_, i64>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok((rows, total))
}

fn profile_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(json!({
        "employeeId": r.get::<_, Option<String>>(0)?,
        "positionTitle": r.get::<_, Option<String>>(1)?,
        "appointmentStatus": r.get::<_, Option<String>>(2)?,
        "sex": r.get::<_, Option<String>>(3)?,
        "birthdate": r.get::<_, Option<String>>(4)?,
        "contactNumber": r.get::<_, Option<String>>(5)?,
        "address": r.get::<_, Option<String>>(6)?,
        "highestDegree": r.get::<_, Option<String>>(7)?,
        "degreeCourse": r.get::<_, Option<String>>(8)?,
        "degreeMajor": r.get::<_, Option<String>>(9)?,
        "schoolGraduated": r.get::<_, Option<String>>(10)?,
        "yearGraduated": r.get::<_, Option<i64>>(11)?,
        "prcLicenseNumber": r.get::<_, Option<String>>(12)?,
        "prcValidity": r.get::<_, Option<String>>(13)?,
        "eligibility": r.get::<_, Option<String>>(14)?,
        "specialization": r.get::<_, Option<String>>(15)?,
        "dateHired": r.get::<_, Option<String>>(16)?,
        "teachingHoursPerWeek": r.get::<_, Option<i64>>(17)?,
    }))
}

/// The account, its profile (null until first saved) and trainings, latest start date first.
pub fn get_teacher(conn: &Connection, user_id: &str) -> Result<Value, RegistrarError> {
    ensure_teacher(conn, user_id)?;
    let teacher = conn.query_row(
        "SELECT id, name, email, is_active FROM users WHERE id = ?",
        [user_id],
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "email": r.get::<_, String>(2)?,
                "isActive": r.get::<_, i64>(3)? != 0,
            }))
        },
    )?;
    let profile = conn
        .query_row(
            &format!(
                "SELECT {} FROM teacher_profiles WHERE user_id = ?",
                PROFILE_COLUMNS.join(", ")
            ),
            [user_id],
            profile_json,
        )
        .optional()?;
    let mut stmt = conn.prepare(
        "SELECT id, title, type, sponsor, date_from, date_to, hours FROM teacher_trainings
         WHERE user_id = ?
         ORDER BY date_from IS NULL, date_from DESC, created_at DESC",
    )?;
    let trainings = stmt
        .query_map([user_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "title": r.get::<_, String>(1)?,
                "type": r.get::<_, Option<String>>(2)?,
                "sponsor": r.get::<_, Option<String>>(3)?,
                "dateFrom": r.get::<_, Option<String>>(4)?,
                "dateTo": r.get::<_, Option<String>>(5)?,
                "hours": r.get::<_, Option<f64>>(6)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({
        "teacher": teacher,
        "profile": profile,
        "trainings": trainings,
    }))
}
