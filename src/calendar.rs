//! School years, semesters, and the active-term singleton.

use crate::db;
use crate::domain::semester_label;
use crate::error::RegistrarError;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTerm {
    pub school_year_id: Option<String>,
    pub school_year_name: Option<String>,
    pub semester_id: Option<String>,
    pub semester_number: Option<i64>,
    pub semester_label: Option<String>,
    pub enrollment_open: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterContext {
    pub semester_id: String,
    pub number: i64,
    pub label: String,
    pub school_year_id: String,
    pub school_year_name: String,
}

pub fn active_term(conn: &Connection) -> Result<ActiveTerm, RegistrarError> {
    let row = conn
        .query_row(
            "SELECT at.school_year_id, sy.name, at.semester_id, sem.number, COALESCE(sem.enrollment_open, 0)
             FROM active_term at
             LEFT JOIN school_years sy ON sy.id = at.school_year_id
             LEFT JOIN semesters sem ON sem.id = at.semester_id
             WHERE at.id = 1",
            [],
            |r| {
                Ok((
                    r.get::<_, Option<String>>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<i64>>(3)?,
                    r.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((sy_id, sy_name, sem_id, sem_no, open)) = row else {
        return Ok(ActiveTerm {
            school_year_id: None,
            school_year_name: None,
            semester_id: None,
            semester_number: None,
            semester_label: None,
            enrollment_open: false,
        });
    };
    Ok(ActiveTerm {
        school_year_id: sy_id,
        school_year_name: sy_name,
        semester_id: sem_id,
        semester_label: sem_no.map(|n| semester_label(n).to_string()),
        semester_number: sem_no,
        enrollment_open: open != 0,
    })
}

pub fn active_semester_id(conn: &Connection) -> Result<Option<String>, RegistrarError> {
    Ok(active_term(conn)?.semester_id)
}

/// `semester_id` if given, else the active semester.
pub fn resolve_semester_id(
    conn: &Connection,
    semester_id: Option<String>,
) -> Result<String, RegistrarError> {
    match semester_id {
        Some(id) => Ok(id),
        None => active_semester_id(conn)?
            .ok_or_else(|| RegistrarError::NotFound("no active semester".to_string())),
    }
}

pub fn semester_context(conn: &Connection, semester_id: &str) -> Result<SemesterContext, RegistrarError> {
    conn.query_row(
        "SELECT sem.id, sem.number, sy.id, sy.name
         FROM semesters sem JOIN school_years sy ON sy.id = sem.school_year_id
         WHERE sem.id = ?",
        [semester_id],
        |r| {
            let number: i64 = r.get(1)?;
            Ok(SemesterContext {
                semester_id: r.get(0)?,
                number,
                label: semester_label(number).to_string(),
                school_year_id: r.get(2)?,
                school_year_name: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| RegistrarError::not_found("semester"))
}

/// Creates the year together with its two semesters. Returns the year id.
pub fn create_school_year(
    conn: &Connection,
    name: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<String, RegistrarError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistrarError::field("name", "The name field is required."));
    }
    let taken: Option<String> = conn
        .query_row("SELECT id FROM school_years WHERE name = ?", [name], |r| {
            r.get(0)
        })
        .optional()?;
    if taken.is_some() {
        return Err(RegistrarError::field("name", "The name has already been taken."));
    }

    let year_id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO school_years(id, name, start_date, end_date, created_at) VALUES(?, ?, ?, ?, ?)",
        (&year_id, name, start_date, end_date, db::now_ts()),
    )
    .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    for number in [1i64, 2] {
        tx.execute(
            "INSERT INTO semesters(id, school_year_id, number, enrollment_open) VALUES(?, ?, ?, 0)",
            (Uuid::new_v4().to_string(), &year_id, number),
        )
        .map_err(|e| RegistrarError::db("db_insert_failed", e))?;
    }
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;
    tracing::info!(school_year = %name, "school year created");
    Ok(year_id)
}

pub fn rename_school_year(
    conn: &Connection,
    year_id: &str,
    name: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<(), RegistrarError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistrarError::field("name", "The name field is required."));
    }
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM school_years WHERE name = ? AND id <> ?",
            (name, year_id),
            |r| r.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(RegistrarError::field("name", "The name has already been taken."));
    }
    let n = conn
        .execute(
            "UPDATE school_years SET name = ?, start_date = ?, end_date = ? WHERE id = ?",
            (name, start_date, end_date, year_id),
        )
        .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    if n == 0 {
        return Err(RegistrarError::not_found("school year"));
    }
    Ok(())
}

/// Points the singleton at the year and its first semester, closing enrollment everywhere.
pub fn activate_school_year(conn: &Connection, year_id: &str) -> Result<ActiveTerm, RegistrarError> {
    let first_semester: Option<String> = conn
        .query_row(
            "SELECT id FROM semesters WHERE school_year_id = ? AND number = 1",
            [year_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(semester_id) = first_semester else {
        return Err(RegistrarError::not_found("school year"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    tx.execute("UPDATE semesters SET enrollment_open = 0", [])
        .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    tx.execute(
        "UPDATE active_term SET school_year_id = ?, semester_id = ?, updated_at = ? WHERE id = 1",
        (year_id, &semester_id, db::now_ts()),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;

    tracing::info!(school_year_id = %year_id, semester_id = %semester_id, "school year activated");
    active_term(conn)
}

/// Points the singleton at the semester. The active year follows the semester.
pub fn activate_semester(conn: &Connection, semester_id: &str) -> Result<ActiveTerm, RegistrarError> {
    let ctx = semester_context(conn, semester_id)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| RegistrarError::db("db_tx_failed", e))?;
    tx.execute(
        "UPDATE semesters SET enrollment_open = 0 WHERE id <> ?",
        [semester_id],
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    tx.execute(
        "UPDATE active_term SET school_year_id = ?, semester_id = ?, updated_at = ? WHERE id = 1",
        (&ctx.school_year_id, semester_id, db::now_ts()),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    tx.commit()
        .map_err(|e| RegistrarError::db("db_commit_failed", e))?;

    tracing::info!(semester_id = %semester_id, "semester activated");
    active_term(conn)
}

/// Flips `enrollment_open`. Returns the new value.
pub fn toggle_enrollment(conn: &Connection, semester_id: &str) -> Result<bool, RegistrarError> {
    let current: Option<i64> = conn
        .query_row(
            "SELECT enrollment_open FROM semesters WHERE id = ?",
            [semester_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Err(RegistrarError::not_found("semester"));
    };
    let next = current == 0;
    conn.execute(
        "UPDATE semesters SET enrollment_open = ? WHERE id = ?",
        (next as i64, semester_id),
    )
    .map_err(|e| RegistrarError::db("db_update_failed", e))?;
    Ok(next)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterRow {
    pub id: String,
    pub number: i64,
    pub label: String,
    pub enrollment_open: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYearRow {
    pub id: String,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_active: bool,
    pub semesters: Vec<SemesterRow>,
}

pub fn list_school_years(conn: &Connection) -> Result<Vec<SchoolYearRow>, RegistrarError> {
    let active = active_term(conn)?;
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date FROM school_years ORDER BY name DESC",
    )?;
    let years = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut sem_stmt = conn.prepare(
        "SELECT id, number, enrollment_open FROM semesters WHERE school_year_id = ? ORDER BY number",
    )?;
    let mut out = Vec::with_capacity(years.len());
    for (id, name, start_date, end_date) in years {
        let semesters = sem_stmt
            .query_map([&id], |r| {
                let sem_id: String = r.get(0)?;
                let number: i64 = r.get(1)?;
                let open: i64 = r.get(2)?;
                Ok(SemesterRow {
                    is_active: active.semester_id.as_deref() == Some(sem_id.as_str()),
                    id: sem_id,
                    number,
                    label: semester_label(number).to_string(),
                    enrollment_open: open != 0,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        out.push(SchoolYearRow {
            is_active: active.school_year_id.as_deref() == Some(id.as_str()),
            id,
            name,
            start_date,
            end_date,
            semesters,
        });
    }
    Ok(out)
}
