use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

pub const DB_FILE_NAME: &str = "registrar.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS semesters(
            id TEXT PRIMARY KEY,
            school_year_id TEXT NOT NULL,
            number INTEGER NOT NULL CHECK(number IN (1, 2)),
            enrollment_open INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            UNIQUE(school_year_id, number)
        )",
        [],
    )?;
    // Single row: the system-wide active school year and semester.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS active_term(
            id INTEGER PRIMARY KEY CHECK(id = 1),
            school_year_id TEXT,
            semester_id TEXT,
            updated_at TEXT,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id)
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO active_term(id, school_year_id, semester_id) VALUES(1, NULL, NULL)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS strands(
            id TEXT PRIMARY KEY,
            track_id TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(track_id) REFERENCES tracks(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_strands_track ON strands(track_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            hours INTEGER NOT NULL,
            prerequisite_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(prerequisite_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS strand_subject(
            subject_id TEXT NOT NULL,
            strand_id TEXT NOT NULL,
            grade_level INTEGER NOT NULL CHECK(grade_level IN (11, 12)),
            semester INTEGER NOT NULL CHECK(semester IN (1, 2)),
            sort_order INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(subject_id, strand_id, grade_level, semester),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(strand_id) REFERENCES strands(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_strand_subject_load ON strand_subject(strand_id, grade_level, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            lrn TEXT NOT NULL UNIQUE,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            suffix TEXT,
            birthdate TEXT NOT NULL,
            gender TEXT NOT NULL,
            religion TEXT,
            address TEXT,
            contact_number TEXT,
            father_name TEXT,
            mother_name TEXT,
            guardian_name TEXT,
            guardian_contact TEXT,
            guardian_relationship TEXT,
            previous_school TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(last_name, first_name)",
        [],
    )?;
    ensure_students_learning_modality(&conn)?;
    ensure_students_user_id(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            semester_id TEXT NOT NULL,
            strand_id TEXT NOT NULL,
            grade_level INTEGER NOT NULL CHECK(grade_level IN (11, 12)),
            name TEXT NOT NULL,
            max_capacity INTEGER NOT NULL CHECK(max_capacity >= 1),
            adviser_id TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(strand_id) REFERENCES strands(id),
            FOREIGN KEY(adviser_id) REFERENCES users(id),
            UNIQUE(semester_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_strand ON sections(strand_id, grade_level)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            semester_id TEXT NOT NULL,
            strand_id TEXT,
            grade_level INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            enrolled_at TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(semester_id) REFERENCES semesters(id),
            FOREIGN KEY(strand_id) REFERENCES strands(id),
            UNIQUE(student_id, semester_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_section ON enrollments(section_id, status)",
        [],
    )?;
    ensure_enrollments_remarks(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollment_status_log(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            from_status TEXT,
            to_status TEXT NOT NULL,
            changed_by TEXT,
            changed_at TEXT NOT NULL,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollment_status_log_enrollment ON enrollment_status_log(enrollment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            midterm REAL,
            finals REAL,
            final_grade REAL,
            remarks TEXT,
            is_locked INTEGER NOT NULL DEFAULT 0,
            encoded_by TEXT,
            updated_at TEXT,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(enrollment_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_profiles(
            user_id TEXT PRIMARY KEY,
            employee_id TEXT,
            position_title TEXT,
            appointment_status TEXT,
            sex TEXT,
            birthdate TEXT,
            contact_number TEXT,
            address TEXT,
            highest_degree TEXT,
            degree_course TEXT,
            degree_major TEXT,
            school_graduated TEXT,
            year_graduated INTEGER,
            prc_license_number TEXT,
            prc_validity TEXT,
            eligibility TEXT,
            specialization TEXT,
            date_hired TEXT,
            teaching_hours_per_week INTEGER,
            updated_at TEXT,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_trainings(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            type TEXT,
            sponsor TEXT,
            date_from TEXT,
            date_to TEXT,
            hours REAL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES teacher_profiles(user_id) ON DELETE CASCADE
        )",
        [],
    )?;

    // Append-only change history. Values are JSON objects of column -> value.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT,
            action TEXT NOT NULL,
            model_type TEXT NOT NULL,
            model_id TEXT NOT NULL,
            old_values TEXT,
            new_values TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_log_model ON audit_log(model_type, model_id)",
        [],
    )?;

    Ok(conn)
}

/// RFC 3339 UTC with microseconds so rows created back to back still order.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn settings_get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
        r.get(0)
    })
    .optional()
}

pub fn settings_set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

pub fn settings_all(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows.into_iter().collect())
}

fn ensure_students_learning_modality(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "learning_modality")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN learning_modality TEXT", [])?;
    Ok(())
}

/// Links a student record to the `student` account that may view it.
fn ensure_students_user_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "user_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN user_id TEXT REFERENCES users(id)", [])?;
    Ok(())
}

fn ensure_enrollments_remarks(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "enrollments", "remarks")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE enrollments ADD COLUMN remarks TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
