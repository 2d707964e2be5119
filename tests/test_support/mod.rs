#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_registrard");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn registrard");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn send_line(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    fn send(&mut self, mut payload: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        payload["id"] = json!(id);
        let resp = self.send_line(&payload.to_string());
        assert_eq!(resp.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        resp
    }

    /// Full response envelope, as the default (admin) role.
    pub fn request(&mut self, method: &str, params: Value) -> Value {
        self.send(json!({ "method": method, "params": params }))
    }

    pub fn request_as(&mut self, role: &str, user_id: Option<&str>, method: &str, params: Value) -> Value {
        let mut payload = json!({ "method": method, "params": params, "role": role });
        if let Some(uid) = user_id {
            payload["userId"] = json!(uid);
        }
        self.send(payload)
    }

    pub fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let resp = self.request(method, params);
        expect_ok(method, resp)
    }

    pub fn request_ok_as(&mut self, role: &str, user_id: Option<&str>, method: &str, params: Value) -> Value {
        let resp = self.request_as(role, user_id, method, params);
        expect_ok(method, resp)
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn expect_ok(method: &str, resp: Value) -> Value {
    assert!(
        resp.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        resp.get("error").cloned().unwrap_or(Value::Null)
    );
    resp.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(resp: &Value) -> &str {
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

pub fn error_message(resp: &Value) -> &str {
    resp.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

pub fn str_of<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing string {} in {}", key, v))
}

/// A school with an active year, one strand, two grade 11 first-semester
/// subjects, a teacher, and one section advised by that teacher.
pub struct School {
    pub workspace: PathBuf,
    pub year_id: String,
    pub semester_id: String,
    pub second_semester_id: String,
    pub track_id: String,
    pub strand_id: String,
    pub oral_com_id: String,
    pub gen_math_id: String,
    pub teacher_id: String,
    pub section_id: String,
}

pub fn seed_school(sc: &mut Sidecar, prefix: &str) -> School {
    let workspace = temp_dir(prefix);
    sc.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let year = sc.request_ok("schoolYears.create", json!({ "name": "2025-2026" }));
    let year_id = str_of(&year, "schoolYearId").to_string();
    let years = sc.request_ok("schoolYears.list", json!({}));
    let year_row = years["schoolYears"]
        .as_array()
        .expect("schoolYears")
        .iter()
        .find(|y| y["id"] == json!(year_id))
        .cloned()
        .expect("created year listed");
    let semester_id = str_of(&year_row["semesters"][0], "id").to_string();
    let second_semester_id = str_of(&year_row["semesters"][1], "id").to_string();
    sc.request_ok("schoolYears.activate", json!({ "schoolYearId": year_id }));

    let track = sc.request_ok("tracks.create", json!({ "code": "ACAD", "name": "Academic" }));
    let track_id = str_of(&track, "trackId").to_string();
    let strand = sc.request_ok(
        "strands.create",
        json!({ "trackId": track_id, "code": "STEM", "name": "Science, Technology, Engineering and Mathematics" }),
    );
    let strand_id = str_of(&strand, "strandId").to_string();

    let mapping = json!([{ "strandId": strand_id, "gradeLevel": 11, "semester": 1 }]);
    let oral = sc.request_ok(
        "subjects.create",
        json!({ "code": "ORAL-COM", "name": "Oral Communication", "type": "core", "hours": 80, "strands": mapping.clone() }),
    );
    let math = sc.request_ok(
        "subjects.create",
        json!({ "code": "GEN-MATH", "name": "General Mathematics", "type": "core", "hours": 80, "strands": mapping }),
    );

    let teacher = sc.request_ok(
        "users.create",
        json!({ "name": "Ana Reyes", "email": "ana.reyes@school.test", "role": "teacher" }),
    );
    let teacher_id = str_of(&teacher, "userId").to_string();
    let section = sc.request_ok(
        "sections.create",
        json!({
            "name": "STEM 11-A",
            "strandId": strand_id,
            "gradeLevel": 11,
            "maxCapacity": 40,
            "adviserId": teacher_id,
        }),
    );

    School {
        workspace,
        year_id,
        semester_id,
        second_semester_id,
        track_id,
        strand_id,
        oral_com_id: str_of(&oral, "subjectId").to_string(),
        gen_math_id: str_of(&math, "subjectId").to_string(),
        teacher_id,
        section_id: str_of(&section, "sectionId").to_string(),
    }
}

pub fn add_student(sc: &mut Sidecar, lrn: &str, last: &str, first: &str, gender: &str) -> String {
    let created = sc.request_ok(
        "students.create",
        json!({
            "student": {
                "lrn": lrn,
                "lastName": last,
                "firstName": first,
                "birthdate": "2008-05-15",
                "gender": gender,
            }
        }),
    );
    str_of(&created, "studentId").to_string()
}

/// Enrolls in both subjects and moves the enrollment to `enrolled`.
pub fn enroll_student(sc: &mut Sidecar, school: &School, student_id: &str) -> String {
    let created = sc.request_ok(
        "enrollment.create",
        json!({
            "studentId": student_id,
            "sectionId": school.section_id,
            "subjectIds": [school.oral_com_id, school.gen_math_id],
        }),
    );
    let enrollment_id = str_of(&created, "enrollmentId").to_string();
    sc.request_ok(
        "enrollment.updateStatus",
        json!({ "enrollmentId": enrollment_id, "status": "enrolled" }),
    );
    enrollment_id
}

/// Grade row ids keyed by student id for one subject of the section.
pub fn grade_ids(sc: &mut Sidecar, school: &School, subject_id: &str) -> Vec<(String, String)> {
    let sheet = sc.request_ok(
        "grades.sheet",
        json!({ "sectionId": school.section_id, "subjectId": subject_id }),
    );
    sheet["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|r| (str_of(r, "studentId").to_string(), str_of(r, "gradeId").to_string()))
        .collect()
}
