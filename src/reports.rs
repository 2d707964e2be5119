//! Read-only report models: summaries, rosters, and the SF1/SF5/SF9/SF10 school forms.

use crate::calc::{self, AcademicResult, PromotionStatus};
use crate::calendar::{self, SemesterContext};
use crate::domain::{grade_level_label, EnrollmentStatus, Gender, GradeRemarks, StudentStatus};
use crate::error::RegistrarError;
use crate::settings::{self, GradeSettings};
use crate::students::{self, full_name, StudentFilters};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCount {
    pub label: String,
    pub count: i64,
}

fn to_groups(map: BTreeMap<String, i64>) -> Vec<GroupCount> {
    map.into_iter()
        .map(|(label, count)| GroupCount { label, count })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSummary {
    pub semester: SemesterContext,
    pub by_track: Vec<GroupCount>,
    pub by_strand: Vec<GroupCount>,
    pub by_grade_level: Vec<GroupCount>,
    pub by_status: Vec<GroupCount>,
    pub total: i64,
}

impl EnrollmentSummary {
    pub fn table(&self) -> (Vec<&'static str>, Vec<Vec<String>>) {
        let mut rows = Vec::new();
        for (category, groups) in [
            ("Track", &self.by_track),
            ("Strand", &self.by_strand),
            ("Grade Level", &self.by_grade_level),
            ("Status", &self.by_status),
        ] {
            for g in groups {
                rows.push(vec![category.to_string(), g.label.clone(), g.count.to_string()]);
            }
        }
        rows.push(vec!["Total".to_string(), "Enrolled".to_string(), self.total.to_string()]);
        (vec!["Category", "Group", "Count"], rows)
    }
}

/// Enrolled counts by track, strand and grade level, plus every status of the semester.
pub fn enrollment_summary(conn: &Connection, semester_id: &str) -> Result<EnrollmentSummary, RegistrarError> {
    let semester = calendar::semester_context(conn, semester_id)?;
    let mut stmt = conn.prepare(
        "SELECT e.status, e.grade_level, str.name, tr.name
         FROM enrollments e
         LEFT JOIN strands str ON str.id = e.strand_id
         LEFT JOIN tracks tr ON tr.id = str.track_id
         WHERE e.semester_id = ?",
    )?;
    let rows = stmt
        .query_map([semester_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut by_track = BTreeMap::new();
    let mut by_strand = BTreeMap::new();
    let mut by_grade = BTreeMap::new();
    let mut by_status = BTreeMap::new();
    let mut total = 0;
    for (status, grade_level, strand, track) in rows {
        let label = EnrollmentStatus::parse(&status)
            .map(|s| s.label().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        *by_status.entry(label).or_insert(0) += 1;
        if EnrollmentStatus::parse(&status) != Some(EnrollmentStatus::Enrolled) {
            continue;
        }
        total += 1;
        *by_track.entry(track.unwrap_or_else(|| UNKNOWN.to_string())).or_insert(0) += 1;
        *by_strand.entry(strand.unwrap_or_else(|| UNKNOWN.to_string())).or_insert(0) += 1;
        *by_grade.entry(grade_level_label(grade_level)).or_insert(0) += 1;
    }
    Ok(EnrollmentSummary {
        semester,
        by_track: to_groups(by_track),
        by_strand: to_groups(by_strand),
        by_grade_level: to_groups(by_grade),
        by_status: to_groups(by_status),
        total,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHeader {
    pub section_id: String,
    pub section: String,
    pub grade_level: i64,
    pub grade_level_label: String,
    pub strand: String,
    pub strand_code: String,
    pub track: String,
    pub adviser: Option<String>,
    pub semester: SemesterContext,
}

pub fn section_header(conn: &Connection, section_id: &str) -> Result<SectionHeader, RegistrarError> {
    let row = conn
        .query_row(
            "SELECT sec.name, sec.grade_level, str.name, str.code, tr.name, u.name, sec.semester_id
             FROM sections sec
             JOIN strands str ON str.id = sec.strand_id
             JOIN tracks tr ON tr.id = str.track_id
             LEFT JOIN users u ON u.id = sec.adviser_id
             WHERE sec.id = ?",
            [section_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((section, grade_level, strand, strand_code, track, adviser, semester_id)) = row else {
        return Err(RegistrarError::not_found("section"));
    };
    Ok(SectionHeader {
        section_id: section_id.to_string(),
        section,
        grade_level,
        grade_level_label: grade_level_label(grade_level),
        strand,
        strand_code,
        track,
        adviser,
        semester: calendar::semester_context(conn, &semester_id)?,
    })
}

/// One roster line with the demographics every form needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub enrollment_id: String,
    pub enrollment_status: EnrollmentStatus,
    pub student_id: String,
    pub lrn: String,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub suffix: Option<String>,
    pub gender: Option<Gender>,
    pub birthdate: String,
    pub address: Option<String>,
    pub contact_number: Option<String>,
    pub guardian_name: Option<String>,
    pub guardian_relationship: Option<String>,
    pub guardian_contact: Option<String>,
    pub student_status: String,
}

impl RosterEntry {
    pub fn full_name(&self) -> String {
        full_name(&self.last_name, &self.first_name, self.middle_name.as_deref(), self.suffix.as_deref())
    }
}

fn roster(
    conn: &Connection,
    section_id: &str,
    statuses: &[EnrollmentStatus],
) -> Result<Vec<RosterEntry>, RegistrarError> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.status, st.id, st.lrn, st.last_name, st.first_name, st.middle_name, st.suffix,
                st.gender, st.birthdate, st.address, st.contact_number, st.guardian_name,
                st.guardian_relationship, st.guardian_contact, st.status
         FROM enrollments e JOIN students st ON st.id = e.student_id
         WHERE e.section_id = ?
         ORDER BY st.last_name, st.first_name, st.id",
    )?;
    let rows = stmt
        .query_map([section_id], |r| {
            Ok((
                r.get::<_, String>(1)?,
                RosterEntry {
                    enrollment_id: r.get(0)?,
                    enrollment_status: EnrollmentStatus::Pending,
                    student_id: r.get(2)?,
                    lrn: r.get(3)?,
                    last_name: r.get(4)?,
                    first_name: r.get(5)?,
                    middle_name: r.get(6)?,
                    suffix: r.get(7)?,
                    gender: Gender::parse(&r.get::<_, String>(8)?),
                    birthdate: r.get(9)?,
                    address: r.get(10)?,
                    contact_number: r.get(11)?,
                    guardian_name: r.get(12)?,
                    guardian_relationship: r.get(13)?,
                    guardian_contact: r.get(14)?,
                    student_status: r.get(15)?,
                },
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut out = Vec::with_capacity(rows.len());
    for (status, mut entry) in rows {
        let Some(status) = EnrollmentStatus::parse(&status) else {
            tracing::warn!(enrollment_id = %entry.enrollment_id, status = %status, "skipping enrollment with unknown status");
            continue;
        };
        if statuses.contains(&status) {
            entry.enrollment_status = status;
            out.push(entry);
        }
    }
    Ok(out)
}

fn student_status_label(raw: &str) -> String {
    StudentStatus::parse(raw)
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn opt(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassList {
    pub header: SectionHeader,
    pub students: Vec<RosterEntry>,
}

impl ClassList {
    pub const COLUMNS: [&'static str; 8] = [
        "No.",
        "LRN",
        "Last Name",
        "First Name",
        "Middle Name",
        "Suffix",
        "Gender",
        "Status",
    ];

    pub fn table(&self) -> (Vec<&'static str>, Vec<Vec<String>>) {
        let rows = self
            .students
            .iter()
            .enumerate()
            .map(|(i, s)| {
                vec![
                    (i + 1).to_string(),
                    s.lrn.clone(),
                    s.last_name.clone(),
                    s.first_name.clone(),
                    opt(&s.middle_name),
                    opt(&s.suffix),
                    s.gender.map(|g| g.label().to_string()).unwrap_or_default(),
                    s.enrollment_status.label().to_string(),
                ]
            })
            .collect();
        (Self::COLUMNS.to_vec(), rows)
    }
}

/// Enrolled students of a section sorted by last name.
pub fn class_list(conn: &Connection, section_id: &str) -> Result<ClassList, RegistrarError> {
    let header = section_header(conn, section_id)?;
    let students = roster(conn, section_id, &[EnrollmentStatus::Enrolled])?;
    Ok(ClassList { header, students })
}

pub const MASTERLIST_COLUMNS: [&str; 12] = [
    "No.",
    "LRN",
    "Last Name",
    "First Name",
    "Middle Name",
    "Suffix",
    "Gender",
    "Birthdate",
    "Address",
    "Contact Number",
    "Guardian Name",
    "Status",
];

/// Rows of the student masterlist, numbered from `start`.
pub fn masterlist_rows(students: &[Value], start: usize) -> Vec<Vec<String>> {
    let s = |v: &Value, k: &str| v.get(k).and_then(|x| x.as_str()).unwrap_or("").to_string();
    students
        .iter()
        .enumerate()
        .map(|(i, st)| {
            vec![
                (start + i).to_string(),
                s(st, "lrn"),
                s(st, "lastName"),
                s(st, "firstName"),
                s(st, "middleName"),
                s(st, "suffix"),
                Gender::parse(&s(st, "gender"))
                    .map(|g| g.label().to_string())
                    .unwrap_or_default(),
                s(st, "birthdate"),
                s(st, "address"),
                s(st, "contactNumber"),
                s(st, "guardianName"),
                student_status_label(&s(st, "status")),
            ]
        })
        .collect()
}

pub fn masterlist_all(conn: &Connection, filters: &StudentFilters) -> Result<Vec<Vec<String>>, RegistrarError> {
    let students = students::all_students(conn, filters)?;
    Ok(masterlist_rows(&students, 1))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeCell {
    pub subject_id: String,
    pub code: String,
    pub name: String,
    pub midterm: Option<f64>,
    pub finals: Option<f64>,
    pub final_grade: Option<f64>,
    pub remarks: Option<GradeRemarks>,
    pub is_locked: bool,
}

fn grades_for_enrollment(conn: &Connection, enrollment_id: &str) -> Result<Vec<GradeCell>, RegistrarError> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.code, s.name, g.midterm, g.finals, g.final_grade, g.remarks, g.is_locked
         FROM grades g JOIN subjects s ON s.id = g.subject_id
         WHERE g.enrollment_id = ?
         ORDER BY s.name, s.code",
    )?;
    let rows = stmt
        .query_map([enrollment_id], |r| {
            Ok(GradeCell {
                subject_id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
                midterm: r.get(3)?,
                finals: r.get(4)?,
                final_grade: r.get(5)?,
                remarks: r
                    .get::<_, Option<String>>(6)?
                    .as_deref()
                    .and_then(GradeRemarks::parse),
                is_locked: r.get::<_, i64>(7)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

/// Grade rows per enrolled student of a section, optionally narrowed to one subject.
pub fn grade_summary(
    conn: &Connection,
    section_id: &str,
    subject_id: Option<&str>,
) -> Result<Value, RegistrarError> {
    let header = section_header(conn, section_id)?;
    let settings = GradeSettings::load(conn)?;
    let entries = roster(conn, section_id, &[EnrollmentStatus::Enrolled])?;

    let mut subj_stmt = conn.prepare(
        "SELECT s.id, s.code, s.name FROM strand_subject ss
         JOIN subjects s ON s.id = ss.subject_id
         JOIN sections sec ON sec.strand_id = ss.strand_id AND sec.grade_level = ss.grade_level
         WHERE sec.id = ? AND ss.semester = ?
         ORDER BY ss.sort_order, s.code",
    )?;
    let subjects = subj_stmt
        .query_map((section_id, header.semester.number), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "code": r.get::<_, String>(1)?,
                "name": r.get::<_, String>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut students = Vec::with_capacity(entries.len());
    for e in &entries {
        let grades: Vec<GradeCell> = grades_for_enrollment(conn, &e.enrollment_id)?
            .into_iter()
            .filter(|g| subject_id.map(|s| s == g.subject_id).unwrap_or(true))
            .collect();
        let average = calc::general_average(grades.iter().map(|g| g.final_grade));
        students.push(json!({
            "studentId": e.student_id,
            "lrn": e.lrn,
            "name": e.full_name(),
            "grades": grades,
            "average": average,
        }));
    }
    Ok(json!({
        "header": header,
        "settings": settings.to_json(),
        "subjects": subjects,
        "students": students,
    }))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectColumn {
    pub subject_id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sf5Row {
    pub lrn: String,
    pub name: String,
    pub gender: Option<Gender>,
    pub enrollment_status: EnrollmentStatus,
    /// Final grade per subject column, in column order.
    pub grades: Vec<Option<f64>>,
    pub general_average: Option<f64>,
    pub remarks: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sf5Summary {
    pub total: usize,
    pub male: usize,
    pub female: usize,
    pub promoted: usize,
    pub retained: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sf5Report {
    pub school: Value,
    pub header: SectionHeader,
    pub passing_grade: f64,
    pub subjects: Vec<SubjectColumn>,
    pub rows: Vec<Sf5Row>,
    pub summary: Sf5Summary,
}

impl Sf5Report {
    pub fn table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut headers = vec!["No.".to_string(), "LRN".to_string(), "Name".to_string(), "Sex".to_string()];
        headers.extend(self.subjects.iter().map(|s| s.code.clone()));
        headers.extend(["Gen. Average", "Remarks", "Status"].map(String::from));
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let mut row = vec![
                    (i + 1).to_string(),
                    r.lrn.clone(),
                    r.name.clone(),
                    r.gender.map(|g| g.initial().to_string()).unwrap_or_default(),
                ];
                row.extend(r.grades.iter().map(|g| calc::format_2dp(*g)));
                row.push(calc::format_2dp(r.general_average));
                row.push(r.remarks.to_string());
                row.push(r.status.to_string());
                row
            })
            .collect();
        (headers, rows)
    }
}

/// Promotion report. Pending enrollments are left out.
pub fn sf5(conn: &Connection, section_id: &str) -> Result<Sf5Report, RegistrarError> {
    let header = section_header(conn, section_id)?;
    let settings = GradeSettings::load(conn)?;
    let entries = roster(
        conn,
        section_id,
        &[
            EnrollmentStatus::Enrolled,
            EnrollmentStatus::Dropped,
            EnrollmentStatus::Transferred,
        ],
    )?;

    let mut grades_by_enrollment: HashMap<String, Vec<GradeCell>> = HashMap::new();
    let mut columns: BTreeMap<(String, String), String> = BTreeMap::new();
    for e in &entries {
        let grades = grades_for_enrollment(conn, &e.enrollment_id)?;
        for g in &grades {
            columns.insert((g.name.clone(), g.code.clone()), g.subject_id.clone());
        }
        grades_by_enrollment.insert(e.enrollment_id.clone(), grades);
    }
    let subjects: Vec<SubjectColumn> = columns
        .into_iter()
        .map(|((name, code), subject_id)| SubjectColumn {
            subject_id,
            code,
            name,
        })
        .collect();

    let mut summary = Sf5Summary::default();
    let mut rows = Vec::with_capacity(entries.len());
    for e in &entries {
        let grades = grades_by_enrollment
            .remove(&e.enrollment_id)
            .unwrap_or_default();
        let finals: Vec<Option<f64>> = grades.iter().map(|g| g.final_grade).collect();
        let outcome = calc::promotion_outcome(e.enrollment_status, &finals, settings.passing_grade);
        let by_subject: HashMap<&str, Option<f64>> = grades
            .iter()
            .map(|g| (g.subject_id.as_str(), g.final_grade))
            .collect();

        summary.total += 1;
        match e.gender {
            Some(Gender::Male) => summary.male += 1,
            Some(Gender::Female) => summary.female += 1,
            None => {}
        }
        match outcome.status {
            PromotionStatus::Promoted => summary.promoted += 1,
            PromotionStatus::Retained => summary.retained += 1,
            PromotionStatus::NotRated | PromotionStatus::Transferred | PromotionStatus::Dropped => {}
        }

        rows.push(Sf5Row {
            lrn: e.lrn.clone(),
            name: e.full_name(),
            gender: e.gender,
            enrollment_status: e.enrollment_status,
            grades: subjects
                .iter()
                .map(|s| by_subject.get(s.subject_id.as_str()).copied().flatten())
                .collect(),
            general_average: outcome.general_average,
            remarks: outcome.result.label(),
            status: outcome.status.label(),
        });
    }

    Ok(Sf5Report {
        school: settings::school_identity(conn)?,
        header,
        passing_grade: settings.passing_grade,
        subjects,
        rows,
        summary,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sf1Report {
    pub school: Value,
    pub header: SectionHeader,
    pub students: Vec<RosterEntry>,
    pub total: usize,
    pub male: usize,
    pub female: usize,
}

impl Sf1Report {
    pub const COLUMNS: [&'static str; 14] = [
        "No.",
        "LRN",
        "Last Name",
        "First Name",
        "Middle Name",
        "Suffix",
        "Sex",
        "Birth Date",
        "Address",
        "Guardian Name",
        "Guardian Relationship",
        "Guardian Contact",
        "Contact Number",
        "Status",
    ];

    pub fn table(&self) -> (Vec<&'static str>, Vec<Vec<String>>) {
        let rows = self
            .students
            .iter()
            .enumerate()
            .map(|(i, s)| {
                vec![
                    (i + 1).to_string(),
                    s.lrn.clone(),
                    s.last_name.clone(),
                    s.first_name.clone(),
                    opt(&s.middle_name),
                    opt(&s.suffix),
                    s.gender.map(|g| g.initial().to_string()).unwrap_or_default(),
                    register_date(&s.birthdate),
                    opt(&s.address),
                    opt(&s.guardian_name),
                    opt(&s.guardian_relationship),
                    opt(&s.guardian_contact),
                    opt(&s.contact_number),
                    student_status_label(&s.student_status),
                ]
            })
            .collect();
        (Self::COLUMNS.to_vec(), rows)
    }
}

/// ISO date to MM/DD/YYYY; anything unparsable passes through.
pub fn register_date(iso: &str) -> String {
    students::parse_date(iso)
        .map(|d| d.format("%m/%d/%Y").to_string())
        .unwrap_or_else(|| iso.to_string())
}

/// School register: full enrolled roster with the gender tally.
pub fn sf1(conn: &Connection, section_id: &str) -> Result<Sf1Report, RegistrarError> {
    let header = section_header(conn, section_id)?;
    let students = roster(conn, section_id, &[EnrollmentStatus::Enrolled])?;
    let male = students.iter().filter(|s| s.gender == Some(Gender::Male)).count();
    let female = students.iter().filter(|s| s.gender == Some(Gender::Female)).count();
    Ok(Sf1Report {
        school: settings::school_identity(conn)?,
        header,
        total: students.len(),
        male,
        female,
        students,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    pub paper: &'static str,
    pub orientation: &'static str,
}

pub const SF9_LAYOUT: PageLayout = PageLayout {
    paper: "legal",
    orientation: "portrait",
};
pub const SF10_LAYOUT: PageLayout = PageLayout {
    paper: "legal",
    orientation: "landscape",
};

fn grade_rows_json(grades: &[GradeCell], with_lock: bool) -> Vec<Value> {
    grades
        .iter()
        .map(|g| {
            let mut row = json!({
                "code": g.code,
                "name": g.name,
                "midterm": g.midterm,
                "finals": g.finals,
                "finalGrade": g.final_grade,
                "remarks": g.remarks.map(|r| r.label()).unwrap_or("-"),
            });
            if with_lock {
                row["state"] = json!(if g.is_locked { "Final" } else { "Draft" });
            }
            row
        })
        .collect()
}

fn average_json(grades: &[GradeCell], passing_grade: f64) -> Value {
    let average = calc::general_average(grades.iter().map(|g| g.final_grade));
    json!({
        "generalAverage": average,
        "generalAverageText": calc::format_2dp(average),
        "remarks": average
            .map(|a| calc::remarks_for(a, passing_grade).label())
            .unwrap_or(AcademicResult::NoGrades.label()),
    })
}

fn student_block(conn: &Connection, student_id: &str) -> Result<(String, Value), RegistrarError> {
    conn.query_row(
        "SELECT lrn, last_name, first_name, middle_name, suffix, gender, birthdate, address,
                guardian_name, guardian_relationship, guardian_contact, previous_school
         FROM students WHERE id = ?",
        [student_id],
        |r| {
            let lrn: String = r.get(0)?;
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            let middle: Option<String> = r.get(3)?;
            let suffix: Option<String> = r.get(4)?;
            let birthdate: String = r.get(6)?;
            Ok((
                lrn.clone(),
                json!({
                    "id": student_id,
                    "lrn": lrn,
                    "name": full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                    "lastName": last,
                    "firstName": first,
                    "middleName": middle,
                    "suffix": suffix,
                    "sex": Gender::parse(&r.get::<_, String>(5)?).map(|g| g.label()),
                    "birthdate": register_date(&birthdate),
                    "address": r.get::<_, Option<String>>(7)?,
                    "guardianName": r.get::<_, Option<String>>(8)?,
                    "guardianRelationship": r.get::<_, Option<String>>(9)?,
                    "guardianContact": r.get::<_, Option<String>>(10)?,
                    "previousSchool": r.get::<_, Option<String>>(11)?,
                }),
            ))
        },
    )
    .optional()?
    .ok_or_else(|| RegistrarError::not_found("student"))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDocument {
    pub form: &'static str,
    pub filename: String,
    pub layout: PageLayout,
    pub model: Value,
}

/// Report card for one enrollment.
pub fn sf9(conn: &Connection, enrollment_id: &str, today: chrono::NaiveDate) -> Result<FormDocument, RegistrarError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT student_id, section_id FROM enrollments WHERE id = ?",
            [enrollment_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((student_id, section_id)) = row else {
        return Err(RegistrarError::not_found("enrollment"));
    };
    let (lrn, student) = student_block(conn, &student_id)?;
    let header = section_header(conn, &section_id)?;
    let settings = GradeSettings::load(conn)?;
    let grades = grades_for_enrollment(conn, enrollment_id)?;

    Ok(FormDocument {
        form: "SF9",
        filename: crate::exports::document_filename("SF9", &lrn, today),
        layout: SF9_LAYOUT,
        model: json!({
            "school": settings::school_identity(conn)?,
            "student": student,
            "header": header,
            "grades": grade_rows_json(&grades, false),
            "average": average_json(&grades, settings.passing_grade),
            "passingGrade": settings.passing_grade,
        }),
    })
}

/// Permanent record: every enrollment of the student in creation order.
pub fn sf10(conn: &Connection, student_id: &str, today: chrono::NaiveDate) -> Result<FormDocument, RegistrarError> {
    let (lrn, student) = student_block(conn, student_id)?;
    let settings = GradeSettings::load(conn)?;
    let mut stmt = conn.prepare(
        "SELECT id, section_id, status FROM enrollments WHERE student_id = ? ORDER BY created_at, id",
    )?;
    let enrollments = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut terms = Vec::with_capacity(enrollments.len());
    for (enrollment_id, section_id, status) in enrollments {
        let header = section_header(conn, &section_id)?;
        let grades = grades_for_enrollment(conn, &enrollment_id)?;
        terms.push(json!({
            "enrollmentId": enrollment_id,
            "status": EnrollmentStatus::parse(&status).map(|s| s.label()).unwrap_or(UNKNOWN),
            "header": header,
            "grades": grade_rows_json(&grades, true),
            "average": average_json(&grades, settings.passing_grade),
        }));
    }

    Ok(FormDocument {
        form: "SF10",
        filename: crate::exports::document_filename("SF10", &lrn, today),
        layout: SF10_LAYOUT,
        model: json!({
            "school": settings::school_identity(conn)?,
            "student": student,
            "terms": terms,
            "passingGrade": settings.passing_grade,
        }),
    })
}

pub fn dashboard(conn: &Connection) -> Result<Value, RegistrarError> {
    let active = calendar::active_term(conn)?;
    let total_students: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    let teachers: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = 'teacher' AND is_active = 1",
        [],
        |r| r.get(0),
    )?;
    let sem = active.semester_id.clone().unwrap_or_default();

    let enrolled: i64 = conn.query_row(
        "SELECT COUNT(*) FROM enrollments WHERE semester_id = ? AND status = 'enrolled'",
        [&sem],
        |r| r.get(0),
    )?;
    let sections: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sections WHERE semester_id = ?",
        [&sem],
        |r| r.get(0),
    )?;

    let mut track_stmt = conn.prepare(
        "SELECT tr.name, COUNT(e.id)
         FROM tracks tr
         LEFT JOIN strands str ON str.track_id = tr.id
         LEFT JOIN enrollments e ON e.strand_id = str.id AND e.semester_id = ? AND e.status = 'enrolled'
         GROUP BY tr.id ORDER BY tr.sort_order, tr.code",
    )?;
    let by_track = track_stmt
        .query_map([&sem], |r| {
            Ok(GroupCount {
                label: r.get(0)?,
                count: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut cap_stmt = conn.prepare(
        "SELECT sec.id, sec.name, sec.max_capacity,
                (SELECT COUNT(*) FROM enrollments e WHERE e.section_id = sec.id AND e.status = 'enrolled')
         FROM sections sec WHERE sec.semester_id = ? ORDER BY sec.grade_level, sec.name",
    )?;
    let capacity = cap_stmt
        .query_map([&sem], |r| {
            Ok(json!({
                "sectionId": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "maxCapacity": r.get::<_, i64>(2)?,
                "enrolled": r.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut recent_stmt = conn.prepare(
        "SELECT e.id, e.status, e.created_at, st.last_name, st.first_name, st.middle_name, st.suffix, sec.name
         FROM enrollments e
         JOIN students st ON st.id = e.student_id
         JOIN sections sec ON sec.id = e.section_id
         ORDER BY e.created_at DESC, e.id LIMIT 10",
    )?;
    let recent = recent_stmt
        .query_map([], |r| {
            let last: String = r.get(3)?;
            let first: String = r.get(4)?;
            let middle: Option<String> = r.get(5)?;
            let suffix: Option<String> = r.get(6)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "status": r.get::<_, String>(1)?,
                "createdAt": r.get::<_, String>(2)?,
                "studentName": full_name(&last, &first, middle.as_deref(), suffix.as_deref()),
                "section": r.get::<_, String>(7)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    Ok(json!({
        "activeTerm": active,
        "totalStudents": total_students,
        "enrolledThisSemester": enrolled,
        "sections": sections,
        "teachers": teachers,
        "enrollmentByTrack": by_track,
        "sectionCapacity": capacity,
        "recentEnrollments": recent,
    }))
}

