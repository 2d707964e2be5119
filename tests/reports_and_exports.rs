mod test_support;

use serde_json::{json, Value};
use test_support::{add_student, enroll_student, grade_ids, seed_school, str_of, temp_dir, School, Sidecar};

fn save_both(sc: &mut Sidecar, school: &School, student: &str, oral: (f64, f64), math: (f64, f64)) {
    for (subject, (m, f)) in [(&school.oral_com_id, oral), (&school.gen_math_id, math)] {
        let grade_id = grade_ids(sc, school, subject)
            .into_iter()
            .find(|(s, _)| s == student)
            .map(|(_, g)| g)
            .expect("grade row");
        sc.request_ok(
            "grades.save",
            json!({
                "sectionId": school.section_id,
                "subjectId": subject,
                "grades": [{ "gradeId": grade_id, "midterm": m, "finals": f }],
            }),
        );
    }
}

fn row_for<'a>(report: &'a Value, lrn: &str) -> Option<&'a Value> {
    report["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .find(|r| r["lrn"] == json!(lrn))
}

#[test]
fn sf5_derives_promotion_status_per_enrollment() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-reports-sf5");

    let promoted = add_student(&mut sc, "600000000001", "Abad", "Ana", "female");
    let retained = add_student(&mut sc, "600000000002", "Bello", "Ben", "male");
    let ungraded = add_student(&mut sc, "600000000003", "Cua", "Cris", "male");
    let dropped = add_student(&mut sc, "600000000004", "Diaz", "Dina", "female");
    let pending = add_student(&mut sc, "600000000005", "Evangelista", "Eli", "male");

    enroll_student(&mut sc, &school, &promoted);
    enroll_student(&mut sc, &school, &retained);
    enroll_student(&mut sc, &school, &ungraded);
    let dropped_enrollment = enroll_student(&mut sc, &school, &dropped);
    sc.request_ok(
        "enrollment.create",
        json!({ "studentId": pending, "sectionId": school.section_id, "subjectIds": [school.oral_com_id] }),
    );

    save_both(&mut sc, &school, &promoted, (80.0, 90.0), (85.0, 85.0));
    save_both(&mut sc, &school, &retained, (80.0, 90.0), (60.0, 70.0));
    sc.request_ok(
        "enrollment.updateStatus",
        json!({ "enrollmentId": dropped_enrollment, "status": "dropped" }),
    );

    let report = sc.request_ok("reports.sf5", json!({ "sectionId": school.section_id }));
    assert!(row_for(&report, "600000000005").is_none());

    let row = row_for(&report, "600000000001").expect("promoted row");
    assert_eq!(row["status"], json!("Promoted"));
    assert_eq!(row["remarks"], json!("Passed"));
    assert_eq!(row["generalAverage"], json!(85.5));

    let row = row_for(&report, "600000000002").expect("retained row");
    assert_eq!(row["status"], json!("Retained"));
    assert_eq!(row["remarks"], json!("Failed"));

    let row = row_for(&report, "600000000003").expect("ungraded row");
    assert_eq!(row["status"], json!("-"));
    assert_eq!(row["remarks"], json!("No Grades"));

    let row = row_for(&report, "600000000004").expect("dropped row");
    assert_eq!(row["status"], json!("Dropped"));

    assert_eq!(report["summary"]["total"], json!(4));
    assert_eq!(report["summary"]["promoted"], json!(1));
    assert_eq!(report["summary"]["retained"], json!(1));
    let codes: Vec<&str> = report["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .map(|s| s["code"].as_str().expect("code"))
        .collect();
    assert_eq!(codes, vec!["GEN-MATH", "ORAL-COM"]);
}

#[test]
fn class_list_and_summary_count_only_enrolled_students() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-reports-class-list");
    let a = add_student(&mut sc, "610000000001", "Zamora", "Zed", "male");
    let b = add_student(&mut sc, "610000000002", "Alonzo", "Amy", "female");
    let c = add_student(&mut sc, "610000000003", "Medina", "Mae", "female");
    enroll_student(&mut sc, &school, &a);
    enroll_student(&mut sc, &school, &b);
    sc.request_ok(
        "enrollment.create",
        json!({ "studentId": c, "sectionId": school.section_id, "subjectIds": [school.oral_com_id] }),
    );

    let list = sc.request_ok("reports.classList", json!({ "sectionId": school.section_id }));
    let names: Vec<&str> = list["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| s["lastName"].as_str().expect("lastName"))
        .collect();
    assert_eq!(names, vec!["Alonzo", "Zamora"]);
    assert_eq!(list["header"]["adviser"], json!("Ana Reyes"));

    let out = temp_dir("registrard-class-list-out");
    let written = sc.request_ok(
        "exports.classList",
        json!({ "sectionId": school.section_id, "outDir": out.to_string_lossy() }),
    );
    let text = std::fs::read_to_string(str_of(&written, "path")).expect("read class list");
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].ends_with(",Status"));
    // Status is the enrollment's, not the student record's "Active".
    assert_eq!(lines[1], "1,610000000002,Alonzo,Amy,,,Female,Enrolled");

    let summary = sc.request_ok("reports.enrollmentSummary", json!({}));
    assert_eq!(summary["total"], json!(2));
    let pending = summary["byStatus"]
        .as_array()
        .expect("byStatus")
        .iter()
        .find(|g| g["label"] == json!("Pending"))
        .cloned()
        .expect("pending group");
    assert_eq!(pending["count"], json!(1));
    let enrolled = summary["byStatus"]
        .as_array()
        .expect("byStatus")
        .iter()
        .find(|g| g["label"] == json!("Enrolled"))
        .cloned()
        .expect("enrolled group");
    assert_eq!(enrolled["count"], json!(2));
}

#[test]
fn exports_write_dated_csv_files() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-exports-files");
    let student = add_student(&mut sc, "620000000001", "Navarro", "Nina", "female");
    enroll_student(&mut sc, &school, &student);
    let out = temp_dir("registrard-exports-out");
    let out_dir = out.to_string_lossy().to_string();

    let cases = [
        ("exports.classList", "class-list-STEM-11-A-", 1),
        ("exports.sf1", "SF1-STEM-11-A-", 1),
        ("exports.sf5", "SF5-STEM-11-A-", 1),
        ("exports.masterlist", "student-masterlist-", 1),
        ("exports.enrollmentSummary", "enrollment-summary-", 0),
    ];
    for (method, prefix, min_rows) in cases {
        let written = sc.request_ok(method, json!({ "sectionId": school.section_id, "outDir": out_dir }));
        let path = std::path::PathBuf::from(str_of(&written, "path"));
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name")
            .to_string();
        assert!(name.starts_with(prefix), "{} wrote {}", method, name);
        assert!(name.ends_with(".csv"));
        // prefix + YYYY-MM-DD + .csv
        assert_eq!(name.len(), prefix.len() + 10 + 4, "{}", name);
        assert!(written["rows"].as_u64().unwrap_or(0) >= min_rows, "{}", method);
        let text = std::fs::read_to_string(&path).expect("read export");
        assert!(text.lines().count() >= 1 + min_rows as usize);
    }
}

#[test]
fn school_form_documents_carry_fixed_layouts_and_dated_names() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-reports-forms");
    let student = add_student(&mut sc, "630000000001", "Ocampo", "Olga", "female");
    let enrollment = enroll_student(&mut sc, &school, &student);

    let sf9 = sc.request_ok("reports.sf9", json!({ "enrollmentId": enrollment }));
    assert_eq!(sf9["layout"], json!({ "paper": "legal", "orientation": "portrait" }));
    let name = str_of(&sf9, "filename");
    assert!(name.starts_with("SF9-630000000001-") && name.ends_with(".pdf"), "{}", name);
    assert_eq!(name.len(), "SF9-630000000001-".len() + 8 + 4);

    let sf10 = sc.request_ok("reports.sf10", json!({ "studentId": student }));
    assert_eq!(sf10["layout"]["orientation"], json!("landscape"));
    assert_eq!(sf10["model"]["terms"].as_array().map(|t| t.len()), Some(1));
}
