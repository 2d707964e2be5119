mod test_support;

use serde_json::json;
use test_support::{
    add_student, enroll_student, error_code, seed_school, str_of, temp_dir, Sidecar,
};

const STUDENT_HEADER: &str =
    "LRN,Last Name,First Name,Middle Name,Suffix,Birthdate,Gender,Address,Contact Number,Guardian Name,Guardian Contact";

#[test]
fn student_upload_reports_row_errors_and_confirm_inserts_valid_rows() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-import-students");
    add_student(&mut sc, "400000000009", "Existing", "Student", "male");

    let csv = school.workspace.join("students.csv");
    std::fs::write(
        &csv,
        format!(
            "{STUDENT_HEADER}\n\
             400000000001,Dela Cruz,Juan,Santos,,2008-05-15,male,\"Quezon City, NCR\",09171234567,Maria Dela Cruz,09179876543\n\
             400000000001,Duplicate,Row,,,2008-06-01,male,,,,\n\
             400000000009,Taken,Already,,,2008-07-01,female,,,,\n\
             123,Short,Lrn,,,2008-08-01,female,,,,\n\
             ,,,,,,,,,,\n"
        ),
    )
    .expect("write csv");

    let staged = sc.request_ok("imports.students.upload", json!({ "path": csv.to_string_lossy() }));
    assert_eq!(staged["validCount"], json!(1));
    assert_eq!(staged["invalidCount"], json!(3));
    let invalid = staged["invalid"].as_array().expect("invalid");
    assert_eq!(invalid[0]["row"], json!(3));
    assert_eq!(invalid[0]["errors"]["lrn"], json!(["LRN is duplicated within the file."]));
    assert_eq!(invalid[1]["row"], json!(4));
    assert_eq!(invalid[1]["errors"]["lrn"], json!(["LRN already exists in the database."]));
    assert_eq!(invalid[2]["row"], json!(5));
    assert_eq!(invalid[2]["data"]["last_name"], json!("Short"));

    // Nothing is written before confirm.
    let listed = sc.request_ok("students.list", json!({}));
    assert_eq!(listed["total"], json!(1));

    let batch_id = str_of(&staged, "batchId").to_string();
    let report = sc.request_ok("imports.students.confirm", json!({ "batchId": batch_id }));
    assert_eq!(report["imported"], json!(1));
    assert_eq!(report["errors"], json!([]));

    let listed = sc.request_ok("students.list", json!({ "search": "Dela Cruz" }));
    assert_eq!(listed["total"], json!(1));
    assert_eq!(listed["data"][0]["address"], json!("Quezon City, NCR"));

    let resp = sc.request("imports.students.confirm", json!({ "batchId": batch_id }));
    assert_eq!(error_code(&resp), "not_found");
}

#[test]
fn quoted_multiline_address_stays_in_its_row() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-import-multiline");

    let csv = school.workspace.join("students-multiline.csv");
    std::fs::write(
        &csv,
        format!(
            "{STUDENT_HEADER}\r\n\
             410000000001,Ramos,Lea,,,2008-05-15,female,\"Block 4\nQuezon City\",,,\r\n\
             410000000002,Santos,Ben,,,2008-06-01,male,Pasig,,,\r\n\
             123,Short,Lrn,,,2008-08-01,female,,,,\r\n"
        ),
    )
    .expect("write csv");

    let staged = sc.request_ok("imports.students.upload", json!({ "path": csv.to_string_lossy() }));
    assert_eq!(staged["validCount"], json!(2));
    assert_eq!(staged["invalidCount"], json!(1));
    assert_eq!(staged["invalid"][0]["row"], json!(4));

    let batch_id = str_of(&staged, "batchId").to_string();
    let report = sc.request_ok("imports.students.confirm", json!({ "batchId": batch_id }));
    assert_eq!(report["imported"], json!(2));

    let listed = sc.request_ok("students.list", json!({ "search": "Ramos" }));
    assert_eq!(listed["data"][0]["address"], json!("Block 4\nQuezon City"));
}

#[test]
fn upload_without_required_columns_fails() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-import-columns");
    let csv = school.workspace.join("bad.csv");
    std::fs::write(&csv, "lrn,first_name\n400000000001,Juan\n").expect("write csv");

    let resp = sc.request("imports.students.upload", json!({ "path": csv.to_string_lossy() }));
    assert_eq!(error_code(&resp), "import_failed");
}

#[test]
fn grade_import_keeps_partial_rows_and_reports_locked_grades() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-import-grades");
    let student = add_student(&mut sc, "500000000001", "Hernandez", "Kim", "female");
    enroll_student(&mut sc, &school, &student);
    sc.request_ok(
        "grades.lock",
        json!({ "sectionId": school.section_id, "subjectId": school.gen_math_id }),
    );

    let csv = school.workspace.join("grades.csv");
    std::fs::write(
        &csv,
        "lrn,subject_code,midterm,finals\n\
         500000000001,ORAL-COM,60,\n\
         500000000001,GEN-MATH,80,90\n\
         500000000001,NOPE-101,80,90\n\
         999999999999,ORAL-COM,80,90\n\
         500000000001,ORAL-COM,45,90\n",
    )
    .expect("write csv");

    let staged = sc.request_ok("imports.grades.upload", json!({ "path": csv.to_string_lossy() }));
    assert_eq!(staged["validCount"], json!(2));
    let invalid = staged["invalid"].as_array().expect("invalid");
    assert_eq!(invalid.len(), 3);
    assert_eq!(invalid[0]["errors"]["subject_code"], json!(["Subject with this code not found."]));
    assert_eq!(invalid[1]["errors"]["lrn"], json!(["Student with this LRN not found."]));
    assert_eq!(invalid[2]["errors"]["midterm"], json!(["The midterm must be between 50 and 100."]));

    let report = sc.request_ok(
        "imports.grades.confirm",
        json!({ "batchId": str_of(&staged, "batchId") }),
    );
    assert_eq!(report["imported"], json!(1));
    assert_eq!(report["errors"][0]["row"], json!(3));
    assert_eq!(report["errors"][0]["message"], json!("Grade is locked and cannot be modified."));

    let sheet = sc.request_ok(
        "grades.sheet",
        json!({ "sectionId": school.section_id, "subjectId": school.oral_com_id }),
    );
    assert_eq!(sheet["rows"][0]["midterm"], json!(60.0));
    assert_eq!(sheet["rows"][0]["finals"], json!(null));
    assert_eq!(sheet["rows"][0]["finalGrade"], json!(null));
}

#[test]
fn imported_grades_use_the_simple_average_by_default() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-import-policy");
    let student = add_student(&mut sc, "500000000002", "Ilagan", "Ramon", "male");
    enroll_student(&mut sc, &school, &student);

    let csv = school.workspace.join("grades.csv");
    std::fs::write(&csv, "lrn,subject_code,midterm,finals\n500000000002,ORAL-COM,80,91\n")
        .expect("write csv");
    let staged = sc.request_ok("imports.grades.upload", json!({ "path": csv.to_string_lossy() }));
    sc.request_ok("imports.grades.confirm", json!({ "batchId": str_of(&staged, "batchId") }));

    let sheet = sc.request_ok(
        "grades.sheet",
        json!({ "sectionId": school.section_id, "subjectId": school.oral_com_id }),
    );
    assert_eq!(sheet["rows"][0]["finalGrade"], json!(85.5));
    assert_eq!(sheet["rows"][0]["remarks"], json!("passed"));
}

#[test]
fn templates_are_written_with_a_header_and_sample_row() {
    let mut sc = Sidecar::spawn();
    let _school = seed_school(&mut sc, "registrard-import-template");
    let out = temp_dir("registrard-import-template-out");

    let written = sc.request_ok(
        "imports.template",
        json!({ "kind": "grades", "outDir": out.to_string_lossy() }),
    );
    let path = str_of(&written, "path");
    assert!(path.ends_with("grades-import-template.csv"));
    let text = std::fs::read_to_string(path).expect("read template");
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("lrn,subject_code,midterm,finals"));
    assert!(lines.next().is_some());
}
