mod test_support;

use serde_json::json;
use test_support::{add_student, enroll_student, error_code, grade_ids, seed_school, Sidecar};

#[test]
fn weighted_final_grade_and_remarks_are_computed_on_save() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-grades-weighted");
    let passer = add_student(&mut sc, "200000000001", "Aquino", "Rosa", "female");
    let failer = add_student(&mut sc, "200000000002", "Bautista", "Leo", "male");
    enroll_student(&mut sc, &school, &passer);
    enroll_student(&mut sc, &school, &failer);

    let ids = grade_ids(&mut sc, &school, &school.oral_com_id);
    let grade_of = |student: &str| {
        ids.iter()
            .find(|(s, _)| s == student)
            .map(|(_, g)| g.clone())
            .expect("grade row")
    };
    let saved = sc.request_ok(
        "grades.save",
        json!({
            "sectionId": school.section_id,
            "subjectId": school.oral_com_id,
            "grades": [
                { "gradeId": grade_of(&passer), "midterm": 80, "finals": 90 },
                { "gradeId": grade_of(&failer), "midterm": 70, "finals": 72 },
            ],
        }),
    );
    assert_eq!(saved["updated"], json!(2));
    assert_eq!(saved["skippedLocked"], json!(0));

    let sheet = sc.request_ok(
        "grades.sheet",
        json!({ "sectionId": school.section_id, "subjectId": school.oral_com_id }),
    );
    let rows = sheet["rows"].as_array().expect("rows");
    let row_of = |student: &str| {
        rows.iter()
            .find(|r| r["studentId"] == json!(student))
            .expect("row")
    };
    assert_eq!(row_of(&passer)["finalGrade"], json!(86.0));
    assert_eq!(row_of(&passer)["remarks"], json!("passed"));
    assert_eq!(row_of(&failer)["finalGrade"], json!(71.2));
    assert_eq!(row_of(&failer)["remarks"], json!("failed"));
}

#[test]
fn a_missing_component_leaves_the_final_grade_empty() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-grades-partial");
    let student = add_student(&mut sc, "200000000003", "Castro", "Ivy", "female");
    enroll_student(&mut sc, &school, &student);
    let (_, grade_id) = grade_ids(&mut sc, &school, &school.gen_math_id).remove(0);

    sc.request_ok(
        "grades.save",
        json!({
            "sectionId": school.section_id,
            "subjectId": school.gen_math_id,
            "grades": [{ "gradeId": grade_id, "midterm": 85, "finals": null }],
        }),
    );
    let sheet = sc.request_ok(
        "grades.sheet",
        json!({ "sectionId": school.section_id, "subjectId": school.gen_math_id }),
    );
    assert_eq!(sheet["rows"][0]["midterm"], json!(85.0));
    assert_eq!(sheet["rows"][0]["finalGrade"], json!(null));
    assert_eq!(sheet["rows"][0]["remarks"], json!(null));
}

#[test]
fn out_of_range_grades_reject_the_whole_save() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-grades-range");
    let student = add_student(&mut sc, "200000000004", "Dizon", "Paz", "female");
    enroll_student(&mut sc, &school, &student);
    let (_, grade_id) = grade_ids(&mut sc, &school, &school.oral_com_id).remove(0);

    let resp = sc.request(
        "grades.save",
        json!({
            "sectionId": school.section_id,
            "subjectId": school.oral_com_id,
            "grades": [{ "gradeId": grade_id, "midterm": 101, "finals": 90 }],
        }),
    );
    assert_eq!(error_code(&resp), "validation_failed");
    assert!(resp["error"]["details"]["fields"]["grades.0.midterm"].is_array());

    let resp = sc.request(
        "grades.save",
        json!({
            "sectionId": school.section_id,
            "subjectId": school.gen_math_id,
            "grades": [{ "gradeId": grade_id, "midterm": 90, "finals": 90 }],
        }),
    );
    assert_eq!(error_code(&resp), "validation_failed");
}

#[test]
fn lock_and_unlock_are_idempotent_and_locked_grades_are_skipped() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-grades-lock");
    let student = add_student(&mut sc, "200000000005", "Estrada", "Noel", "male");
    enroll_student(&mut sc, &school, &student);
    let (_, grade_id) = grade_ids(&mut sc, &school, &school.oral_com_id).remove(0);
    let target = json!({ "sectionId": school.section_id, "subjectId": school.oral_com_id });

    let first = sc.request_ok("grades.lock", target.clone());
    let second = sc.request_ok("grades.lock", target.clone());
    assert_eq!(first["grades"], json!(1));
    assert_eq!(second["grades"], json!(1));

    let saved = sc.request_ok(
        "grades.save",
        json!({
            "sectionId": school.section_id,
            "subjectId": school.oral_com_id,
            "grades": [{ "gradeId": grade_id, "midterm": 90, "finals": 90 }],
        }),
    );
    assert_eq!(saved["updated"], json!(0));
    assert_eq!(saved["skippedLocked"], json!(1));

    sc.request_ok("grades.unlock", target.clone());
    sc.request_ok("grades.unlock", target);
    let saved = sc.request_ok(
        "grades.save",
        json!({
            "sectionId": school.section_id,
            "subjectId": school.oral_com_id,
            "grades": [{ "gradeId": grade_id, "midterm": 90, "finals": 90 }],
        }),
    );
    assert_eq!(saved["updated"], json!(1));
}

#[test]
fn teachers_reach_only_their_advised_sections_and_cannot_unlock() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-grades-teacher");
    let student = add_student(&mut sc, "200000000006", "Flores", "Gina", "female");
    enroll_student(&mut sc, &school, &student);
    let target = json!({ "sectionId": school.section_id, "subjectId": school.oral_com_id });
    let teacher = school.teacher_id.as_str();

    sc.request_ok_as("teacher", Some(teacher), "grades.sheet", target.clone());
    sc.request_ok_as("teacher", Some(teacher), "grades.lock", target.clone());

    let resp = sc.request_as("teacher", Some(teacher), "grades.unlock", target.clone());
    assert_eq!(error_code(&resp), "forbidden");

    let resp = sc.request_as("teacher", None, "grades.sheet", target.clone());
    assert_eq!(error_code(&resp), "forbidden");

    let other = sc.request_ok(
        "users.create",
        json!({ "name": "Carlo Mendoza", "email": "carlo@school.test", "role": "teacher" }),
    );
    let other_id = other["userId"].as_str().expect("userId").to_string();
    let resp = sc.request_as("teacher", Some(&other_id), "grades.sheet", target);
    assert_eq!(error_code(&resp), "forbidden");

    let mine = sc.request_ok_as("teacher", Some(teacher), "grades.sections", json!({}));
    assert_eq!(mine["sections"].as_array().map(|a| a.len()), Some(1));
    let theirs = sc.request_ok_as("teacher", Some(&other_id), "grades.sections", json!({}));
    assert_eq!(theirs["sections"], json!([]));
}
