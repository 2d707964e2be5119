mod test_support;

use serde_json::{json, Value};
use test_support::{add_student, enroll_student, error_code, grade_ids, seed_school, str_of, Sidecar};

fn entries(resp: &Value) -> &Vec<Value> {
    resp["data"].as_array().expect("data")
}

fn create_admin(sc: &mut Sidecar) -> String {
    let admin = sc.request_ok(
        "users.create",
        json!({ "name": "Marites Cruz", "email": "marites.cruz@school.test", "role": "admin" }),
    );
    str_of(&admin, "userId").to_string()
}

#[test]
fn student_changes_are_logged_with_the_acting_user() {
    let mut sc = Sidecar::spawn();
    seed_school(&mut sc, "registrard-audit-students");
    let admin_id = create_admin(&mut sc);
    let admin = Some(admin_id.as_str());

    let created = sc.request_ok_as(
        "admin",
        admin,
        "students.create",
        json!({
            "student": {
                "lrn": "700000000001",
                "lastName": "Garcia",
                "firstName": "Lea",
                "birthdate": "2008-01-20",
                "gender": "female",
            }
        }),
    );
    let student_id = str_of(&created, "studentId").to_string();

    let updated_student = json!({
        "lrn": "700000000001",
        "lastName": "Garcia",
        "firstName": "Lea",
        "birthdate": "2008-01-20",
        "gender": "female",
        "address": "Marikina City",
    });
    sc.request_ok_as(
        "admin",
        admin,
        "students.update",
        json!({ "studentId": student_id, "student": updated_student.clone() }),
    );
    // Saving the same values again leaves no entry.
    sc.request_ok_as(
        "admin",
        admin,
        "students.update",
        json!({ "studentId": student_id, "student": updated_student }),
    );

    let log = sc.request_ok(
        "audit.list",
        json!({ "modelType": "student", "modelId": student_id }),
    );
    assert_eq!(log["total"], json!(2));
    let rows = entries(&log);

    let update = &rows[0];
    assert_eq!(update["action"], json!("updated"));
    assert_eq!(update["userId"], json!(admin_id));
    assert_eq!(update["userName"], json!("Marites Cruz"));
    assert_eq!(update["oldValues"], json!({ "address": null }));
    assert_eq!(update["newValues"], json!({ "address": "Marikina City" }));

    let create = &rows[1];
    assert_eq!(create["action"], json!("created"));
    assert_eq!(create["oldValues"], json!(null));
    assert_eq!(create["newValues"]["lrn"], json!("700000000001"));
    assert_eq!(create["newValues"]["status"], json!("active"));

    sc.request_ok_as("admin", admin, "students.delete", json!({ "studentId": student_id }));
    let latest = sc.request_ok(
        "audit.list",
        json!({ "modelType": "student", "modelId": student_id, "perPage": 1 }),
    );
    assert_eq!(latest["total"], json!(3));
    assert_eq!(entries(&latest)[0]["oldValues"], json!({ "status": "active" }));
    assert_eq!(entries(&latest)[0]["newValues"], json!({ "status": "dropped" }));
}

#[test]
fn grade_saves_and_section_deletes_are_logged() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-audit-grades");
    let student = add_student(&mut sc, "700000000002", "Lopez", "Nico", "male");
    enroll_student(&mut sc, &school, &student);
    let (_, grade_id) = grade_ids(&mut sc, &school, &school.oral_com_id).remove(0);

    sc.request_ok_as(
        "teacher",
        Some(&school.teacher_id),
        "grades.save",
        json!({
            "sectionId": school.section_id,
            "subjectId": school.oral_com_id,
            "grades": [{ "gradeId": grade_id, "midterm": 80, "finals": 90 }],
        }),
    );
    let log = sc.request_ok(
        "audit.list",
        json!({ "modelType": "grade", "modelId": grade_id, "action": "updated" }),
    );
    assert_eq!(log["total"], json!(1));
    let entry = &entries(&log)[0];
    assert_eq!(entry["userId"], json!(school.teacher_id));
    assert_eq!(entry["userName"], json!("Ana Reyes"));
    assert_eq!(entry["oldValues"]["midterm"], json!(null));
    assert_eq!(entry["newValues"]["midterm"], json!(80.0));
    assert_eq!(entry["newValues"]["final_grade"], json!(86.0));
    assert_eq!(entry["newValues"]["remarks"], json!("passed"));

    let by_teacher = sc.request_ok("audit.list", json!({ "actorId": school.teacher_id }));
    assert_eq!(by_teacher["total"], json!(1));

    let spare = sc.request_ok(
        "sections.create",
        json!({ "name": "STEM 11-Z", "strandId": school.strand_id, "gradeLevel": 11, "maxCapacity": 30 }),
    );
    let spare_id = str_of(&spare, "sectionId").to_string();
    sc.request_ok("sections.delete", json!({ "sectionId": spare_id }));
    let log = sc.request_ok("audit.list", json!({ "modelType": "section", "modelId": spare_id }));
    let rows = entries(&log);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["action"], json!("deleted"));
    assert_eq!(rows[0]["oldValues"]["name"], json!("STEM 11-Z"));
    assert_eq!(rows[0]["newValues"], json!(null));
    assert_eq!(rows[1]["action"], json!("created"));
    // No acting user was sent.
    assert_eq!(rows[0]["userId"], json!(null));
}

#[test]
fn enrollment_status_changes_are_logged() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-audit-enrollment");
    let student = add_student(&mut sc, "700000000003", "Mendoza", "Ara", "female");
    let enrollment_id = enroll_student(&mut sc, &school, &student);

    let log = sc.request_ok(
        "audit.list",
        json!({ "modelType": "enrollment", "modelId": enrollment_id }),
    );
    let rows = entries(&log);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["action"], json!("updated"));
    assert_eq!(rows[0]["oldValues"]["status"], json!("pending"));
    assert_eq!(rows[0]["newValues"]["status"], json!("enrolled"));
    assert_eq!(rows[1]["action"], json!("created"));

    // One created entry per seeded grade row.
    let grades = sc.request_ok("audit.list", json!({ "modelType": "grade", "action": "created" }));
    assert_eq!(grades["total"], json!(2));
}

#[test]
fn only_admins_read_the_log() {
    let mut sc = Sidecar::spawn();
    seed_school(&mut sc, "registrard-audit-access");

    let resp = sc.request_as("registrar", None, "audit.list", json!({}));
    assert_eq!(error_code(&resp), "forbidden");
    let resp = sc.request_as("teacher", None, "audit.list", json!({}));
    assert_eq!(error_code(&resp), "forbidden");

    let resp = sc.request("audit.list", json!({ "modelType": "setting" }));
    assert_eq!(error_code(&resp), "bad_params");
    let resp = sc.request("audit.list", json!({ "action": "viewed" }));
    assert_eq!(error_code(&resp), "bad_params");

    // seed_school created a teacher account and a section.
    let users = sc.request_ok("audit.list", json!({ "modelType": "user" }));
    assert_eq!(users["total"], json!(1));
    assert_eq!(users["perPage"], json!(15));
}
