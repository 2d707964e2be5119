mod test_support;

use serde_json::json;
use test_support::{error_code, seed_school, str_of, Sidecar};

#[test]
fn profile_is_created_on_first_save_and_replaced_after() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-teachers-profile");

    let fresh = sc.request_ok("teachers.get", json!({ "teacherId": school.teacher_id }));
    assert_eq!(fresh["teacher"]["name"], json!("Ana Reyes"));
    assert_eq!(fresh["profile"], json!(null));
    assert_eq!(fresh["trainings"], json!([]));

    let saved = sc.request_ok(
        "teachers.updateProfile",
        json!({
            "teacherId": school.teacher_id,
            "profile": {
                "employeeId": "EMP-0042",
                "positionTitle": "Teacher II",
                "birthdate": "03/14/1990",
                "yearGraduated": 2011,
                "specialization": "Mathematics",
                "teachingHoursPerWeek": 30,
            },
        }),
    );
    assert_eq!(saved["profile"]["employeeId"], json!("EMP-0042"));
    assert_eq!(saved["profile"]["birthdate"], json!("1990-03-14"));
    assert_eq!(saved["profile"]["yearGraduated"], json!(2011));

    let replaced = sc.request_ok(
        "teachers.updateProfile",
        json!({
            "teacherId": school.teacher_id,
            "profile": { "employeeId": "EMP-0042", "positionTitle": "Master Teacher I" },
        }),
    );
    assert_eq!(replaced["profile"]["positionTitle"], json!("Master Teacher I"));
    assert_eq!(replaced["profile"]["specialization"], json!(null));
}

#[test]
fn profile_fields_are_validated() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-teachers-validation");

    let resp = sc.request(
        "teachers.updateProfile",
        json!({
            "teacherId": school.teacher_id,
            "profile": {
                "employeeId": "E".repeat(21),
                "dateHired": "someday",
                "yearGraduated": 1900,
                "teachingHoursPerWeek": 61,
            },
        }),
    );
    assert_eq!(error_code(&resp), "validation_failed");
    let fields = &resp["error"]["details"]["fields"];
    for key in ["employee_id", "date_hired", "year_graduated", "teaching_hours_per_week"] {
        assert!(fields.get(key).is_some(), "expected an error for {key}: {fields}");
    }

    let after = sc.request_ok("teachers.get", json!({ "teacherId": school.teacher_id }));
    assert_eq!(after["profile"], json!(null));
}

#[test]
fn trainings_are_added_listed_and_removed() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-teachers-trainings");

    let older = sc.request_ok(
        "teachers.addTraining",
        json!({
            "teacherId": school.teacher_id,
            "training": { "title": "Division INSET", "type": "Seminar", "dateFrom": "2024-06-03", "dateTo": "2024-06-07", "hours": 40 },
        }),
    );
    let newer = sc.request_ok(
        "teachers.addTraining",
        json!({
            "teacherId": school.teacher_id,
            "training": { "title": "Blended Learning Workshop", "dateFrom": "2025-01-10", "dateTo": "2025-01-10", "hours": 8 },
        }),
    );

    let shown = sc.request_ok("teachers.get", json!({ "teacherId": school.teacher_id }));
    let trainings = shown["trainings"].as_array().expect("trainings");
    assert_eq!(trainings.len(), 2);
    assert_eq!(trainings[0]["id"], newer["trainingId"]);
    assert_eq!(trainings[1]["type"], json!("Seminar"));
    assert_eq!(trainings[1]["hours"], json!(40.0));

    let bad = sc.request(
        "teachers.addTraining",
        json!({
            "teacherId": school.teacher_id,
            "training": { "dateFrom": "2025-02-10", "dateTo": "2025-02-01" },
        }),
    );
    assert_eq!(error_code(&bad), "validation_failed");
    let fields = &bad["error"]["details"]["fields"];
    assert!(fields.get("title").is_some());
    assert!(fields.get("date_to").is_some());

    sc.request_ok(
        "teachers.removeTraining",
        json!({ "teacherId": school.teacher_id, "trainingId": str_of(&older, "trainingId") }),
    );
    let again = sc.request(
        "teachers.removeTraining",
        json!({ "teacherId": school.teacher_id, "trainingId": str_of(&older, "trainingId") }),
    );
    assert_eq!(error_code(&again), "not_found");

    let listed = sc.request_ok("teachers.list", json!({}));
    assert_eq!(listed["data"][0]["trainingCount"], json!(1));
}

#[test]
fn list_searches_name_email_and_employee_id() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-teachers-list");
    sc.request_ok(
        "users.create",
        json!({ "name": "Ben Torres", "email": "ben.torres@school.test", "role": "teacher" }),
    );
    sc.request_ok(
        "users.create",
        json!({ "name": "Carla Diaz", "email": "carla.diaz@school.test", "role": "registrar" }),
    );
    sc.request_ok(
        "teachers.updateProfile",
        json!({ "teacherId": school.teacher_id, "profile": { "employeeId": "EMP-7781" } }),
    );

    let all = sc.request_ok("teachers.list", json!({}));
    assert_eq!(all["total"], json!(2));
    assert_eq!(all["perPage"], json!(15));

    let by_employee = sc.request_ok("teachers.list", json!({ "search": "7781" }));
    assert_eq!(by_employee["total"], json!(1));
    assert_eq!(by_employee["data"][0]["name"], json!("Ana Reyes"));

    let by_email = sc.request_ok("teachers.list", json!({ "search": "torres@" }));
    assert_eq!(by_email["data"][0]["employeeId"], json!(null));
}

#[test]
fn non_teacher_accounts_have_no_teacher_record() {
    let mut sc = Sidecar::spawn();
    seed_school(&mut sc, "registrard-teachers-missing");
    let registrar = sc.request_ok(
        "users.create",
        json!({ "name": "Dina Ramos", "email": "dina.ramos@school.test", "role": "registrar" }),
    );
    let registrar_id = str_of(&registrar, "userId");

    let resp = sc.request("teachers.get", json!({ "teacherId": registrar_id }));
    assert_eq!(error_code(&resp), "not_found");
    let resp = sc.request(
        "teachers.addTraining",
        json!({ "teacherId": registrar_id, "training": { "title": "Records Management" } }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let resp = sc.request_as("teacher", None, "teachers.list", json!({}));
    assert_eq!(error_code(&resp), "forbidden");
    let ok = sc.request_as("registrar", None, "teachers.list", json!({}));
    assert_eq!(ok["ok"], json!(true));
}
