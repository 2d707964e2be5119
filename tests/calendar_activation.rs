mod test_support;

use serde_json::json;
use test_support::{error_code, seed_school, str_of, Sidecar};

#[test]
fn new_school_year_comes_with_two_semesters() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-calendar-semesters");

    let years = sc.request_ok("schoolYears.list", json!({}));
    let year = &years["schoolYears"][0];
    assert_eq!(year["id"], json!(school.year_id));
    assert_eq!(year["isActive"], json!(true));
    let numbers: Vec<i64> = year["semesters"]
        .as_array()
        .expect("semesters")
        .iter()
        .map(|s| s["number"].as_i64().expect("number"))
        .collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[test]
fn duplicate_school_year_names_are_rejected() {
    let mut sc = Sidecar::spawn();
    let _school = seed_school(&mut sc, "registrard-calendar-dupe");
    let resp = sc.request("schoolYears.create", json!({ "name": "2025-2026" }));
    assert_eq!(error_code(&resp), "validation_failed");
    assert!(resp["error"]["details"]["fields"]["name"].is_array());
}

#[test]
fn activating_a_year_points_at_its_first_semester_and_closes_enrollment() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-calendar-activate");

    let toggled = sc.request_ok(
        "semesters.toggleEnrollment",
        json!({ "semesterId": school.semester_id }),
    );
    assert_eq!(toggled["enrollmentOpen"], json!(true));
    let active = sc.request_ok("calendar.active", json!({}));
    assert_eq!(active["active"]["enrollmentOpen"], json!(true));

    let next = sc.request_ok("schoolYears.create", json!({ "name": "2026-2027" }));
    let next_id = str_of(&next, "schoolYearId").to_string();
    let activated = sc.request_ok("schoolYears.activate", json!({ "schoolYearId": next_id }));
    assert_eq!(activated["active"]["schoolYearId"], json!(next_id));
    assert_eq!(activated["active"]["semesterNumber"], json!(1));
    assert_eq!(activated["active"]["enrollmentOpen"], json!(false));

    // Enrollment on the old year's semester was closed as well.
    let years = sc.request_ok("schoolYears.list", json!({}));
    for year in years["schoolYears"].as_array().expect("years") {
        for sem in year["semesters"].as_array().expect("semesters") {
            assert_eq!(sem["enrollmentOpen"], json!(false));
        }
    }
}

#[test]
fn activating_a_semester_moves_the_active_year_with_it() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-calendar-semester");

    let active = sc.request_ok(
        "semesters.activate",
        json!({ "semesterId": school.second_semester_id }),
    );
    assert_eq!(active["active"]["semesterId"], json!(school.second_semester_id));
    assert_eq!(active["active"]["schoolYearId"], json!(school.year_id));
    assert_eq!(active["active"]["semesterLabel"], json!("2nd Semester"));

    let resp = sc.request("semesters.activate", json!({ "semesterId": "missing" }));
    assert_eq!(error_code(&resp), "not_found");
}
