mod test_support;

use serde_json::json;
use test_support::{add_student, seed_school, str_of, Sidecar};

fn seed_students(sc: &mut Sidecar, count: usize) -> Vec<String> {
    (1..=count)
        .map(|n| {
            add_student(
                sc,
                &format!("8000000000{:02}", n),
                &format!("Student{:02}", n),
                "Test",
                if n % 2 == 0 { "female" } else { "male" },
            )
        })
        .collect()
}

#[test]
fn students_list_pages_by_fifteen() {
    let mut sc = Sidecar::spawn();
    seed_school(&mut sc, "registrard-paging-students");
    let ids = seed_students(&mut sc, 17);

    let first = sc.request_ok("students.list", json!({}));
    assert_eq!(first["perPage"], json!(15));
    assert_eq!(first["total"], json!(17));
    assert_eq!(first["lastPage"], json!(2));
    assert_eq!(first["data"].as_array().expect("data").len(), 15);

    let second = sc.request_ok("students.list", json!({ "page": 2 }));
    assert_eq!(second["page"], json!(2));
    assert_eq!(second["total"], json!(17));
    assert_eq!(second["lastPage"], json!(2));
    let data = second["data"].as_array().expect("data");
    assert_eq!(data.len(), 2);
    assert_eq!(str_of(&data[0], "id"), ids[15]);
    assert_eq!(str_of(&data[1], "lastName"), "Student17");
}

#[test]
fn oversized_page_numbers_return_an_empty_page() {
    let mut sc = Sidecar::spawn();
    seed_school(&mut sc, "registrard-paging-huge");
    seed_students(&mut sc, 2);

    let huge = sc.request_ok("students.list", json!({ "page": i64::MAX }));
    assert_eq!(huge["data"], json!([]));
    assert_eq!(huge["total"], json!(2));
    assert_eq!(huge["lastPage"], json!(1));

    let masterlist = sc.request_ok(
        "reports.masterlist",
        json!({ "page": i64::MAX, "perPage": 500 }),
    );
    assert_eq!(masterlist["rows"], json!([]));
    let enrollments = sc.request_ok("enrollment.list", json!({ "page": i64::MAX }));
    assert_eq!(enrollments["data"], json!([]));

    // Still serving after the oversized requests.
    let again = sc.request_ok("students.list", json!({}));
    assert_eq!(again["total"], json!(2));
}

#[test]
fn masterlist_numbers_rows_across_pages() {
    let mut sc = Sidecar::spawn();
    seed_school(&mut sc, "registrard-paging-masterlist");
    seed_students(&mut sc, 12);

    let defaults = sc.request_ok("reports.masterlist", json!({}));
    assert_eq!(defaults["perPage"], json!(50));
    assert_eq!(defaults["lastPage"], json!(1));
    assert_eq!(defaults["rows"].as_array().expect("rows").len(), 12);

    let second = sc.request_ok("reports.masterlist", json!({ "page": 2, "perPage": 5 }));
    assert_eq!(second["total"], json!(12));
    assert_eq!(second["lastPage"], json!(3));
    let rows = second["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0][0], json!("6"));
    assert_eq!(rows[0][1], json!("800000000006"));
    assert_eq!(rows[4][0], json!("10"));
}

#[test]
fn enrollment_list_pages_by_fifteen() {
    let mut sc = Sidecar::spawn();
    let school = seed_school(&mut sc, "registrard-paging-enrollments");
    let ids = seed_students(&mut sc, 16);
    for id in &ids {
        sc.request_ok(
            "enrollment.create",
            json!({
                "studentId": id,
                "sectionId": school.section_id,
                "subjectIds": [school.oral_com_id, school.gen_math_id],
            }),
        );
    }

    let second = sc.request_ok("enrollment.list", json!({ "page": 2 }));
    assert_eq!(second["perPage"], json!(15));
    assert_eq!(second["total"], json!(16));
    assert_eq!(second["lastPage"], json!(2));
    assert_eq!(second["data"].as_array().expect("data").len(), 1);
}
