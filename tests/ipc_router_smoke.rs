mod test_support;

use serde_json::json;
use test_support::{error_code, temp_dir, Sidecar};

#[test]
fn health_answers_without_a_workspace() {
    let mut sc = Sidecar::spawn();
    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["workspacePath"], json!(null));
    assert_eq!(health["defaultRole"], json!("admin"));
}

#[test]
fn unknown_methods_are_not_implemented() {
    let mut sc = Sidecar::spawn();
    let resp = sc.request("classes.list", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(error_code(&resp), "not_implemented");
}

#[test]
fn data_methods_require_a_workspace() {
    let mut sc = Sidecar::spawn();
    let resp = sc.request("students.list", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_keeps_going() {
    let mut sc = Sidecar::spawn();
    let resp = sc.send_line("{not json");
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("bad_json"));
    sc.request_ok("health", json!({}));
}

#[test]
fn roles_gate_methods_before_dispatch() {
    let mut sc = Sidecar::spawn();
    let workspace = temp_dir("registrard-router-roles");
    sc.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let resp = sc.request_as("student", None, "students.list", json!({}));
    assert_eq!(error_code(&resp), "forbidden");

    let resp = sc.request_as("janitor", None, "students.list", json!({}));
    assert_eq!(error_code(&resp), "bad_params");

    let resp = sc.request_as("registrar", None, "users.list", json!({}));
    assert_eq!(error_code(&resp), "forbidden");

    let resp = sc.request_as("teacher", None, "settings.update", json!({ "settings": {} }));
    assert_eq!(error_code(&resp), "forbidden");

    sc.request_ok_as("registrar", None, "students.list", json!({}));
    sc.request_ok_as("teacher", None, "settings.get", json!({}));
    sc.request_ok_as("student", None, "calendar.active", json!({}));
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut sc = Sidecar::spawn();
    let workspace = temp_dir("registrard-router-smoke");
    sc.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));

    for method in [
        "settings.get",
        "schoolYears.list",
        "calendar.active",
        "users.list",
        "tracks.list",
        "subjects.list",
        "students.list",
        "enrollment.list",
        "enrollment.setupChecklist",
        "grades.sections",
        "reports.dashboard",
        "reports.masterlist",
    ] {
        let resp = sc.request(method, json!({}));
        assert_eq!(resp["ok"], json!(true), "{} -> {}", method, resp);
    }

    // Active-semester defaults fail cleanly before any year is active.
    let resp = sc.request("reports.enrollmentSummary", json!({}));
    assert_eq!(error_code(&resp), "not_found");
}
