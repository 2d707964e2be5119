mod test_support;

use serde_json::json;
use test_support::{error_code, temp_dir, Sidecar};

#[test]
fn settings_fall_back_to_defaults() {
    let mut sc = Sidecar::spawn();
    let workspace = temp_dir("registrard-settings-defaults");
    sc.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let got = sc.request_ok("settings.get", json!({}));
    assert_eq!(got["grading"]["passingGrade"], json!(75.0));
    assert_eq!(got["grading"]["midtermWeight"], json!(40.0));
    assert_eq!(got["grading"]["finalsWeight"], json!(60.0));
}

#[test]
fn settings_update_rejects_unknown_keys_and_bad_values_atomically() {
    let mut sc = Sidecar::spawn();
    let workspace = temp_dir("registrard-settings-update");
    sc.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let resp = sc.request("settings.update", json!({ "settings": { "favorite_color": "blue" } }));
    assert_eq!(error_code(&resp), "bad_params");

    let resp = sc.request(
        "settings.update",
        json!({ "settings": { "school_name": "Rizal High", "passing_grade": "lots" } }),
    );
    assert_eq!(error_code(&resp), "validation_failed");
    assert!(resp["error"]["details"]["fields"]["passing_grade"].is_array());
    let got = sc.request_ok("settings.get", json!({}));
    assert_ne!(got["settings"]["school_name"], json!("Rizal High"));

    let updated = sc.request_ok(
        "settings.update",
        json!({ "settings": { "school_name": "Rizal High", "passing_grade": 80 } }),
    );
    assert_eq!(updated["updated"], json!(2));
    let got = sc.request_ok("settings.get", json!({}));
    assert_eq!(got["settings"]["school_name"], json!("Rizal High"));
    assert_eq!(got["grading"]["passingGrade"], json!(80.0));
}
