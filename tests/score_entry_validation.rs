use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn created_id(result: &serde_json::Value, key: &str) -> String {
    result
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, result))
        .to_string()
}

#[test]
fn score_entry_rejects_out_of_range_and_keeps_stored_value() {
    let workspace = temp_dir("gradebook-score-range");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = &mut stdin;
    let r = &mut reader;
    let _ = request_ok(
        s,
        r,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let class = request_ok(s, r, "2", "classes.create", json!({ "name": "Chem" }));
    let class_id = created_id(&class, "classId");
    let student = request_ok(
        s,
        r,
        "3",
        "students.create",
        json!({ "lastName": "Curie", "firstName": "Marie" }),
    );
    let student_id = created_id(&student, "studentId");
    let assessment = request_ok(
        s,
        r,
        "4",
        "assessments.create",
        json!({ "classId": class_id, "title": "Lab 1", "maxScore": 25 }),
    );
    let assessment_id = created_id(&assessment, "assessmentId");

    let not_enrolled = request(
        s,
        r,
        "5",
        "scores.set",
        json!({ "assessmentId": assessment_id, "studentId": student_id, "rawScore": 10 }),
    );
    assert_eq!(error_code(&not_enrolled), "not_enrolled");

    let _ = request_ok(
        s,
        r,
        "6",
        "enrollments.set",
        json!({ "classId": class_id, "studentId": student_id, "enrolled": true }),
    );
    let _ = request_ok(
        s,
        r,
        "7",
        "scores.set",
        json!({ "assessmentId": assessment_id, "studentId": student_id, "rawScore": 20 }),
    );

    for (i, bad) in [json!(25.5), json!(-1), json!("twenty")].into_iter().enumerate() {
        let resp = request(
            s,
            r,
            &format!("8-{}", i),
            "scores.set",
            json!({ "assessmentId": assessment_id, "studentId": student_id, "rawScore": bad }),
        );
        assert_eq!(resp["ok"], json!(false), "accepted {}", bad);
        let code = error_code(&resp);
        assert!(
            code == "invalid_score" || code == "bad_params",
            "unexpected code {} for {}",
            code,
            bad
        );
    }
    let over = request(
        s,
        r,
        "9",
        "scores.set",
        json!({ "assessmentId": assessment_id, "studentId": student_id, "rawScore": 30 }),
    );
    assert_eq!(error_code(&over), "invalid_score");
    assert_eq!(over["error"]["details"]["maxScore"].as_f64(), Some(25.0));

    let listed = request_ok(
        s,
        r,
        "10",
        "scores.list",
        json!({ "assessmentId": assessment_id }),
    );
    let rows = listed["scores"].as_array().expect("scores");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["rawScore"].as_f64(), Some(20.0));

    let unknown = request(
        s,
        r,
        "10b",
        "scores.list",
        json!({ "assessmentId": "no-such-assessment" }),
    );
    assert_eq!(error_code(&unknown), "not_found");

    // Boundary values are accepted; null clears back to ungraded.
    let _ = request_ok(
        s,
        r,
        "11",
        "scores.set",
        json!({ "assessmentId": assessment_id, "studentId": student_id, "rawScore": 25 }),
    );
    let _ = request_ok(
        s,
        r,
        "12",
        "scores.set",
        json!({ "assessmentId": assessment_id, "studentId": student_id, "rawScore": 0 }),
    );
    let _ = request_ok(
        s,
        r,
        "13",
        "scores.set",
        json!({ "assessmentId": assessment_id, "studentId": student_id, "rawScore": null }),
    );
    let listed = request_ok(
        s,
        r,
        "14",
        "scores.list",
        json!({ "assessmentId": assessment_id }),
    );
    assert!(listed["scores"][0]["rawScore"].is_null());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn category_and_assessment_inputs_are_validated() {
    let workspace = temp_dir("gradebook-entry-validation");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = &mut stdin;
    let r = &mut reader;
    let _ = request_ok(
        s,
        r,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(s, r, "2", "classes.create", json!({ "name": "Bio" }));
    let class_id = created_id(&class, "classId");
    let other = request_ok(s, r, "3", "classes.create", json!({ "name": "Physics" }));
    let other_id = created_id(&other, "classId");

    for (i, weight) in [json!(0), json!(-10), json!(100.01), json!("heavy")]
        .into_iter()
        .enumerate()
    {
        let resp = request(
            s,
            r,
            &format!("4-{}", i),
            "categories.create",
            json!({ "classId": class_id, "name": format!("W{}", i), "weight": weight }),
        );
        assert_eq!(error_code(&resp), "bad_params", "accepted weight {}", weight);
    }

    let cat = request_ok(
        s,
        r,
        "5",
        "categories.create",
        json!({ "classId": other_id, "name": "Labs", "weight": 100 }),
    );
    let other_cat_id = created_id(&cat, "categoryId");

    let bad_update = request(
        s,
        r,
        "6",
        "categories.update",
        json!({ "categoryId": other_cat_id, "patch": { "weight": 150 } }),
    );
    assert_eq!(error_code(&bad_update), "bad_params");

    let wrong_class = request(
        s,
        r,
        "7",
        "assessments.create",
        json!({ "classId": class_id, "categoryId": other_cat_id, "title": "X", "maxScore": 10 }),
    );
    assert_eq!(error_code(&wrong_class), "bad_params");

    let zero_max = request(
        s,
        r,
        "8",
        "assessments.create",
        json!({ "classId": class_id, "title": "Y", "maxScore": 0 }),
    );
    assert_eq!(error_code(&zero_max), "bad_params");

    let bad_date = request(
        s,
        r,
        "9",
        "assessments.create",
        json!({ "classId": class_id, "title": "Z", "maxScore": 10, "date": "10/01/2024" }),
    );
    assert_eq!(error_code(&bad_date), "bad_params");

    let missing_class = request(
        s,
        r,
        "10",
        "categories.create",
        json!({ "classId": "nope", "name": "Q", "weight": 50 }),
    );
    assert_eq!(error_code(&missing_class), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
