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

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.gbbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let s = &mut stdin;
    let r = &mut reader;

    let health = request(s, r, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert!(health["result"]["workspacePath"].is_null());

    // Lists answer empty before a workspace is selected; writes do not.
    let classes = request(s, r, "1a", "classes.list", json!({}));
    assert_eq!(classes["result"]["classes"], json!([]));
    let blocked = request(s, r, "1b", "classes.create", json!({ "name": "Too early" }));
    assert_eq!(error_code(&blocked), "no_workspace");

    let _ = request(
        s,
        r,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let subject = request(
        s,
        r,
        "3",
        "subjects.create",
        json!({ "name": "Mathematics", "code": "MTH" }),
    );
    let subject_id = subject["result"]["subjectId"]
        .as_str()
        .expect("subjectId")
        .to_string();
    let created = request(
        s,
        r,
        "4",
        "classes.create",
        json!({ "name": "Smoke Class", "subjectId": subject_id }),
    );
    let class_id = created["result"]["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let student = request(
        s,
        r,
        "5",
        "students.create",
        json!({ "lastName": "Smoke", "firstName": "Student" }),
    );
    let student_id = student["result"]["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();

    let calls: Vec<(&str, serde_json::Value)> = vec![
        ("subjects.list", json!({})),
        ("classes.list", json!({})),
        ("students.list", json!({ "classId": class_id })),
        (
            "students.update",
            json!({ "studentId": student_id, "patch": { "firstName": "Updated" } }),
        ),
        (
            "enrollments.set",
            json!({ "classId": class_id, "studentId": student_id, "enrolled": true }),
        ),
        ("categories.list", json!({ "classId": class_id })),
        (
            "categories.create",
            json!({ "classId": class_id, "name": "Tests", "weight": 100 }),
        ),
        ("assessments.list", json!({ "classId": class_id })),
        ("scores.list", json!({ "assessmentId": "missing" })),
        ("announcements.list", json!({})),
        (
            "announcements.create",
            json!({ "title": "Welcome", "body": "Term starts Monday" }),
        ),
        ("grades.student", json!({ "classId": class_id, "studentId": student_id })),
        ("grades.class", json!({ "classId": class_id })),
        ("grades.trend", json!({ "classId": class_id, "studentId": student_id })),
        (
            "reports.studentModel",
            json!({ "classId": class_id, "studentId": student_id }),
        ),
        ("reports.classSummaryModel", json!({ "classId": class_id })),
        ("dashboard.summary", json!({})),
        (
            "backup.exportWorkspaceBundle",
            json!({
                "workspacePath": workspace.to_string_lossy(),
                "outPath": bundle_out.to_string_lossy()
            }),
        ),
        (
            "backup.importWorkspaceBundle",
            json!({
                "workspacePath": workspace.to_string_lossy(),
                "inPath": bundle_out.to_string_lossy()
            }),
        ),
        ("students.delete", json!({ "studentId": student_id })),
        ("classes.delete", json!({ "classId": class_id })),
        ("subjects.delete", json!({ "subjectId": subject_id })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("c{}", i);
        let resp = request(s, r, &id, method, params);
        assert_ne!(
            error_code(&resp),
            "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }

    let unknown = request(s, r, "99", "gradebook.frobnicate", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_line_gets_bad_json_without_id() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));
    assert!(value.get("id").is_none());

    // The sidecar keeps serving after a bad line.
    let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
    assert_eq!(health["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn numeric_log_json_env_still_starts_the_sidecar() {
    for value in ["1", "0", "yes"] {
        let mut child = Command::new(env!("CARGO_BIN_EXE_gradebookd"))
            .env("GRADEBOOKD_LOG_JSON", value)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn gradebookd");
        let mut stdin = child.stdin.take().expect("child stdin");
        let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

        let health = request(&mut stdin, &mut reader, "h", "health", json!({}));
        assert_eq!(health["ok"], json!(true), "GRADEBOOKD_LOG_JSON={}", value);

        drop(stdin);
        let _ = child.wait();
    }
}
