use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, db_err, now_stamp, optional_str, require_row, required_str, required_text,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Params};
use serde_json::json;
use uuid::Uuid;

fn student_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let last_name: String = row.get(1)?;
    let first_name: String = row.get(2)?;
    let student_no: Option<String> = row.get(3)?;
    let active: i64 = row.get(4)?;
    Ok(json!({
        "id": id,
        "lastName": last_name,
        "firstName": first_name,
        "displayName": format!("{}, {}", last_name, first_name),
        "studentNo": student_no,
        "active": active != 0
    }))
}

fn query_students<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, student_json)?
        .collect::<Result<Vec<_>, _>>();
    rows
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let class_id = optional_str(req, "classId");
    let rows = match class_id.as_deref() {
        Some(cid) => query_students(
            conn,
            "SELECT s.id, s.last_name, s.first_name, s.student_no, s.active
             FROM students s
             JOIN enrollments e ON e.student_id = s.id
             WHERE e.class_id = ?
             ORDER BY s.last_name, s.first_name",
            [cid],
        ),
        None => query_students(
            conn,
            "SELECT id, last_name, first_name, student_no, active
             FROM students
             ORDER BY last_name, first_name",
            [],
        ),
    };

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match required_text(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match required_text(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_no = optional_str(req, "studentNo");
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, last_name, first_name, student_no, active, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &last_name,
            &first_name,
            &student_no,
            active as i64,
            now_stamp(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    if let Err(e) = require_row(
        conn,
        req,
        "SELECT 1 FROM students WHERE id = ?",
        &student_id,
        "student",
    ) {
        return e;
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (key, column) in [("lastName", "last_name = ?"), ("firstName", "first_name = ?")] {
        let Some(v) = patch.get(key) else {
            continue;
        };
        let Some(s) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(
                &req.id,
                "bad_params",
                format!("patch.{} must be a non-empty string", key),
                None,
            );
        };
        sets.push(column);
        values.push(Value::Text(s.to_string()));
    }
    if let Some(v) = patch.get("studentNo") {
        sets.push("student_no = ?");
        values.push(
            v.as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::Text(s.to_string()))
                .unwrap_or(Value::Null),
        );
    }
    if let Some(v) = patch.get("active") {
        let Some(b) = v.as_bool() else {
            return err(&req.id, "bad_params", "patch.active must be a boolean", None);
        };
        sets.push("active = ?");
        values.push(Value::Integer(b as i64));
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch has no recognised fields", None);
    }
    sets.push("updated_at = ?");
    values.push(Value::Text(now_stamp()));
    values.push(Value::Text(student_id));

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return db_err(req, "db_update_failed", e);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_row(
        conn,
        req,
        "SELECT 1 FROM students WHERE id = ?",
        &student_id,
        "student",
    ) {
        return e;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_tx_failed", e),
    };
    let steps: [(&str, &str); 3] = [
        ("scores", "DELETE FROM scores WHERE student_id = ?"),
        ("enrollments", "DELETE FROM enrollments WHERE student_id = ?"),
        ("students", "DELETE FROM students WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return db_err(req, "db_commit_failed", e);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_enrollments_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(enrolled) = req.params.get("enrolled").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing enrolled", None);
    };
    if let Err(e) = require_row(conn, req, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")
    {
        return e;
    }
    if let Err(e) = require_row(
        conn,
        req,
        "SELECT 1 FROM students WHERE id = ?",
        &student_id,
        "student",
    ) {
        return e;
    }

    let res = if enrolled {
        conn.execute(
            "INSERT OR IGNORE INTO enrollments(class_id, student_id, enrolled_at) VALUES(?, ?, ?)",
            (&class_id, &student_id, now_stamp()),
        )
    } else {
        // Scores are kept so re-enrolling restores the student's grade.
        conn.execute(
            "DELETE FROM enrollments WHERE class_id = ? AND student_id = ?",
            (&class_id, &student_id),
        )
    };
    if let Err(e) = res {
        return db_err(req, "db_update_failed", e);
    }

    ok(&req.id, json!({ "enrolled": enrolled }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "enrollments.set" => Some(handle_enrollments_set(state, req)),
        _ => None,
    }
}
