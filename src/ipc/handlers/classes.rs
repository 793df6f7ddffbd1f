use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, db_err, now_stamp, optional_str, require_row, required_str, required_text,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.subject_id,
           s.name,
           (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM assessments a WHERE a.class_id = c.id) AS assessment_count
         FROM classes c
         LEFT JOIN subjects s ON s.id = c.subject_id
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let subject_id: Option<String> = row.get(2)?;
            let subject_name: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let assessment_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "subjectId": subject_id,
                "subjectName": subject_name,
                "studentCount": student_count,
                "assessmentCount": assessment_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_text(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = optional_str(req, "subjectId");
    if let Some(sid) = subject_id.as_deref() {
        if let Err(e) = require_row(conn, req, "SELECT 1 FROM subjects WHERE id = ?", sid, "subject")
        {
            return e;
        }
    }

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, subject_id, created_at) VALUES(?, ?, ?, ?)",
        (&class_id, &name, &subject_id, now_stamp()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(&req.id, json!({ "classId": class_id, "name": name }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_row(conn, req, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")
    {
        return e;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_tx_failed", e),
    };

    // Dependency order; the schema has no ON DELETE CASCADE.
    let steps: [(&str, &str); 6] = [
        (
            "scores",
            "DELETE FROM scores
             WHERE assessment_id IN (SELECT id FROM assessments WHERE class_id = ?)",
        ),
        ("assessments", "DELETE FROM assessments WHERE class_id = ?"),
        ("categories", "DELETE FROM categories WHERE class_id = ?"),
        ("enrollments", "DELETE FROM enrollments WHERE class_id = ?"),
        ("announcements", "DELETE FROM announcements WHERE class_id = ?"),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&class_id]) {
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

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
