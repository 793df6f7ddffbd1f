use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_str, require_row, required_str, required_text};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.name,
           s.code,
           (SELECT COUNT(*) FROM classes c WHERE c.subject_id = s.id) AS class_count
         FROM subjects s
         ORDER BY s.name",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let code: Option<String> = row.get(2)?;
            let class_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "code": code,
                "classCount": class_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_text(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let code = optional_str(req, "code");

    let subject_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)",
        (&subject_id, &name, &code),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }

    ok(&req.id, json!({ "subjectId": subject_id, "name": name }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_row(
        conn,
        req,
        "SELECT 1 FROM subjects WHERE id = ?",
        &subject_id,
        "subject",
    ) {
        return e;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_tx_failed", e),
    };
    // Classes outlive their subject; they are only detached.
    if let Err(e) = tx.execute(
        "UPDATE classes SET subject_id = NULL WHERE subject_id = ?",
        [&subject_id],
    ) {
        let _ = tx.rollback();
        return db_err(req, "db_update_failed", e);
    }
    if let Err(e) = tx.execute("DELETE FROM subjects WHERE id = ?", [&subject_id]) {
        let _ = tx.rollback();
        return db_err(req, "db_delete_failed", e);
    }
    if let Err(e) = tx.commit() {
        return db_err(req, "db_commit_failed", e);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
