use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, db_err, now_stamp, optional_str, require_row, required_str, required_text,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_announcements_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "announcements": [] }));
    };
    let class_id = optional_str(req, "classId");

    // A class view also shows workspace-wide announcements (class_id NULL).
    let mut stmt = match conn.prepare(
        "SELECT id, class_id, title, body, created_at
         FROM announcements
         WHERE ?1 IS NULL OR class_id IS NULL OR class_id = ?1
         ORDER BY created_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let class_id: Option<String> = row.get(1)?;
            let title: String = row.get(2)?;
            let body: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "classId": class_id,
                "title": title,
                "body": body,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(announcements) => ok(&req.id, json!({ "announcements": announcements })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_announcements_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_text(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let body = match required_str(req, "body") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = optional_str(req, "classId");
    if let Some(cid) = class_id.as_deref() {
        if let Err(e) = require_row(conn, req, "SELECT 1 FROM classes WHERE id = ?", cid, "class")
        {
            return e;
        }
    }

    let announcement_id = Uuid::new_v4().to_string();
    let created_at = now_stamp();
    if let Err(e) = conn.execute(
        "INSERT INTO announcements(id, class_id, title, body, created_at) VALUES(?, ?, ?, ?, ?)",
        (&announcement_id, &class_id, &title, &body, &created_at),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "announcements" })),
        );
    }

    ok(
        &req.id,
        json!({ "announcementId": announcement_id, "createdAt": created_at }),
    )
}

fn handle_announcements_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let announcement_id = match required_str(req, "announcementId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.execute("DELETE FROM announcements WHERE id = ?", [&announcement_id]) {
        Ok(0) => err(&req.id, "not_found", "announcement not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => db_err(req, "db_delete_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "announcements.list" => Some(handle_announcements_list(state, req)),
        "announcements.create" => Some(handle_announcements_create(state, req)),
        "announcements.delete" => Some(handle_announcements_delete(state, req)),
        _ => None,
    }
}
