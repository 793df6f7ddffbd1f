use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_str, require_row, required_str, required_text};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_assessments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "assessments": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           a.id,
           a.title,
           a.category_id,
           c.name,
           a.max_score,
           a.date,
           (SELECT COUNT(*) FROM scores sc
             WHERE sc.assessment_id = a.id AND sc.raw_score IS NOT NULL) AS graded_count
         FROM assessments a
         LEFT JOIN categories c ON c.id = a.category_id
         WHERE a.class_id = ?
         ORDER BY a.date IS NULL, a.date, a.title",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let category_id: Option<String> = row.get(2)?;
            let category_name: Option<String> = row.get(3)?;
            let max_score: f64 = row.get(4)?;
            let date: Option<String> = row.get(5)?;
            let graded_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "title": title,
                "categoryId": category_id,
                "categoryName": category_name,
                "maxScore": max_score,
                "date": date,
                "gradedCount": graded_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assessments) => ok(&req.id, json!({ "assessments": assessments })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_assessments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let title = match required_text(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let max_score = match req.params.get("maxScore").and_then(|v| v.as_f64()) {
        Some(v) if v > 0.0 && v.is_finite() => v,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "maxScore must be a number greater than 0",
                None,
            )
        }
    };
    let date = match optional_str(req, "date") {
        None => None,
        Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(d) => Some(d.format("%Y-%m-%d").to_string()),
            Err(_) => {
                return err(
                    &req.id,
                    "bad_params",
                    "date must be YYYY-MM-DD",
                    Some(json!({ "date": raw })),
                )
            }
        },
    };
    if let Err(e) = require_row(conn, req, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")
    {
        return e;
    }

    let category_id = optional_str(req, "categoryId");
    if let Some(cid) = category_id.as_deref() {
        let owner: Option<String> = match conn
            .query_row("SELECT class_id FROM categories WHERE id = ?", [cid], |r| {
                r.get(0)
            })
            .optional()
        {
            Ok(v) => v,
            Err(e) => return db_err(req, "db_query_failed", e),
        };
        match owner {
            None => return err(&req.id, "not_found", "category not found", None),
            Some(owner) if owner != class_id => {
                return err(
                    &req.id,
                    "bad_params",
                    "category belongs to a different class",
                    Some(json!({ "categoryId": cid })),
                )
            }
            Some(_) => {}
        }
    }

    let assessment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assessments(id, class_id, category_id, title, max_score, date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &assessment_id,
            &class_id,
            &category_id,
            &title,
            max_score,
            &date,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assessments" })),
        );
    }

    ok(&req.id, json!({ "assessmentId": assessment_id }))
}

fn handle_assessments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_row(
        conn,
        req,
        "SELECT 1 FROM assessments WHERE id = ?",
        &assessment_id,
        "assessment",
    ) {
        return e;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_tx_failed", e),
    };
    if let Err(e) = tx.execute(
        "DELETE FROM scores WHERE assessment_id = ?",
        [&assessment_id],
    ) {
        let _ = tx.rollback();
        return db_err(req, "db_delete_failed", e);
    }
    if let Err(e) = tx.execute("DELETE FROM assessments WHERE id = ?", [&assessment_id]) {
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
        "assessments.list" => Some(handle_assessments_list(state, req)),
        "assessments.create" => Some(handle_assessments_create(state, req)),
        "assessments.delete" => Some(handle_assessments_delete(state, req)),
        _ => None,
    }
}
