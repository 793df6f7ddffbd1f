use crate::grade;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, require_row, required_str, required_text};
use crate::ipc::types::{AppState, Request};
use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde_json::json;
use uuid::Uuid;

const WEIGHT_EPSILON: f64 = 1e-9;

fn parse_weight(req: &Request, raw: Option<&serde_json::Value>) -> Result<f64, serde_json::Value> {
    let Some(weight) = raw.and_then(|v| v.as_f64()) else {
        return Err(err(&req.id, "bad_params", "weight must be a number", None));
    };
    grade::validate_weight("", weight).map_err(|_| {
        err(
            &req.id,
            "bad_params",
            "weight must be greater than 0 and at most 100",
            Some(json!({ "weight": weight })),
        )
    })?;
    Ok(weight)
}

fn handle_categories_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(conn) = state.db.as_ref() else {
        return ok(
            &req.id,
            json!({ "categories": [], "totalActiveWeight": 0.0, "weightsComplete": false }),
        );
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.weight,
           c.is_active,
           c.sort_order,
           (SELECT COUNT(*) FROM assessments a WHERE a.category_id = c.id) AS assessment_count
         FROM categories c
         WHERE c.class_id = ?
         ORDER BY c.sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let weight: f64 = row.get(2)?;
            let is_active: i64 = row.get(3)?;
            let sort_order: i64 = row.get(4)?;
            let assessment_count: i64 = row.get(5)?;
            Ok((
                weight,
                is_active != 0,
                json!({
                    "id": id,
                    "name": name,
                    "weight": weight,
                    "isActive": is_active != 0,
                    "sortOrder": sort_order,
                    "assessmentCount": assessment_count
                }),
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(rows) => {
            let total: f64 = rows
                .iter()
                .filter(|(_, active, _)| *active)
                .map(|(w, _, _)| *w)
                .sum();
            let categories: Vec<serde_json::Value> = rows.into_iter().map(|(_, _, v)| v).collect();
            ok(
                &req.id,
                json!({
                    "categories": categories,
                    "totalActiveWeight": total,
                    "weightsComplete": (total - 100.0).abs() < WEIGHT_EPSILON
                }),
            )
        }
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_categories_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_text(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let weight = match parse_weight(req, req.params.get("weight")) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let is_active = req
        .params
        .get("isActive")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if let Err(e) = require_row(conn, req, "SELECT 1 FROM classes WHERE id = ?", &class_id, "class")
    {
        return e;
    }

    let next_sort: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM categories WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let category_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO categories(id, class_id, name, weight, is_active, sort_order)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &category_id,
            &class_id,
            &name,
            weight,
            is_active as i64,
            next_sort,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "categories" })),
        );
    }

    ok(&req.id, json!({ "categoryId": category_id }))
}

fn handle_categories_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match required_str(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    if let Err(e) = require_row(
        conn,
        req,
        "SELECT 1 FROM categories WHERE id = ?",
        &category_id,
        "category",
    ) {
        return e;
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    if let Some(v) = patch.get("name") {
        let Some(name) = v.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "patch.name must be a non-empty string", None);
        };
        sets.push("name = ?");
        values.push(Value::Text(name.to_string()));
    }
    if patch.contains_key("weight") {
        let weight = match parse_weight(req, patch.get("weight")) {
            Ok(v) => v,
            Err(e) => return e,
        };
        sets.push("weight = ?");
        values.push(Value::Real(weight));
    }
    if let Some(v) = patch.get("isActive") {
        let Some(b) = v.as_bool() else {
            return err(&req.id, "bad_params", "patch.isActive must be a boolean", None);
        };
        sets.push("is_active = ?");
        values.push(Value::Integer(b as i64));
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch has no recognised fields", None);
    }
    values.push(Value::Text(category_id));

    let sql = format!("UPDATE categories SET {} WHERE id = ?", sets.join(", "));
    if let Err(e) = conn.execute(&sql, params_from_iter(values)) {
        return db_err(req, "db_update_failed", e);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_categories_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let category_id = match required_str(req, "categoryId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = require_row(
        conn,
        req,
        "SELECT 1 FROM categories WHERE id = ?",
        &category_id,
        "category",
    ) {
        return e;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_tx_failed", e),
    };
    // Assessments survive as uncategorized.
    if let Err(e) = tx.execute(
        "UPDATE assessments SET category_id = NULL WHERE category_id = ?",
        [&category_id],
    ) {
        let _ = tx.rollback();
        return db_err(req, "db_update_failed", e);
    }
    if let Err(e) = tx.execute("DELETE FROM categories WHERE id = ?", [&category_id]) {
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
        "categories.list" => Some(handle_categories_list(state, req)),
        "categories.create" => Some(handle_categories_create(state, req)),
        "categories.update" => Some(handle_categories_update(state, req)),
        "categories.delete" => Some(handle_categories_delete(state, req)),
        _ => None,
    }
}
