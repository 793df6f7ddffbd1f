use crate::calc::CalcError;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Trimmed, non-empty name-like field.
pub fn required_text(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let v = required_str(req, key)?.trim().to_string();
    if v.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(v)
}

/// Missing, null and blank strings all read as `None`.
pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn calc_err(req: &Request, e: CalcError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn db_err(req: &Request, code: &str, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, code, e.to_string(), None)
}

pub fn row_exists(conn: &Connection, sql: &str, id: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn.query_row(sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

/// `Err` carries a ready-made `not_found` (or query failure) response.
pub fn require_row(
    conn: &Connection,
    req: &Request,
    sql: &str,
    id: &str,
    what: &str,
) -> Result<(), serde_json::Value> {
    match row_exists(conn, sql, id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(err(&req.id, "not_found", format!("{} not found", what), None)),
        Err(e) => Err(db_err(req, "db_query_failed", e)),
    }
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
