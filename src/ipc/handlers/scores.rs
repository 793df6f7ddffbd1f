use crate::grade::{self, Assessment, ScoreRecord};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err, now_stamp, optional_str, require_row, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_scores_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "scores": [] }));
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

    // Every enrolled student gets a row; missing score rows read as ungraded.
    let mut stmt = match conn.prepare(
        "SELECT s.id, s.last_name, s.first_name, sc.raw_score, sc.remark, sc.updated_at
         FROM assessments a
         JOIN enrollments e ON e.class_id = a.class_id
         JOIN students s ON s.id = e.student_id
         LEFT JOIN scores sc ON sc.assessment_id = a.id AND sc.student_id = s.id
         WHERE a.id = ?
         ORDER BY s.last_name, s.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let rows = stmt
        .query_map([&assessment_id], |row| {
            let student_id: String = row.get(0)?;
            let last_name: String = row.get(1)?;
            let first_name: String = row.get(2)?;
            let raw_score: Option<f64> = row.get(3)?;
            let remark: Option<String> = row.get(4)?;
            let updated_at: Option<String> = row.get(5)?;
            Ok(json!({
                "studentId": student_id,
                "displayName": format!("{}, {}", last_name, first_name),
                "rawScore": raw_score,
                "remark": remark,
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(scores) => ok(&req.id, json!({ "scores": scores })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_scores_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw_score = match req.params.get("rawScore") {
        None => return err(&req.id, "bad_params", "missing rawScore (use null to clear)", None),
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_f64() {
            Some(n) if n.is_finite() => Some(n),
            _ => return err(&req.id, "bad_params", "rawScore must be a number or null", None),
        },
    };
    let remark = optional_str(req, "remark");

    let assessment: Option<(String, f64)> = match conn
        .query_row(
            "SELECT class_id, max_score FROM assessments WHERE id = ?",
            [&assessment_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let Some((class_id, max_score)) = assessment else {
        return err(&req.id, "not_found", "assessment not found", None);
    };

    let enrolled: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE class_id = ? AND student_id = ?",
            (&class_id, &student_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    if enrolled.is_none() {
        return err(
            &req.id,
            "not_enrolled",
            "student is not enrolled in the assessment's class",
            Some(json!({ "classId": class_id, "studentId": student_id })),
        );
    }

    // Entry boundary: scores above max are rejected here, never clamped later.
    let check = grade::validate_score(
        &Assessment {
            id: assessment_id.clone(),
            category_id: None,
            max_score,
            date: None,
        },
        &ScoreRecord {
            assessment_id: assessment_id.clone(),
            student_id: student_id.clone(),
            raw_score,
        },
    );
    if let Err(e) = check {
        return err(
            &req.id,
            "invalid_score",
            e.to_string(),
            Some(json!({ "rawScore": raw_score, "maxScore": max_score })),
        );
    }

    if let Err(e) = conn.execute(
        "INSERT INTO scores(assessment_id, student_id, raw_score, remark, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(assessment_id, student_id) DO UPDATE SET
           raw_score = excluded.raw_score,
           remark = excluded.remark,
           updated_at = excluded.updated_at",
        (&assessment_id, &student_id, raw_score, &remark, now_stamp()),
    ) {
        return db_err(req, "db_update_failed", e);
    }

    ok(&req.id, json!({ "rawScore": raw_score }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.list" => Some(handle_scores_list(state, req)),
        "scores.set" => Some(handle_scores_set(state, req)),
        _ => None,
    }
}
