use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::helpers::{calc_err, db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_grades_student(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match calc::compute_student_grade(conn, &class_id, &student_id) {
        Ok(result) => ok(&req.id, json!(result)),
        Err(e) => calc_err(req, e),
    }
}

fn handle_grades_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match calc::compute_class_grades(conn, &class_id) {
        Ok(grades) => ok(&req.id, json!(grades)),
        Err(e) => calc_err(req, e),
    }
}

fn handle_grades_trend(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match calc::compute_student_trend(conn, &class_id, &student_id) {
        Ok((trend, percentages)) => {
            let mut result = json!(trend);
            result["percentages"] = json!(percentages);
            ok(&req.id, result)
        }
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.student" => Some(handle_grades_student(state, req)),
        "grades.class" => Some(handle_grades_class(state, req)),
        "grades.trend" => Some(handle_grades_trend(state, req)),
        _ => None,
    }
}
