use crate::ipc::error::ok;
use crate::ipc::helpers::{calc_err, db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use serde_json::json;

fn handle_reports_student_model(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match reports::student_report_model(conn, &class_id, &student_id) {
        Ok(model) => ok(&req.id, json!(model)),
        Err(e) => calc_err(req, e),
    }
}

fn handle_reports_class_summary_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match reports::class_summary_model(conn, &class_id) {
        Ok(model) => ok(&req.id, json!(model)),
        Err(e) => calc_err(req, e),
    }
}

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match reports::dashboard_summary(conn) {
        Ok(summary) => ok(&req.id, json!(summary)),
        Err(e) => calc_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentModel" => Some(handle_reports_student_model(state, req)),
        "reports.classSummaryModel" => Some(handle_reports_class_summary_model(state, req)),
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        _ => None,
    }
}
