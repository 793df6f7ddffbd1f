use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_backup_export_workspace_bundle(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace_path = match required_str(req, "workspacePath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    match backup::export_workspace_bundle(&workspace_path, &out_path) {
        Ok(summary) => {
            info!(out = %out_path.display(), sha256 = %summary.db_sha256, "workspace exported");
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "bundleFormat": summary.bundle_format,
                    "entryCount": summary.entry_count,
                    "dbSha256": summary.db_sha256,
                }),
            )
        }
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace_path = match required_str(req, "workspacePath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let in_path = match required_str(req, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };

    let is_current = state.workspace.as_deref() == Some(workspace_path.as_path());
    if is_current {
        // Release the handle before the database file is replaced.
        state.db = None;
    }

    let imported = backup::import_workspace_bundle(&in_path, &workspace_path);
    let reopened = if is_current {
        open_workspace(state, &workspace_path)
    } else {
        Ok(())
    };

    match (imported, reopened) {
        (Ok(summary), Ok(())) => {
            info!(workspace = %workspace_path.display(), "workspace imported");
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "bundleFormatDetected": summary.bundle_format_detected,
                }),
            )
        }
        (Err(e), _) => err(&req.id, "io_failed", format!("{e:#}"), None),
        (Ok(_), Err(e)) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
