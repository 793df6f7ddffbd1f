mod backup;
mod calc;
mod config;
mod db;
mod grade;
mod ipc;
mod logging;
mod reports;

use clap::Parser;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};

fn main() {
    let cfg = config::Config::parse();
    if let Err(e) = logging::init_tracing(cfg.verbose, cfg.log_level.as_deref(), cfg.log_json) {
        eprintln!("gradebookd: failed to initialise logging: {e}");
    }

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_deref() {
        // A bad startup workspace must not stop the sidecar; the UI can select another.
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            error!(workspace = %path.display(), error = %format!("{e:#}"), "failed to open workspace");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "gradebookd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                // Can't reply with an id we failed to parse.
                warn!(error = %e, "bad request line");
                let mut resp = ipc::err("", "bad_json", e.to_string(), None);
                if let Some(obj) = resp.as_object_mut() {
                    obj.remove("id");
                }
                resp
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
