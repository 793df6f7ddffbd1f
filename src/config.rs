use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Gradebook sidecar: newline-delimited JSON requests on stdin, responses on stdout.
#[derive(Debug, Clone, Parser)]
#[command(name = "gradebookd", version, about)]
pub struct Config {
    /// Workspace directory to open at startup (same as a `workspace.select` request)
    #[arg(long, env = "GRADEBOOKD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log filter, e.g. `debug` or `gradebookd=trace`
    #[arg(long, env = "GRADEBOOKD_LOG")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines (env accepts 1/0, yes/no, on/off, true/false)
    #[arg(
        long,
        env = "GRADEBOOKD_LOG_JSON",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: bool,
}
