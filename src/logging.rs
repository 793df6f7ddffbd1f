use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logs always go to stderr; stdout is reserved for IPC responses.
pub fn init_tracing(
    verbose: bool,
    log_level: Option<&str>,
    log_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (verbose, log_level) {
        (_, Some(level)) => level,
        (true, None) => "gradebookd=debug",
        (false, None) => "gradebookd=warn",
    };

    let filter = if level.contains('=') {
        EnvFilter::try_new(level)?
    } else {
        EnvFilter::try_new(format!("gradebookd={}", level))?
    };

    let registry = tracing_subscriber::registry().with(filter);
    if log_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}
