//! Logger setup

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;

/// Log file written inside `--log-directory`
pub const LOG_FILE_NAME: &str = "dash-d.log";

/// Map the `-d` verbosity level onto a default filter
///
/// Level 0 (default): warn only
/// Level 1: info
/// Level 2: debug
/// Level 3+: trace
pub fn level_filter(debug: u8) -> &'static str {
    match debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialize `env_logger`, appending to a file in `log_directory` when given
///
/// `RUST_LOG` overrides the verbosity chosen on the command line.
pub fn init(debug: u8, log_directory: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level_filter(debug)));

    if let Some(dir) = log_directory {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Could not create log directory \"{}\"", dir.display()))?;
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Could not open log file \"{}\"", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}
