use anyhow::{Context, Result};
use flexi_logger::{DeferredNow, Duplicate, FileSpec, LogSpecification, Logger, LoggerHandle, style};
use log::LevelFilter;
use std::{fs, io::Write, path::Path};

/// Start the file logger. `echo` mirrors entries to stderr, which is only
/// wanted while no dialog is drawn on the terminal.
///
/// The returned handle has to stay alive for the rest of the run.
pub fn init(verbosity: u8, log_file_path: &Path, echo: bool) -> Result<LoggerHandle> {
    let log_specification = match verbosity {
        0 => LogSpecification::builder()
            .default(LevelFilter::Info)
            .build(),
        1 => LogSpecification::builder()
            .default(LevelFilter::Debug)
            .build(),
        _ => LogSpecification::builder()
            .default(LevelFilter::Trace)
            .build(),
    };

    // Each run starts with a fresh log
    if log_file_path.exists() {
        fs::remove_file(log_file_path)
            .with_context(|| format!("removing old log {}", log_file_path.display()))?;
    }

    let dir = log_file_path.parent().unwrap_or_else(|| Path::new("."));
    let stem = log_file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bootstick");
    let ext = log_file_path.extension().and_then(|s| s.to_str());

    let mut spec = FileSpec::default()
        .directory(dir)
        .basename(stem)
        .suppress_timestamp();

    // Only add suffix if there is one; avoids trailing dot
    if let Some(ext) = ext
        && !ext.is_empty()
    {
        spec = spec.suffix(ext);
    }

    let duplicate = if echo { Duplicate::All } else { Duplicate::None };

    Logger::with(log_specification)
        .log_to_file(spec)
        .duplicate_to_stderr(duplicate)
        .format(format_log_entry)
        .start()
        .with_context(|| format!("starting logger at {}", log_file_path.display()))
}

/// Formats a log entry with color
fn format_log_entry(
    w: &mut dyn Write,
    now: &mut DeferredNow,
    record: &log::Record,
) -> std::io::Result<()> {
    let level = record.level();
    let time_str = now.now().time().format("%H:%M:%S").to_string();

    write!(
        w,
        "[ {} ] {} {} {}",
        style(level).paint(level.to_string()),
        time_str,
        record.target(),
        record.args()
    )
}
