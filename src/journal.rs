//! Run journal: timestamped events of one command, mirrored to `tracing`
//! and appended to the operator log file as they happen.

use crate::core::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.at.to_rfc3339(), self.level, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunJournal {
    events: Vec<RunEvent>,
    log_file: Option<PathBuf>,
}

impl RunJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal that appends every event to `path` the moment it is recorded.
    /// A failed append is reported through `tracing` and never stops the run.
    pub fn with_log_file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            events: Vec::new(),
            log_file: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Warn, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Error, message.into());
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RunEvent> {
        self.events
    }

    fn record(&mut self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        let event = RunEvent {
            at: Utc::now(),
            level,
            message,
        };
        if let Some(path) = &self.log_file {
            if let Err(e) = append_to_log(path, std::slice::from_ref(&event)) {
                warn!(path = %path.display(), error = %e, "Could not append to log file");
            }
        }
        self.events.push(event);
    }
}

/// Append `events` to the log file at `path`, one line each. The file is
/// created if missing and never truncated.
pub fn append_to_log<P: AsRef<Path>>(path: P, events: &[RunEvent]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for event in events {
        writeln!(writer, "{}", event)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_file_is_appended_not_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("migration.log");

        let mut first = RunJournal::new();
        first.info("first run");
        append_to_log(&path, first.events()).unwrap();

        let mut second = RunJournal::new();
        second.warn("second run");
        second.error("second run failed");
        append_to_log(&path, second.events()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[INFO] first run"));
        assert!(lines[1].ends_with("[WARN] second run"));
        assert!(lines[2].ends_with("[ERROR] second run failed"));
        assert!(DateTime::parse_from_rfc3339(lines[0].split(' ').next().unwrap()).is_ok());
    }

    #[test]
    fn events_reach_the_log_file_as_they_are_recorded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("migration.log");
        fs::write(&path, "earlier line\n").unwrap();

        let mut journal = RunJournal::with_log_file(&path);
        journal.info("Starting migration step 2-to-3: default settings");
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().last().unwrap().ends_with("[INFO] Starting migration step 2-to-3: default settings"));

        journal.error("Migration step 2-to-3 failed: disk full");
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
        assert_eq!(journal.events().len(), 2);
    }

    #[test]
    fn unwritable_log_file_does_not_lose_events() {
        let dir = tempdir().unwrap();
        let mut journal = RunJournal::with_log_file(dir.path());
        journal.warn("still recorded");
        assert_eq!(journal.events().len(), 1);
    }
}
