use crate::error::{Result, SyncError};
use chrono::{DateTime, Local};
use colored::Colorize;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Severity of a session log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Level {
    #[serde(rename = "INFO")]
    Info,
    #[serde(rename = "WARNING")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARNING",
            Level::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl LogRecord {
    /// Human-readable form used by the session file
    pub fn line(&self) -> String {
        format!(
            "{} - {} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S,%3f"),
            self.level.as_str(),
            self.message
        )
    }
}

/// Destination for session log records
pub trait LogSink: Send + Sync {
    fn write(&self, record: &LogRecord) -> std::io::Result<()>;
}

/// Appends records to the session file, flushing after each one
pub struct FileSink {
    file: Mutex<File>,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SyncError::LogFile {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileSink {
    fn write(&self, record: &LogRecord) -> std::io::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(file, "{}", record.line())?;
        file.flush()
    }
}

/// How records are echoed to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Colored lines; with `quiet` only warnings and errors
    Text { quiet: bool },
    /// Newline-delimited JSON, one object per record
    Json,
}

pub struct ConsoleSink {
    mode: ConsoleMode,
}

impl ConsoleSink {
    pub fn new(mode: ConsoleMode) -> Self {
        Self { mode }
    }

    fn shows(&self, level: Level) -> bool {
        match self.mode {
            ConsoleMode::Text { quiet } => !quiet || level >= Level::Warn,
            ConsoleMode::Json => true,
        }
    }

    fn render(&self, record: &LogRecord) -> std::io::Result<String> {
        match self.mode {
            ConsoleMode::Json => serde_json::to_string(record).map_err(std::io::Error::other),
            ConsoleMode::Text { .. } => {
                let level = match record.level {
                    Level::Info => record.level.as_str().green(),
                    Level::Warn => record.level.as_str().yellow(),
                    Level::Error => record.level.as_str().red().bold(),
                };
                Ok(format!(
                    "{} - {} - {}",
                    record
                        .timestamp
                        .format("%Y-%m-%d %H:%M:%S,%3f")
                        .to_string()
                        .bright_black(),
                    level,
                    record.message
                ))
            }
        }
    }
}

impl LogSink for ConsoleSink {
    fn write(&self, record: &LogRecord) -> std::io::Result<()> {
        if !self.shows(record.level) {
            return Ok(());
        }
        let line = self.render(record)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        stdout.flush()
    }
}

/// Keeps records in memory (test double for the file and console sinks)
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemorySink {
    records: std::sync::Arc<Mutex<Vec<LogRecord>>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn write(&self, record: &LogRecord) -> std::io::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Session log file name for a run started at `started`
pub fn log_file_name(started: &DateTime<Local>) -> String {
    format!("sync_log_{}.log", started.format("%Y%m%d_%H%M%S"))
}

/// Explicitly passed logging handle for one run
///
/// Every lifecycle event becomes exactly one [`LogRecord`], fanned out to the
/// session file and the console in the order it happened. Developer
/// diagnostics go through `tracing` instead and never reach the session file.
pub struct SessionLog {
    file_path: Option<PathBuf>,
    sinks: Vec<Box<dyn LogSink>>,
}

impl SessionLog {
    /// Open the session file in `dir` and mirror records to `console`.
    ///
    /// The file name is derived from `started` and fixed for the whole run.
    pub fn open(dir: &Path, started: &DateTime<Local>, console: ConsoleSink) -> Result<Self> {
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };
        std::fs::create_dir_all(&dir).map_err(|e| SyncError::LogFile {
            path: dir.clone(),
            source: e,
        })?;

        let file_path = dir.join(log_file_name(started));
        let file = FileSink::create(&file_path)?;
        tracing::debug!("Session log: {}", file_path.display());

        Ok(Self {
            file_path: Some(file_path),
            sinks: vec![Box::new(file), Box::new(console)],
        })
    }

    /// Session log without a backing file
    #[cfg(test)]
    pub fn with_sinks(sinks: Vec<Box<dyn LogSink>>) -> Self {
        Self {
            file_path: None,
            sinks,
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn record(&self, level: Level, message: impl Into<String>) {
        let record = LogRecord {
            timestamp: Local::now(),
            level,
            message: message.into(),
        };
        for sink in &self.sinks {
            if let Err(e) = sink.write(&record) {
                tracing::warn!("Session log sink failed: {}", e);
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(Level::Error, message);
    }
}
