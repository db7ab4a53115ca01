// Queue-backed log sink
//
// Forwards every log record to a channel so another thread (an operator GUI,
// a file writer) can consume the session log while the acquisition loop keeps
// writing. An inner logger, e.g. env_logger, can be chained for console output.

use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::fmt;

/// A formatted log record
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    #[serde(serialize_with = "serialize_level")]
    pub level: Level,
    pub target: String,
    pub message: String,
}

fn serialize_level<S: serde::Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(level.as_str())
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {:<5} {}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        )
    }
}

pub struct QueueLogger {
    level: LevelFilter,
    sender: Sender<LogEntry>,
    inner: Option<Box<dyn Log>>,
}

impl QueueLogger {
    /// Create the logger and the receiving end of its queue
    pub fn new(level: LevelFilter) -> (Self, Receiver<LogEntry>) {
        let (sender, receiver) = channel::unbounded();
        (
            Self {
                level,
                sender,
                inner: None,
            },
            receiver,
        )
    }

    /// Also pass every record to `inner`
    pub fn with_inner(mut self, inner: Box<dyn Log>) -> Self {
        self.inner = Some(inner);
        self
    }

    /// Install as the global logger
    pub fn install(self) -> Result<(), SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for QueueLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // A dropped receiver only means nobody consumes the queue any more
        let _ = self.sender.send(LogEntry {
            timestamp: Local::now(),
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });

        if let Some(inner) = &self.inner {
            if inner.enabled(record.metadata()) {
                inner.log(record);
            }
        }
    }

    fn flush(&self) {
        if let Some(inner) = &self.inner {
            inner.flush();
        }
    }
}
