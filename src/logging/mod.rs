//! Structured, leveled logging delivered to pluggable sinks.
//!
//! A single [`Logger`] is built at startup and cloned into whatever needs to
//! emit records: the request middleware, the health probe, and the pool event
//! subscriber. Records below the configured minimum level are dropped before
//! any sink sees them.
//!
//! Every logger has one mandatory local sink (normally [`ConsoleSink`]) and any
//! number of additional sinks (for example [`RemoteSink`]). A sink that fails
//! never surfaces its error to the caller; the failure is reported once through
//! the local sink and the record is otherwise dropped.

mod console;
mod memory;
mod remote;

pub use console::ConsoleSink;
pub use memory::MemorySink;
pub use remote::{RemoteSink, RemoteSinkHandle};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Structured key/value payload attached to a record.
pub type Fields = Map<String, Value>;

/// Severity of a log record. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

/// A single emitted log record.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Fields,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>, fields: Fields) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            correlation_id: None,
            fields,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Look up a structured field by key.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Convert a JSON value into record fields.
///
/// Objects become the field map directly, `null` becomes an empty map, and any
/// other value is stored under a single `value` key.
pub fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        Value::Null => Fields::new(),
        other => {
            let mut map = Fields::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Error returned by a sink that could not accept a record.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink queue is full")]
    Full,
    #[error("sink is closed")]
    Closed,
    #[error("sink delivery failed: {0}")]
    Delivery(String),
}

/// Destination for emitted records.
///
/// `deliver` must not block for long; sinks doing network I/O should hand the
/// record off to a background task.
pub trait LogSink: Send + Sync + 'static {
    /// Short name used when reporting delivery failures.
    fn name(&self) -> &'static str;

    fn deliver(&self, record: &LogRecord) -> Result<(), SinkError>;
}

/// Build the record used to report a failed delivery through the local sink.
pub(crate) fn delivery_failure_record(
    sink: &str,
    error: &dyn fmt::Display,
    original: &LogRecord,
) -> LogRecord {
    let record = LogRecord::new(
        Level::Warn,
        "Log sink delivery failed",
        into_fields(json!({
            "sink": sink,
            "error": error.to_string(),
            "dropped_message": original.message,
        })),
    );
    match &original.correlation_id {
        Some(id) => record.with_correlation_id(id.clone()),
        None => record,
    }
}

/// Leveled logger fanning records out to a local sink plus optional extras.
#[derive(Clone)]
pub struct Logger {
    minimum_level: Level,
    local: Arc<dyn LogSink>,
    extra: Arc<Vec<Arc<dyn LogSink>>>,
}

impl Logger {
    /// Create a logger with the given minimum level and mandatory local sink.
    pub fn new(minimum_level: Level, local: impl LogSink) -> Self {
        Self::with_local_sink(minimum_level, Arc::new(local))
    }

    /// Create a logger from an already shared local sink.
    pub fn with_local_sink(minimum_level: Level, local: Arc<dyn LogSink>) -> Self {
        Self {
            minimum_level,
            local,
            extra: Arc::new(Vec::new()),
        }
    }

    /// Add another sink. Records reach sinks in the order they were added,
    /// after the local sink.
    pub fn with_sink(mut self, sink: impl LogSink) -> Self {
        Arc::make_mut(&mut self.extra).push(Arc::new(sink));
        self
    }

    pub fn minimum_level(&self) -> Level {
        self.minimum_level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.minimum_level
    }

    /// Logger with the same level and local sink but no extra sinks, for
    /// components that report their own delivery failures.
    pub fn local_only(&self) -> Logger {
        Self::with_local_sink(self.minimum_level, Arc::clone(&self.local))
    }

    /// Emit a record to every sink. Never fails.
    pub fn emit(&self, record: LogRecord) {
        if !self.enabled(record.level) {
            return;
        }

        // Nothing left to report a local failure to
        let _ = self.local.deliver(&record);

        for sink in self.extra.iter() {
            if let Err(e) = sink.deliver(&record) {
                let report = delivery_failure_record(sink.name(), &e, &record);
                if self.enabled(report.level) {
                    let _ = self.local.deliver(&report);
                }
            }
        }
    }

    /// Emit a record that is not tied to any request.
    pub fn log(&self, level: Level, message: impl Into<String>, fields: Value) {
        if !self.enabled(level) {
            return;
        }
        self.emit(LogRecord::new(level, message, into_fields(fields)));
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("minimum_level", &self.minimum_level)
            .field("local", &self.local.name())
            .field(
                "extra",
                &self.extra.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
