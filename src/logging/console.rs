//! Local console sink.
//!
//! Forwards records to `tracing`, so the process-wide subscriber decides the
//! final text or JSON rendering on stdout.

use chrono::SecondsFormat;

use super::{Level, LogRecord, LogSink, SinkError};

const TARGET: &str = "dbcheck::log";

/// Sink that writes records through the installed `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn deliver(&self, record: &LogRecord) -> Result<(), SinkError> {
        let correlation_id = record.correlation_id.as_deref().unwrap_or("-");
        let timestamp = record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let fields = serde_json::to_string(&record.fields)
            .map_err(|e| SinkError::Delivery(e.to_string()))?;
        let message = record.message.as_str();

        match record.level {
            Level::Debug => {
                tracing::debug!(target: TARGET, correlation_id, %timestamp, fields = %fields, "{message}")
            }
            Level::Info => {
                tracing::info!(target: TARGET, correlation_id, %timestamp, fields = %fields, "{message}")
            }
            Level::Warn => {
                tracing::warn!(target: TARGET, correlation_id, %timestamp, fields = %fields, "{message}")
            }
            Level::Error => {
                tracing::error!(target: TARGET, correlation_id, %timestamp, fields = %fields, "{message}")
            }
        }

        Ok(())
    }
}
