//! Per-request correlation identifiers and the logger bound to them.
//!
//! An inbound `x-correlation-id` (or `x-request-id`) header is reused verbatim
//! so traces can span services. Otherwise a fresh id is made from the current
//! time in base 36 plus a short random base-36 suffix.

use std::fmt;

use chrono::Utc;
use http::HeaderMap;
use rand::Rng;
use serde_json::Value;

use crate::logging::{into_fields, Level, LogRecord, Logger};

/// Response (and preferred request) header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Alternate inbound header accepted when the primary one is absent.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Inbound ids longer than this are treated as absent.
pub const MAX_INBOUND_ID_LEN: usize = 128;

const SUFFIX_LEN: usize = 8;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Opaque token tying together the log records and response of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new id: base-36 milliseconds since the epoch, a dash, and a
    /// random base-36 suffix.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| BASE36_DIGITS[rng.gen_range(0..BASE36_DIGITS.len())] as char)
            .collect();
        Self(format!("{}-{}", to_base36(millis), suffix))
    }

    /// Extract a caller-supplied id from the recognized headers.
    ///
    /// Returns `None` when neither header carries a usable value. Values that
    /// are empty, too long, or contain anything but visible ASCII are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        [CORRELATION_ID_HEADER, REQUEST_ID_HEADER]
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .map(str::trim)
            .find(|value| is_acceptable(value))
            .map(|value| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_acceptable(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_INBOUND_ID_LEN
        && value.bytes().all(|b| b.is_ascii_graphic())
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Correlation id plus a logger that stamps it onto every record.
///
/// Inserted into request extensions by the request middleware; handlers pull
/// it out with `Extension<RequestContext>`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: CorrelationId,
    logger: Logger,
}

impl RequestContext {
    /// Start a context for an inbound request.
    pub fn begin(headers: &HeaderMap, logger: Logger) -> Self {
        let id = CorrelationId::from_headers(headers).unwrap_or_else(CorrelationId::generate);
        Self::new(id, logger)
    }

    pub fn new(id: CorrelationId, logger: Logger) -> Self {
        Self { id, logger }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Emit a record carrying this context's correlation id.
    pub fn log(&self, level: Level, message: impl Into<String>, fields: Value) {
        if !self.logger.enabled(level) {
            return;
        }
        let record = LogRecord::new(level, message, into_fields(fields))
            .with_correlation_id(self.id.as_str());
        self.logger.emit(record);
    }

    pub fn debug(&self, message: impl Into<String>, fields: Value) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: Value) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: impl Into<String>, fields: Value) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: Value) {
        self.log(Level::Error, message, fields);
    }
}
