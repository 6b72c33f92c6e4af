//! dbcheck: a small service that reports whether it can reach its PostgreSQL
//! database.
//!
//! Each request is stamped with a correlation id, every log record it produces
//! carries that id, and the database probe measures one round trip and
//! reports its latency or a sanitized failure.

pub mod config;
pub mod correlation;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod probe;
pub mod routes;
pub mod state;
pub mod templates;

pub use error::{AppError, AppErrorResponse, ResultExt};
