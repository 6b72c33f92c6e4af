//! Liveness endpoint for container orchestration.
//!
//! Returns 200 OK whenever the process can answer HTTP. It deliberately does
//! not touch the database; `/db-status` is the readiness signal.

/// Health check handler.
pub async fn health() -> &'static str {
    "ok"
}
