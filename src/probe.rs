//! Database health probe.
//!
//! One probe is exactly one round trip: no retries, no caching. The latency
//! clock starts immediately before the round trip and stops immediately after,
//! so request parsing and rendering never count towards it. The round trip is
//! bounded by the probe timeout even if the pool misbehaves.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;

use crate::correlation::RequestContext;
use crate::db::{Database, DatabaseError, ServerFacts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Success,
    Failure,
}

/// Result of a single probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub latency_ms: u64,
    /// Server clock on success, sanitized error message on failure
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<ServerFacts>,
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        self.outcome == ProbeOutcome::Success
    }
}

/// Issues bounded round trips against a [`Database`].
#[derive(Debug, Clone, Copy)]
pub struct HealthProbe {
    timeout: Duration,
}

impl HealthProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one probe, logging an attempt record and a result record.
    pub async fn probe(&self, db: &dyn Database, context: &RequestContext) -> ProbeResult {
        let target = db.target();
        context.debug(
            "Attempting database round trip",
            json!({
                "host": target.host,
                "port": target.port,
                "database": target.database,
            }),
        );

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, db.round_trip(context.id())).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let result = result
            .unwrap_or_else(|_| Err(DatabaseError::Timeout(self.timeout.as_millis() as u64)));

        match result {
            Ok(facts) => {
                context.info(
                    "Database round trip succeeded",
                    json!({
                        "latency_ms": latency_ms,
                        "server_time": facts.now,
                        "server_version": facts.version,
                    }),
                );
                ProbeResult {
                    outcome: ProbeOutcome::Success,
                    latency_ms,
                    detail: facts.now.clone(),
                    facts: Some(facts),
                }
            }
            Err(e) => {
                context.error(
                    "Database round trip failed",
                    json!({
                        "latency_ms": latency_ms,
                        "error": e.to_string(),
                        "error_debug": format!("{e:?}"),
                    }),
                );
                ProbeResult {
                    outcome: ProbeOutcome::Failure,
                    latency_ms,
                    detail: e.to_string(),
                    facts: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::db::DatabaseTarget;
    use crate::logging::{Level, Logger, MemorySink};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Database that sleeps, then answers with a fixed result.
    struct DelayedDatabase {
        delay: Duration,
        result: Result<ServerFacts, DatabaseError>,
        calls: AtomicUsize,
        target: DatabaseTarget,
    }

    impl DelayedDatabase {
        fn new(delay: Duration, result: Result<ServerFacts, DatabaseError>) -> Self {
            Self {
                delay,
                result,
                calls: AtomicUsize::new(0),
                target: DatabaseTarget {
                    host: Some("db.test".to_string()),
                    port: 5432,
                    database: Some("app".to_string()),
                },
            }
        }
    }

    #[async_trait]
    impl Database for DelayedDatabase {
        async fn round_trip(
            &self,
            _correlation_id: &CorrelationId,
        ) -> Result<ServerFacts, DatabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }

        fn target(&self) -> &DatabaseTarget {
            &self.target
        }
    }

    fn facts() -> ServerFacts {
        ServerFacts {
            now: "2024-01-01 00:00:00+00".to_string(),
            version: "PostgreSQL 16.1".to_string(),
        }
    }

    fn context() -> (RequestContext, MemorySink) {
        let sink = MemorySink::new();
        let logger = Logger::new(Level::Debug, sink.clone());
        (RequestContext::new(CorrelationId::generate(), logger), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_measures_round_trip() {
        let db = DelayedDatabase::new(Duration::from_millis(50), Ok(facts()));
        let (ctx, _) = context();

        let result = HealthProbe::new(Duration::from_secs(5)).probe(&db, &ctx).await;

        assert!(result.is_success());
        assert!(result.latency_ms >= 50, "latency {}", result.latency_ms);
        assert!(result.latency_ms < 60, "latency {}", result.latency_ms);
        assert_eq!(result.detail, "2024-01-01 00:00:00+00");
        assert_eq!(result.facts, Some(facts()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_is_idempotent() {
        let db = DelayedDatabase::new(Duration::from_millis(3), Ok(facts()));
        let (ctx, _) = context();
        let probe = HealthProbe::new(Duration::from_secs(5));

        let first = probe.probe(&db, &ctx).await;
        let second = probe.probe(&db, &ctx).await;

        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(first.detail, second.detail);
        assert_eq!(db.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout_is_bounded_failure() {
        let db = DelayedDatabase::new(
            Duration::from_millis(5000),
            Err(DatabaseError::AcquireTimeout),
        );
        let (ctx, _) = context();

        let result = HealthProbe::new(Duration::from_millis(5000)).probe(&db, &ctx).await;

        assert_eq!(result.outcome, ProbeOutcome::Failure);
        assert!(result.latency_ms <= 5010, "latency {}", result.latency_ms);
        assert!(!result.detail.is_empty());
        assert!(result.facts.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_database_times_out() {
        let db = DelayedDatabase::new(Duration::from_secs(3600), Ok(facts()));
        let (ctx, _) = context();

        let result = HealthProbe::new(Duration::from_millis(5000)).probe(&db, &ctx).await;

        assert_eq!(result.outcome, ProbeOutcome::Failure);
        assert_eq!(result.detail, "database did not respond within 5000 ms");
        assert!(result.latency_ms <= 5010);
        assert_eq!(db.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_logs_attempt_and_result() {
        let db = DelayedDatabase::new(
            Duration::ZERO,
            Err(DatabaseError::Connect("connection refused".to_string())),
        );
        let (ctx, sink) = context();

        let result = HealthProbe::new(Duration::from_secs(1)).probe(&db, &ctx).await;
        assert_eq!(
            result.detail,
            "could not connect to the database: connection refused"
        );

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::Debug);
        assert_eq!(records[1].level, Level::Error);
        for record in &records {
            assert_eq!(record.correlation_id.as_deref(), Some(ctx.id().as_str()));
        }
    }

    #[test]
    fn test_result_serialization() {
        let result = ProbeResult {
            outcome: ProbeOutcome::Failure,
            latency_ms: 3,
            detail: "boom".to_string(),
            facts: None,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["outcome"], "failure");
        assert_eq!(value["latency_ms"], 3);
        assert!(value.get("facts").is_none());
    }
}
