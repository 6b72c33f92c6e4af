//! Database access consumed by the health probe.
//!
//! The probe only needs one operation, a minimal round trip, so the pool sits
//! behind the [`Database`] trait. [`PgDatabase`] is the real implementation on
//! top of a lazily connecting sqlx pool; [`UnconfiguredDatabase`] stands in
//! when required settings are missing so the process can still start and
//! report the problem per probe.
//!
//! Pool lifecycle is published on [`PoolEvents`], a broadcast stream that the
//! logger subscribes to via [`spawn_pool_event_logger`].

mod events;
mod postgres;

pub use events::{spawn_pool_event_logger, PoolEventKind, PoolEvents, PoolLifecycleEvent};
pub use postgres::PgDatabase;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::DatabaseConfig;
use crate::correlation::CorrelationId;

/// Facts reported by the server during a successful round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerFacts {
    /// Server clock at the time of the query
    pub now: String,
    /// Server version string
    pub version: String,
}

/// Where the database lives. Exposed in status responses; never holds credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseTarget {
    pub host: Option<String>,
    pub port: u16,
    pub database: Option<String>,
}

/// Failure of a database round trip.
///
/// Display output is safe to return to HTTP callers: it never contains
/// credentials, certificate paths or driver internals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    #[error("database is not configured (missing {0})")]
    NotConfigured(String),

    #[error("timed out waiting for a database connection")]
    AcquireTimeout,

    #[error("database did not respond within {0} ms")]
    Timeout(u64),

    #[error("could not connect to the database: {0}")]
    Connect(String),

    #[error("database query failed: {0}")]
    Query(String),
}

/// A database the probe can issue a round trip against.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run one minimal query and return what the server reported.
    ///
    /// `correlation_id` tags any pool events raised along the way.
    async fn round_trip(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<ServerFacts, DatabaseError>;

    /// Connection target, for display.
    fn target(&self) -> &DatabaseTarget;
}

/// Database used when required connection settings are absent.
#[derive(Debug, Clone)]
pub struct UnconfiguredDatabase {
    missing: Vec<&'static str>,
    target: DatabaseTarget,
}

impl UnconfiguredDatabase {
    pub fn new(missing: Vec<&'static str>, target: DatabaseTarget) -> Self {
        Self { missing, target }
    }
}

#[async_trait]
impl Database for UnconfiguredDatabase {
    async fn round_trip(
        &self,
        _correlation_id: &CorrelationId,
    ) -> Result<ServerFacts, DatabaseError> {
        Err(DatabaseError::NotConfigured(self.missing.join(", ")))
    }

    fn target(&self) -> &DatabaseTarget {
        &self.target
    }
}

/// Build the database described by `config`.
///
/// Never connects eagerly; connection problems surface on the first probe.
pub fn connect(config: &DatabaseConfig, events: PoolEvents) -> Arc<dyn Database> {
    let missing = config.missing_fields();
    if missing.is_empty() {
        Arc::new(PgDatabase::connect_lazy(config, events))
    } else {
        Arc::new(UnconfiguredDatabase::new(missing, config.target()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_database_fails_every_round_trip() {
        let config = DatabaseConfig::default();
        let db = connect(&config, PoolEvents::new(4));

        let err = db.round_trip(&CorrelationId::generate()).await.unwrap_err();
        assert_eq!(
            err,
            DatabaseError::NotConfigured("host, user, database name".to_string())
        );
        assert_eq!(db.target().port, 5432);
    }

    #[test]
    fn test_error_messages_are_human_readable() {
        assert_eq!(
            DatabaseError::Timeout(5000).to_string(),
            "database did not respond within 5000 ms"
        );
        assert_eq!(
            DatabaseError::Connect("connection refused".into()).to_string(),
            "could not connect to the database: connection refused"
        );
    }
}
