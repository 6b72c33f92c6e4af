//! PostgreSQL database backed by a lazily connecting sqlx pool.
//!
//! The pool enforces the acquisition timeout, so an unreachable server fails a
//! probe instead of hanging it. While the pool holds no connections, a round
//! trip first opens one connection directly: sqlx retries refused connections
//! inside `acquire` until the deadline and then only reports a pool timeout,
//! which would hide the real cause.
//!
//! Connecting and failing publish pool events tagged with the correlation id of
//! the request that triggered them. The full driver error only ever reaches
//! the log sink.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection};

use crate::config::{DatabaseConfig, SslMode};
use crate::correlation::CorrelationId;

use super::events::{PoolEventKind, PoolEvents};
use super::{Database, DatabaseError, DatabaseTarget, ServerFacts};

/// Query issued by every round trip: the server clock and version.
const ROUND_TRIP_QUERY: &str = "SELECT now()::text, version()";

/// SQLSTATE prefixes that mean "could not get a usable session" rather than
/// "the query itself failed".
const CONNECTION_SQLSTATES: &[&str] = &["28", "3D000", "57P03", "53300"];

pub struct PgDatabase {
    pool: PgPool,
    options: PgConnectOptions,
    connect_timeout: Duration,
    target: DatabaseTarget,
    events: PoolEvents,
}

impl PgDatabase {
    /// Configure the pool without opening any connection.
    pub fn connect_lazy(config: &DatabaseConfig, events: PoolEvents) -> Self {
        let options = connect_options(config);
        let connect_timeout = config.timeout();

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(connect_timeout)
            .connect_lazy_with(options.clone());

        Self {
            pool,
            options,
            connect_timeout,
            target: config.target(),
            events,
        }
    }

    /// Open and close one connection outside the pool, reporting the real
    /// connect error on failure.
    async fn open_first_connection(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<(), DatabaseError> {
        match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => {
                // The pool opens its own connection next; this one only proved reachability
                let _ = conn.close().await;
                self.events.publish(
                    PoolEventKind::Connected,
                    format!("connected to {}", self.describe_target()),
                    Some(correlation_id),
                );
                Ok(())
            }
            Ok(Err(e)) => {
                self.events.publish(
                    PoolEventKind::Errored,
                    format!("connect to {} failed: {e:?}", self.describe_target()),
                    Some(correlation_id),
                );
                Err(classify(&e))
            }
            Err(_) => {
                let err = self.connect_timed_out();
                self.events.publish(
                    PoolEventKind::Errored,
                    format!("connect to {} failed: {err}", self.describe_target()),
                    Some(correlation_id),
                );
                Err(err)
            }
        }
    }

    fn connect_timed_out(&self) -> DatabaseError {
        DatabaseError::Connect(format!(
            "could not open a connection within {} ms",
            self.connect_timeout.as_millis()
        ))
    }

    fn describe_target(&self) -> String {
        format!(
            "{}:{}",
            self.target.host.as_deref().unwrap_or("unknown"),
            self.target.port
        )
    }
}

fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .port(config.port)
        .ssl_mode(match config.ssl_mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        });

    if let Some(host) = &config.host {
        options = options.host(host);
    }
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(name) = &config.name {
        options = options.database(name);
    }
    if let Some(cert) = &config.ssl_root_cert {
        options = options.ssl_root_cert(cert);
    }
    options
}

#[async_trait]
impl Database for PgDatabase {
    async fn round_trip(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<ServerFacts, DatabaseError> {
        if self.pool.size() == 0 {
            self.open_first_connection(correlation_id).await?;
        }

        match sqlx::query_as::<_, (String, String)>(ROUND_TRIP_QUERY)
            .fetch_one(&self.pool)
            .await
        {
            Ok((now, version)) => Ok(ServerFacts { now, version }),
            Err(e) => {
                self.events.publish(
                    PoolEventKind::Errored,
                    format!("{e:?}"),
                    Some(correlation_id),
                );
                match e {
                    // Nothing could be opened at all, as opposed to a busy pool
                    sqlx::Error::PoolTimedOut if self.pool.size() == 0 => {
                        Err(self.connect_timed_out())
                    }
                    e => Err(classify(&e)),
                }
            }
        }
    }

    fn target(&self) -> &DatabaseTarget {
        &self.target
    }
}

/// Map a driver error onto the sanitized error taxonomy.
fn classify(error: &sqlx::Error) -> DatabaseError {
    match error {
        sqlx::Error::PoolTimedOut => DatabaseError::AcquireTimeout,
        sqlx::Error::PoolClosed => DatabaseError::Connect("connection pool is closed".to_string()),
        sqlx::Error::Io(e) => DatabaseError::Connect(e.to_string()),
        sqlx::Error::Tls(e) => DatabaseError::Connect(format!("TLS handshake failed: {e}")),
        sqlx::Error::Configuration(_) => {
            DatabaseError::Connect("invalid connection configuration".to_string())
        }
        sqlx::Error::Protocol(_) => DatabaseError::Connect("protocol error".to_string()),
        sqlx::Error::Database(db) => {
            let is_connection = db
                .code()
                .map(|code| CONNECTION_SQLSTATES.iter().any(|p| code.starts_with(p)))
                .unwrap_or(false);
            if is_connection {
                DatabaseError::Connect(db.message().to_string())
            } else {
                DatabaseError::Query(db.message().to_string())
            }
        }
        other => DatabaseError::Query(other.to_string()),
    }
}
