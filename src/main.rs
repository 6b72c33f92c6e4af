//! dbcheck: database reachability service.
//!
//! This is the application entry point. It initializes tracing, loads
//! configuration from TOML and the environment, builds the logger and its
//! sinks, creates the lazily connecting database pool, sets up the Axum router
//! and starts the HTTP server.

use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dbcheck::config::{
    AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, POOL_EVENT_CHANNEL_CAPACITY,
    SINK_DRAIN_TIMEOUT_MS,
};
use dbcheck::db::{self, spawn_pool_event_logger, PoolEvents};
use dbcheck::http::start_server;
use dbcheck::logging::{ConsoleSink, Level, Logger, RemoteSink, RemoteSinkHandle};
use dbcheck::middleware::install_panic_hook;
use dbcheck::routes::create_router;
use dbcheck::state::AppState;
use dbcheck::templates::init_templates;

/// dbcheck: reports whether this service can reach its database
#[derive(Parser, Debug)]
#[command(name = "dbcheck", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "dbcheck=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(filter: &str, logging: &LoggingConfig) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));
    if logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Build the application logger: console always, remote collector when configured.
///
/// The returned handle drains the remote queue at shutdown.
fn build_logger(logging: &LoggingConfig) -> (Logger, Option<RemoteSinkHandle>) {
    let logger = Logger::new(logging.minimum_level, ConsoleSink::new());

    let Some(remote) = &logging.remote_sink else {
        return (logger, None);
    };

    match RemoteSink::spawn(
        remote.url.clone(),
        remote.timeout(),
        remote.queue_capacity,
        logger.local_only(),
    ) {
        Ok((sink, handle)) => {
            tracing::info!(url = %remote.url, "Remote log sink enabled");
            (logger.with_sink(sink), Some(handle))
        }
        Err(e) => {
            logger.log(
                Level::Warn,
                "Remote log sink disabled",
                json!({ "url": remote.url, "error": e.to_string() }),
            );
            (logger, None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Configuration is read before tracing starts so the output format can follow it
    let mut config = AppConfig::load(&args.config)?;
    config.apply_env(|key| std::env::var(key).ok());

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    init_tracing(&log_filter, &config.logging);

    let (logger, remote_sink) = build_logger(&config.logging);

    // Handler panics are logged with location and backtrace
    install_panic_hook();

    let target = config.database.target();
    logger.log(
        Level::Info,
        "Loaded configuration",
        json!({
            "http_host": config.http.host,
            "http_port": config.http.port,
            "db_host": target.host,
            "db_port": target.port,
            "db_name": target.database,
            "db_ssl_mode": config.database.ssl_mode.to_string(),
            "db_pool_size": config.database.pool_size,
            "db_timeout_ms": config.database.timeout_ms,
            "region": config.deployment.region,
        }),
    );

    // Pool lifecycle events flow to the logger
    let events = PoolEvents::new(POOL_EVENT_CHANNEL_CAPACITY);
    spawn_pool_event_logger(events.subscribe(), logger.clone());

    let database = db::connect(&config.database, events);
    let missing = config.database.missing_fields();
    if !missing.is_empty() {
        logger.log(
            Level::Warn,
            "Database is not configured; probes will fail",
            json!({ "missing": missing }),
        );
    }

    // Initialize Tera templates
    let tera = init_templates()?;
    tracing::info!("Initialized templates");

    // Create application state and router
    let http_config = config.http.clone();
    let state = AppState::new(config, tera, logger, database);
    let app = create_router(state);

    let served = start_server(app, &http_config).await;

    if let Some(handle) = remote_sink {
        if !handle.drain(Duration::from_millis(SINK_DRAIN_TIMEOUT_MS)).await {
            tracing::warn!("Remote log sink did not drain before shutdown");
        }
    }

    served?;
    Ok(())
}
