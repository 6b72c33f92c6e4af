//! Shared application state for request handlers.

use std::sync::Arc;
use tera::Tera;

use crate::config::AppConfig;
use crate::db::Database;
use crate::logging::Logger;
use crate::probe::HealthProbe;

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// Holds the configuration, the status page templates, the injected logger,
/// the database the probe talks to, and the probe itself.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tera: Arc<Tera>,
    pub logger: Logger,
    pub database: Arc<dyn Database>,
    pub probe: HealthProbe,
}

impl AppState {
    /// Creates the application state. The probe timeout follows the database
    /// timeout setting.
    pub fn new(config: AppConfig, tera: Tera, logger: Logger, database: Arc<dyn Database>) -> Self {
        let probe = HealthProbe::new(config.database.timeout());
        Self {
            config: Arc::new(config),
            tera: Arc::new(tera),
            logger,
            database,
            probe,
        }
    }
}
