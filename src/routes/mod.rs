//! HTTP route handlers.
//!
//! Probe-backed routes are never cached; static assets get a moderate cache
//! lifetime. Every route sits behind the correlation middleware, which stamps
//! each request with a correlation id and logs its entry and completion.

pub mod db;
pub mod health;
pub mod home;

use axum::{middleware, routing::get, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CACHE_CONTROL_NO_STORE, CACHE_CONTROL_STATIC};
use crate::http::static_files::create_static_service;
use crate::middleware::correlation_layer;
use crate::state::AppState;

/// Creates the Axum router with all routes and cache headers.
pub fn create_router(state: AppState) -> Router {
    // Anything that runs a probe or reports liveness must be fresh
    let probe_routes = Router::new()
        .route("/", get(home::index))
        .route("/db-status", get(db::status))
        .route("/db-test", get(db::test))
        .route("/health", get(health::health))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        ));

    let static_routes = Router::new()
        .nest_service(
            "/static",
            create_static_service(&state.config.http.static_dir),
        )
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_STATIC),
        ));

    let logger = state.logger.clone();

    Router::new()
        .merge(probe_routes)
        .merge(static_routes)
        .with_state(state)
        // Correlation middleware - outermost, so its span and context cover everything
        .layer(middleware::from_fn_with_state(logger, correlation_layer))
}
