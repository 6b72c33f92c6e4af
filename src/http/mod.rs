//! HTTP server module.
//!
//! Serves plain HTTP (TLS termination is left to the load balancer in front of
//! the service) with:
//! - Client address capture for request logging
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Static asset serving for the status page

mod server;
mod shutdown;
pub mod static_files;

pub use server::{start_server, ServerError};
