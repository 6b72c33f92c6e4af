//! Status page handler.

use axum::{extract::State, response::Html, Extension};
use tracing::instrument;

use crate::correlation::RequestContext;
use crate::error::{AppErrorResponse, ResultExt};
use crate::state::AppState;

const UNKNOWN: &str = "unknown";

/// Status page: probes once and renders the outcome.
///
/// Shows server version, host and region on success, or an error panel with
/// the sanitized failure message.
#[instrument(name = "home::index", skip_all)]
pub async fn index(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
) -> Result<Html<String>, AppErrorResponse> {
    let result = state.probe.probe(state.database.as_ref(), &context).await;
    let target = state.database.target();

    let mut ctx = tera::Context::new();
    ctx.insert("probe", &result);
    ctx.insert("host", target.host.as_deref().unwrap_or(UNKNOWN));
    ctx.insert("database", target.database.as_deref().unwrap_or(UNKNOWN));
    ctx.insert("region", &state.config.deployment.region);
    ctx.insert("correlation_id", context.id().as_str());
    ctx.insert("version", env!("CARGO_PKG_VERSION"));

    let html = state
        .tera
        .render("status.html", &ctx)
        .with_context(&context)?;
    Ok(Html(html))
}
