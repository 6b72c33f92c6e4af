//! Request pipeline middleware: correlation, timing, and panic containment.
//!
//! Every request gets a [`RequestContext`] (inbound correlation id or a fresh
//! one), an entry record, and a completion record with status and duration.
//! The correlation id is echoed back in the `x-correlation-id` response header.
//! A panicking handler is caught here, logged, and turned into a generic 500.
//! With [`install_panic_hook`] in place the error record also carries the
//! panic location and a backtrace.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::FutureExt;
use serde_json::json;
use tracing::Instrument;

use crate::correlation::{RequestContext, CORRELATION_ID_HEADER};
use crate::error::GENERIC_ERROR_MESSAGE;
use crate::logging::{Level, Logger};

/// Location and stack of the most recent panic on this thread.
#[derive(Debug)]
struct PanicDetail {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicDetail>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Install a process-wide panic hook that captures the location and backtrace
/// of each panic for [`correlation_layer`]. The previously installed hook
/// still runs. Calling this more than once has no further effect.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let detail = PanicDetail {
                location: info.location().map(|l| l.to_string()),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(detail));
            previous(info);
        }));
    });
}

// The handler future is polled inside `catch_unwind`, so the hook ran on
// this same thread during this same poll.
fn take_panic_detail() -> Option<PanicDetail> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Middleware wrapping the whole request lifecycle.
///
/// This should be the outermost layer so the context and span cover all other
/// middleware and handlers.
pub async fn correlation_layer(
    State(logger): State<Logger>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = RequestContext::begin(request.headers(), logger);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    let span = tracing::info_span!(
        "request",
        correlation_id = %context.id(),
        method = %method,
        path = %path,
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    context.info(
        "Request received",
        json!({
            "method": method.as_str(),
            "path": path,
            "remote_addr": remote_addr,
        }),
    );

    request.extensions_mut().insert(context.clone());

    async move {
        let mut response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                let detail = take_panic_detail();
                context.error(
                    "Request handler panicked",
                    json!({
                        "panic": panic_message(panic.as_ref()),
                        "location": detail.as_ref().and_then(|d| d.location.clone()),
                        "backtrace": detail.map(|d| d.backtrace),
                    }),
                );
                internal_error_response()
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::Span::current().record("duration_ms", duration_ms);

        let status = response.status();
        let level = if status.is_server_error() {
            Level::Warn
        } else {
            Level::Info
        };
        context.log(
            level,
            "Request completed",
            json!({
                "status": status.as_u16(),
                "duration_ms": duration_ms,
            }),
        );

        if let Ok(value) = HeaderValue::from_str(context.id().as_str()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
        }

        response
    }
    .instrument(span)
    .await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "status": "error", "message": GENERIC_ERROR_MESSAGE })),
    )
        .into_response()
}
