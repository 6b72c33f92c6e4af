//! Handler errors and their HTTP rendering.
//!
//! Responses only ever carry a generic message; the detailed error goes to the
//! log sink, tagged with the request's correlation id when one is attached via
//! [`ResultExt::with_context`].

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde_json::json;

use crate::correlation::RequestContext;

/// Body text sent for every unexpected server-side failure.
pub const GENERIC_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Template rendering error: {0}")]
    Template(#[from] tera::Error),
}

fn error_page(status: StatusCode) -> Response {
    let body = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Error {}</title>
    <link rel="stylesheet" href="/static/css/style.css">
</head>
<body>
    <div class="container">
        <div class="error-page">
            <h1>Error {}</h1>
            <p>{}</p>
            <a href="/">Return to status page</a>
        </div>
    </div>
</body>
</html>"#,
        status.as_u16(),
        status.as_u16(),
        GENERIC_ERROR_MESSAGE
    );

    (status, Html(body)).into_response()
}

/// An [`AppError`] tied to the request it happened in. This is the only way
/// handler errors become responses, so the detail is always logged with the
/// correlation id.
#[derive(Debug)]
pub struct AppErrorResponse {
    error: AppError,
    context: RequestContext,
}

impl IntoResponse for AppErrorResponse {
    fn into_response(self) -> Response {
        self.context.error(
            "Request failed",
            json!({
                "error": self.error.to_string(),
                "error_debug": format!("{:?}", self.error),
            }),
        );
        error_page(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Attach the request context to an error so it is logged with the
/// correlation id.
pub trait ResultExt<T> {
    fn with_context(self, context: &RequestContext) -> Result<T, AppErrorResponse>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context(self, context: &RequestContext) -> Result<T, AppErrorResponse> {
        self.map_err(|e| AppErrorResponse {
            error: e.into(),
            context: context.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::logging::{Level, Logger, MemorySink};

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request_context() -> (RequestContext, MemorySink) {
        let sink = MemorySink::new();
        let context = RequestContext::new(
            CorrelationId::generate(),
            Logger::new(Level::Debug, sink.clone()),
        );
        (context, sink)
    }

    #[tokio::test]
    async fn test_error_body_is_generic() {
        let (context, _sink) = request_context();
        let result: Result<(), tera::Error> = Err(tera::Error::msg("secret detail"));
        let response = result.with_context(&context).unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_text(response).await;
        assert!(body.contains(GENERIC_ERROR_MESSAGE));
        assert!(!body.contains("secret detail"));
    }

    #[tokio::test]
    async fn test_with_context_logs_detail_with_correlation_id() {
        let (context, sink) = request_context();

        let result: Result<(), AppError> = Err(tera::Error::msg("disk on fire").into());
        let response = result.with_context(&context).unwrap_err().into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(response).await.contains("disk on fire"));

        let records = sink.records_for(context.id().as_str());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::Error);
        assert_eq!(
            records[0].field("error").unwrap(),
            "Template rendering error: disk on fire"
        );
    }
}
