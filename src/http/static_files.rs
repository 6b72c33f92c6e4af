//! Static file serving for the status page assets.

use tower_http::services::ServeDir;

/// Create a static file service rooted at `dir`.
///
/// Missing files fall through to a plain 404 from `ServeDir`.
pub fn create_static_service(dir: &str) -> ServeDir {
    ServeDir::new(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_serves_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('hi');").unwrap();

        let service = create_static_service(dir.path().to_str().unwrap());
        let response = service
            .oneshot(Request::get("/app.js").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = create_static_service(dir.path().to_str().unwrap());
        let response = service
            .oneshot(Request::get("/nope.css").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
