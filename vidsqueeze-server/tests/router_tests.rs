//! Router tests: isolation headers and SPA fallback behavior.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::fs;
use tower::ServiceExt;
use vidsqueeze_server::router;

async fn get(app: axum::Router, uri: &str) -> axum::http::Response<axum::body::Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn header<'a>(response: &'a axum::http::Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn every_response_carries_isolation_headers() {
    let dist = tempfile::tempdir().unwrap();
    fs::write(dist.path().join("index.html"), "<html>app</html>").unwrap();
    fs::write(dist.path().join("app.js"), "console.log('hi')").unwrap();
    let app = router(dist.path().to_path_buf());

    for uri in ["/", "/app.js", "/some/client/route"] {
        let response = get(app.clone(), uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(
            header(&response, "cross-origin-opener-policy"),
            Some("same-origin"),
            "{uri}"
        );
        assert_eq!(
            header(&response, "cross-origin-embedder-policy"),
            Some("require-corp"),
            "{uri}"
        );
    }
}

#[tokio::test]
async fn unknown_routes_fall_back_to_index() {
    let dist = tempfile::tempdir().unwrap();
    fs::write(dist.path().join("index.html"), "<html>app</html>").unwrap();
    let app = router(dist.path().to_path_buf());

    let response = get(app, "/convert/some-state").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"<html>app</html>");
}

#[tokio::test]
async fn missing_build_yields_404_with_guidance() {
    let dist = tempfile::tempdir().unwrap();
    let app = router(dist.path().to_path_buf());

    let response = get(app, "/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    // Isolation headers are present even on the error path.
    assert_eq!(
        header(&response, "cross-origin-opener-policy"),
        Some("same-origin")
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("Build output not found"));
}
