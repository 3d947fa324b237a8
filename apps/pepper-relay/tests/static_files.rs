use std::path::PathBuf;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use pepper_relay::static_router;
use tower::util::ServiceExt;

fn site_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pepper-relay-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<h1>controller</h1>").unwrap();
    std::fs::write(dir.join("app.js"), "console.log('cue');").unwrap();
    dir
}

async fn get(dir: &PathBuf, uri: &str) -> (StatusCode, String) {
    let response = static_router(dir)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[test_timeout::tokio_timeout_test]
async fn root_serves_index() {
    let dir = site_dir("index");
    let (status, body) = get(&dir, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h1>controller</h1>");

    let (status, body) = get(&dir, "/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("cue"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test_timeout::tokio_timeout_test]
async fn missing_and_escaping_paths_are_not_found() {
    let dir = site_dir("missing");
    assert_eq!(get(&dir, "/nope.html").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(&dir, "/../secret.txt").await.0, StatusCode::NOT_FOUND);
    let _ = std::fs::remove_dir_all(&dir);
}
