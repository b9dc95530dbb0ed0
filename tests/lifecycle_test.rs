mod common;

use axum::http::{StatusCode, header};
use common::*;
use serde_json::json;
use std::time::Duration;

async fn make_pdf(app: &TestApp) -> String {
    let img = png(3, 3, [1, 2, 3]);
    upload(&app.app, Some("image"), &[("page.png", &img)]).await;
    let (status, json) = post_json(&app.app, "/api/convert", json!({ "type": "image" })).await;
    assert_eq!(status, StatusCode::OK);
    json["pdfs"][0].as_str().unwrap().to_string()
}

fn encoded(name: &str) -> String {
    name.replace('[', "%5B").replace(']', "%5D")
}

#[tokio::test]
async fn test_list_pdfs() {
    let app = setup();
    let (status, json) = get_json(&app.app, "/api/pdfs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "pdfs": [] }));

    let first = make_pdf(&app).await;
    let second = make_pdf(&app).await;

    let (_, json) = get_json(&app.app, "/api/pdfs").await;
    let pdfs = json["pdfs"].as_array().unwrap();
    assert_eq!(pdfs.len(), 2);
    assert_eq!(pdfs[0]["name"], second);
    assert_eq!(pdfs[1]["name"], first);
    assert!(pdfs[0]["size"].as_u64().unwrap() > 0);
    assert!(pdfs[0]["created"].is_string());
}

#[tokio::test]
async fn test_download_is_repeatable_inside_window_then_gone() {
    let app = setup_with_ttl(Duration::from_millis(300));
    let name = make_pdf(&app).await;
    let uri = format!("/api/download/{}", encoded(&name));

    let request = axum::http::Request::builder()
        .uri(&uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\""));

    let (status, first) = get(&app.app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = get(&app.app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert!(first.starts_with(b"%PDF"));

    let (_, health) = get_json(&app.app, "/health").await;
    assert_eq!(health["pending_deletions"], 1);

    let mut gone = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if get(&app.app, &uri).await.0 == StatusCode::NOT_FOUND {
            gone = true;
            break;
        }
    }
    assert!(gone, "artifact should be removed after the download window");
    assert!(output_names(&app).is_empty());
}

#[tokio::test]
async fn test_pdf_route_keeps_file() {
    let app = setup_with_ttl(Duration::from_millis(100));
    let name = make_pdf(&app).await;

    let (status, body) = get(&app.app, &format!("/pdf/{}", encoded(&name))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"%PDF"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(output_names(&app), vec![name]);
}

#[tokio::test]
async fn test_delete() {
    let app = setup();
    let name = make_pdf(&app).await;

    let (status, json) = delete(&app.app, &format!("/api/delete/{}", encoded(&name))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, json) = delete(&app.app, &format!("/api/delete/{}", encoded(&name))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());

    let (status, _) = delete(&app.app, "/api/delete/missing.pdf").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_cancels_pending_download_deletion() {
    let app = setup_with_ttl(Duration::from_secs(60));
    let name = make_pdf(&app).await;

    get(&app.app, &format!("/api/download/{}", encoded(&name))).await;
    assert_eq!(app.state.lifecycle.pending_deletions(), 1);

    delete(&app.app, &format!("/api/delete/{}", encoded(&name))).await;
    assert_eq!(app.state.lifecycle.pending_deletions(), 0);
}

#[tokio::test]
async fn test_open_uses_configured_viewer() {
    let app = setup();
    let name = make_pdf(&app).await;

    let (status, json) = get_json(&app.app, &format!("/api/open/{}", encoded(&name))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["message"], format!("Opening {}", name));
    assert_eq!(
        app.viewer.opened(),
        vec![app.state.store.output_dir().join(&name)]
    );

    let (status, _) = get_json(&app.app, "/api/open/nothing.pdf").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_index() {
    let app = setup();
    let (status, json) = get_json(&app.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["pending_deletions"], 0);

    let (status, body) = get(&app.app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("PDF Workbench"));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = setup();
    let request = axum::http::Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.app.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}
