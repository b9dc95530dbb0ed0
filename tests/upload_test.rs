mod common;

use axum::http::StatusCode;
use common::*;

#[tokio::test]
async fn test_upload_images_returns_batch() {
    let app = setup();
    let red = png(4, 4, [255, 0, 0]);

    let (status, json) = upload(&app.app, Some("image"), &[("a.png", &red)]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["folder"], "img");
    assert_eq!(json["count"], 1);
    assert_eq!(json["files"][0], "a.png");
    assert!(json["batch"].is_string());
}

#[tokio::test]
async fn test_type_defaults_to_image() {
    let app = setup();
    let (status, json) = upload(&app.app, None, &[("photo.jpg", b"jpegish")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["folder"], "img");
}

#[tokio::test]
async fn test_disallowed_extensions_are_dropped() {
    let app = setup();
    let img = png(2, 2, [0, 0, 255]);

    let (status, json) = upload(
        &app.app,
        Some("image"),
        &[("a.jpg", &img), ("b.exe", b"MZ\x90\x00")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["files"], serde_json::json!(["a.jpg"]));

    let staged: Vec<_> = std::fs::read_dir(app.state.store.staging_dir(
        pdf_workbench::services::store::StageKind::Image,
    ))
    .unwrap()
    .collect();
    assert_eq!(staged.len(), 1);
}

#[tokio::test]
async fn test_only_disallowed_files_is_rejected_and_nothing_stored() {
    let app = setup();
    let (status, json) = upload(&app.app, Some("image"), &[("b.exe", b"MZ")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No valid files uploaded");

    let staged = std::fs::read_dir(app.state.store.staging_dir(
        pdf_workbench::services::store::StageKind::Image,
    ))
    .unwrap()
    .count();
    assert_eq!(staged, 0);
}

#[tokio::test]
async fn test_missing_files_field() {
    let app = setup();
    let (status, json) = upload(&app.app, Some("image"), &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No files in request");
}

#[tokio::test]
async fn test_empty_filenames() {
    let app = setup();
    let (status, json) = upload(&app.app, Some("image"), &[("", b"data")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No files provided");
}

#[tokio::test]
async fn test_invalid_type() {
    let app = setup();
    let (status, json) = upload(&app.app, Some("video"), &[("a.png", b"x")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid type: video");
}

#[tokio::test]
async fn test_new_upload_replaces_previous_batch() {
    let app = setup();
    let img = png(2, 2, [0, 255, 0]);

    let (_, first) = upload(&app.app, Some("image"), &[("one.png", &img)]).await;
    let (_, second) = upload(&app.app, Some("image"), &[("two.png", &img)]).await;
    assert_ne!(first["batch"], second["batch"]);

    let staged: Vec<String> = std::fs::read_dir(app.state.store.staging_dir(
        pdf_workbench::services::store::StageKind::Image,
    ))
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
    assert_eq!(staged, vec!["two.png".to_string()]);
}

#[tokio::test]
async fn test_redact_upload_requires_pdf_content() {
    let app = setup();
    let pdf = text_pdf(&["hello"]);

    let (status, json) = upload(
        &app.app,
        Some("redact"),
        &[("real.pdf", &pdf), ("fake.pdf", b"not a pdf")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["folder"], "RedactPDF");
    assert_eq!(json["files"], serde_json::json!(["real.pdf"]));
    assert!(json.get("batch").is_none());
}

#[tokio::test]
async fn test_body_limit_is_enforced() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = pdf_workbench::config::AppConfig::development(dir.path());
    config.max_request_size = 1024;
    let store = pdf_workbench::infrastructure::storage::setup_storage(&config).unwrap();
    let state = pdf_workbench::AppState::new(
        config,
        store,
        std::sync::Arc::new(pdf_workbench::services::viewer::NoOpViewer::default()),
    );
    let app = pdf_workbench::create_app(state);

    let big = vec![0u8; 8 * 1024];
    let (status, _) = upload(&app, Some("image"), &[("big.png", &big)]).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
