#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use pdf_workbench::config::AppConfig;
use pdf_workbench::services::viewer::NoOpViewer;
use pdf_workbench::{AppState, create_app};
use serde_json::Value;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "---------------------------pdfworkbench0123456789";

pub struct TestApp {
    pub dir: TempDir,
    pub app: Router,
    pub state: AppState,
    pub viewer: Arc<NoOpViewer>,
}

pub fn setup() -> TestApp {
    setup_with_ttl(Duration::from_secs(60))
}

pub fn setup_with_ttl(ttl: Duration) -> TestApp {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = TempDir::new().unwrap();
    let config = AppConfig::development(dir.path()).with_download_ttl(ttl);
    let store = pdf_workbench::infrastructure::storage::setup_storage(&config).unwrap();
    let viewer = Arc::new(NoOpViewer::default());
    let state = AppState::new(config, store, viewer.clone());
    let app = create_app(state.clone());
    TestApp {
        dir,
        app,
        state,
        viewer,
    }
}

/// Builds a multipart body with an optional `type` field and one `files`
/// part per entry.
pub fn multipart_body(kind: Option<&str>, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(kind) = kind {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\n{kind}\r\n"
        )
        .unwrap();
    }
    for (filename, data) in files {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .unwrap();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    write!(body, "--{BOUNDARY}--\r\n").unwrap();
    body
}

pub async fn upload(app: &Router, kind: Option<&str>, files: &[(&str, &[u8])]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(kind, files)))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn post_json(app: &Router, uri: &str, json: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}</w:body></w:document>",
        body
    );

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("word/document.xml", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap().into_inner()
}

/// A one-page PDF produced by the service itself, for redaction tests.
pub fn text_pdf(lines: &[&str]) -> Vec<u8> {
    let paragraphs: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    pdf_workbench::services::pdf::writer::render_document(
        "Test",
        &paragraphs,
        &pdf_workbench::services::pdf::TextLayout::default(),
    )
    .unwrap()
}

pub fn output_names(app: &TestApp) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(app.state.store.output_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
