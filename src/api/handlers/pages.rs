use crate::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::json;

const INDEX_PAGE: &str = include_str!("../../../static/index.html");
const EDITOR_PAGE: &str = include_str!("../../../static/redact_editor.html");

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub(crate) fn render_editor(filename: &str) -> String {
    let url_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();
    EDITOR_PAGE
        .replace("{{url_filename}}", &url_filename)
        .replace("{{filename}}", &escape_html(filename))
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Editor for a PDF in the redaction staging area.
pub async fn redact_editor(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    if !state.lifecycle.is_staged_for_redaction(&filename) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "File not found" })),
        )
            .into_response();
    }

    Html(render_editor(&filename)).into_response()
}
