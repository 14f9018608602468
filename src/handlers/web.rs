use axum::{
    http::{StatusCode, Uri, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "frontend/"]
struct Ui;

/// Serves the embedded browser UI; unknown paths get the index page.
pub async fn ui(uri: Uri) -> Response {
    let path = match uri.path().trim_start_matches('/') {
        "" => "index.html",
        path => path,
    };

    asset(path)
        .or_else(|| asset("index.html"))
        .unwrap_or_else(|| (StatusCode::NOT_FOUND, "UI assets missing").into_response())
}

fn asset(path: &str) -> Option<Response> {
    let file = Ui::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    Some(([(CONTENT_TYPE, mime.essence_str().to_string())], file.data).into_response())
}
