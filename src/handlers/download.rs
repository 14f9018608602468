use crate::error::AppError;
use crate::extractor::{ExtractError, MediaKind};
use crate::handlers::api::validate_url;
use crate::identity::ClientIdentity;
use crate::state::AppState;
use crate::transfer;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{
        HeaderName, HeaderValue,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap},
    },
    response::IntoResponse,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Guessed size of the body. Approximate, never a real `Content-Length`.
pub const ESTIMATED_LENGTH_HEADER: HeaderName = HeaderName::from_static("x-estimated-content-length");
pub const DOWNLOAD_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-download-token");

const FILENAME: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~');

#[derive(Deserialize)]
pub struct DownloadQuery {
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

pub async fn download(
    State(state): State<AppState>,
    identity: ClientIdentity,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    let url = validate_url(query.url)?;
    let kind = match query.kind.as_deref() {
        None => MediaKind::Video,
        Some(value) => {
            MediaKind::parse(value).ok_or_else(|| AppError::InvalidMediaKind(value.to_string()))?
        }
    };

    let deadline = Instant::now() + state.settings.download_timeout();
    let cancel = state.shutdown.child_token();

    info!(
        "Starting {} download: {} (client {})",
        kind.as_str(),
        url,
        identity.key()
    );

    let media = bounded(deadline, &cancel, state.extractor.fetch_info(&url))
        .await
        .map_err(|e| AppError::extraction("Failed to download", e))?;
    let estimated_total = state
        .settings
        .size_heuristic()
        .estimated_size(kind, media.duration_seconds);

    let upstream = bounded(
        deadline,
        &cancel,
        state.extractor.open_stream(&url, kind, cancel.clone()),
    )
    .await
    .map_err(|e| AppError::extraction("Failed to download", e))?;

    let body = transfer::start(
        &state.registry,
        identity.key(),
        upstream,
        estimated_total,
        deadline,
        cancel,
    )
    .await
    .map_err(|e| AppError::extraction("Stream error occurred", e))?;

    info!(
        "Streaming \"{}\" by {} (~{} bytes)",
        media.title, media.author, estimated_total
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(kind.content_type()));
    if let Ok(val) = HeaderValue::from_str(&content_disposition(&media.title, kind)) {
        headers.insert(CONTENT_DISPOSITION, val);
    }
    headers.insert(ESTIMATED_LENGTH_HEADER, HeaderValue::from(estimated_total));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Some(token) = identity.token()
        && let Ok(val) = HeaderValue::from_str(token)
    {
        headers.insert(DOWNLOAD_TOKEN_HEADER, val);
    }

    Ok((headers, Body::from_stream(body)))
}

/// Runs `work` under the request deadline and the shutdown token.
async fn bounded<T>(
    deadline: Instant,
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, ExtractError>>,
) -> Result<T, ExtractError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ExtractError::Cancelled),
        result = tokio::time::timeout_at(deadline, work) => {
            result.unwrap_or_else(|_| Err(ExtractError::TimedOut))
        }
    }
}

pub fn content_disposition(title: &str, kind: MediaKind) -> String {
    let name = format!("{}.{}", utf8_percent_encode(title, FILENAME), kind.extension());
    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", name, name)
}
