use axum::{
    Json,
    extract::{Query, State},
    http::header::CACHE_CONTROL,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::extractor::MediaInfo;
use crate::identity::ClientIdentity;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct InfoQuery {
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub title: String,
    pub author: String,
    pub length_seconds: u64,
}

impl From<MediaInfo> for VideoInfo {
    fn from(info: MediaInfo) -> Self {
        Self {
            title: info.title,
            author: info.author,
            length_seconds: info.duration_seconds,
        }
    }
}

/// Accepts only absolute http(s) URLs.
pub fn validate_url(url: Option<String>) -> Result<String, AppError> {
    let url = url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(AppError::MissingUrl)?;

    let parsed = Url::parse(&url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::InvalidUrl(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        )));
    }
    Ok(url)
}

pub async fn video_info(
    State(state): State<AppState>,
    Query(query): Query<InfoQuery>,
) -> Result<Json<VideoInfo>, AppError> {
    let url = validate_url(query.url)?;
    info!("Fetching video info: {}", url);

    let media = state
        .extractor
        .fetch_info(&url)
        .await
        .map_err(|e| AppError::extraction("Failed to fetch video info", e))?;

    info!("Video info for {}: \"{}\" by {}", url, media.title, media.author);
    Ok(Json(media.into()))
}

pub async fn download_progress(
    State(state): State<AppState>,
    identity: ClientIdentity,
) -> impl IntoResponse {
    let report = state.registry.report(identity.key());
    ([(CACHE_CONTROL, "no-store")], Json(report))
}
