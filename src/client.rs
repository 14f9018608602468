//! HTTP client for the videodl API, used by the headless fetcher and tests.

use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;
use url::Url;

use crate::extractor::MediaKind;
use crate::handlers::api::VideoInfo;
use crate::poller::{PollerConfig, ProgressPoller};
use crate::progress::ProgressReport;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    details: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    pub fn download_url(
        &self,
        media_url: &str,
        kind: MediaKind,
        token: &str,
    ) -> Result<Url, ClientError> {
        let mut url = self.base.join("/api/download")?;
        url.query_pairs_mut()
            .append_pair("url", media_url)
            .append_pair("type", kind.as_str())
            .append_pair("token", token);
        Ok(url)
    }

    pub fn progress_url(&self, token: &str) -> Result<Url, ClientError> {
        let mut url = self.base.join("/api/download-progress")?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    pub async fn video_info(&self, media_url: &str) -> Result<VideoInfo, ClientError> {
        let mut url = self.base.join("/api/video-info")?;
        url.query_pairs_mut().append_pair("url", media_url);
        let response = checked(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn progress(&self, token: &str) -> Result<ProgressReport, ClientError> {
        let response = checked(self.http.get(self.progress_url(token)?).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Streams the media into `dir` and returns the written path and size.
    pub async fn download_to(
        &self,
        media_url: &str,
        kind: MediaKind,
        token: &str,
        title: &str,
        dir: &Path,
    ) -> Result<(PathBuf, u64), ClientError> {
        let url = self.download_url(media_url, kind, token)?;
        let response = checked(self.http.get(url).send().await?).await?;

        let path = dir.join(format!("{}.{}", file_stem(title), kind.extension()));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!("Saved {} bytes to {:?}", written, path);
        Ok((path, written))
    }

    pub fn poller(&self, token: &str, config: PollerConfig) -> ProgressPoller {
        ProgressPoller::new(self.clone(), token, config)
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(ErrorBody {
            error,
            details: Some(details),
        }) => format!("{} ({})", error, details),
        Ok(ErrorBody { error, .. }) => error,
        Err(_) => status.to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Title made safe for use as a file name.
pub fn file_stem(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}
