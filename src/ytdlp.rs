use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extractor::{ExtractError, Extractor, MediaInfo, MediaKind, MediaStream};

/// Extractor backed by the `yt-dlp` executable.
pub struct YtDlp {
    binary: String,
    metadata_timeout: Duration,
}

#[derive(Deserialize)]
struct DumpedVideo {
    title: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    duration: Option<f64>,
}

impl From<DumpedVideo> for MediaInfo {
    fn from(video: DumpedVideo) -> Self {
        Self {
            title: video.title.unwrap_or_else(|| "Unknown".to_string()),
            author: video
                .uploader
                .or(video.channel)
                .unwrap_or_else(|| "Unknown".to_string()),
            duration_seconds: video.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
        }
    }
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, metadata_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            metadata_timeout,
        }
    }

    /// `-f` selector picking the best single file for the requested kind.
    pub fn format_selector(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Audio => "bestaudio/best",
            MediaKind::Video => "best[vcodec!=none][acodec!=none]/best",
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["--no-playlist", "--no-warnings"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, ExtractError> {
        let mut command = self.command();
        command
            .args(["--dump-single-json", "--", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = tokio::time::timeout(self.metadata_timeout, command.output())
            .await
            .map_err(|_| ExtractError::TimedOut)?
            .map_err(ExtractError::Launch)?;

        if !output.status.success() {
            return Err(ExtractError::Failed(last_error_line(&output.stderr)));
        }

        let video: DumpedVideo = serde_json::from_slice(&output.stdout)?;
        Ok(video.into())
    }

    async fn open_stream(
        &self,
        url: &str,
        kind: MediaKind,
        cancel: CancellationToken,
    ) -> Result<MediaStream, ExtractError> {
        let mut command = self.command();
        command
            .args(["--quiet", "-f", Self::format_selector(kind), "-o", "-", "--", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(ExtractError::Launch)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::Failed("yt-dlp stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("yt-dlp: {}", line);
                }
            });
        }

        info!("Spawned yt-dlp for {} ({})", url, kind.as_str());
        Ok(child_stream(child, stdout, cancel))
    }
}

struct ChildOutput {
    child: Child,
    reader: ReaderStream<ChildStdout>,
    cancel: CancellationToken,
}

/// Streams the child's stdout, then turns a failed exit status into an error.
fn child_stream(child: Child, stdout: ChildStdout, cancel: CancellationToken) -> MediaStream {
    let state = ChildOutput {
        child,
        reader: ReaderStream::new(stdout),
        cancel,
    };

    futures::stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        let next = tokio::select! {
            _ = state.cancel.cancelled() => {
                if let Err(e) = state.child.kill().await {
                    warn!("Failed to kill yt-dlp: {}", e);
                }
                return Some((Err(ExtractError::Cancelled), None));
            }
            next = state.reader.next() => next,
        };

        match next {
            Some(Ok(bytes)) => Some((Ok(bytes), Some(state))),
            Some(Err(e)) => Some((Err(ExtractError::Io(e)), None)),
            None => match state.child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some((
                    Err(ExtractError::Failed(format!("yt-dlp exited with {}", status))),
                    None,
                )),
                Err(e) => Some((Err(ExtractError::Io(e)), None)),
            },
        }
    })
    .boxed()
}

fn last_error_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("yt-dlp failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dumped_video_mapping() {
        let raw = r#"{"title":"Never Gonna","uploader":"Rick","duration":212.6,"formats":[]}"#;
        let info: MediaInfo = serde_json::from_str::<DumpedVideo>(raw).unwrap().into();
        assert_eq!(info.title, "Never Gonna");
        assert_eq!(info.author, "Rick");
        assert_eq!(info.duration_seconds, 213);
    }

    #[test]
    fn test_dumped_video_fallbacks() {
        let raw = r#"{"channel":"Some Channel","is_live":true}"#;
        let info: MediaInfo = serde_json::from_str::<DumpedVideo>(raw).unwrap().into();
        assert_eq!(info.title, "Unknown");
        assert_eq!(info.author, "Some Channel");
        assert_eq!(info.duration_seconds, 0);
    }

    #[test]
    fn test_last_error_line() {
        let stderr = b"WARNING: something\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(last_error_line(stderr), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(last_error_line(b""), "yt-dlp failed");
    }

    #[test]
    fn test_format_selector() {
        assert!(YtDlp::format_selector(MediaKind::Audio).starts_with("bestaudio"));
        assert!(YtDlp::format_selector(MediaKind::Video).contains("acodec!=none"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let extractor = YtDlp::new("/nonexistent/yt-dlp-binary", Duration::from_secs(5));
        let err = extractor
            .fetch_info("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Launch(_)));
    }
}
