//! Headless client: downloads through a running videodl server and reports progress.

use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use videodl::client::ApiClient;
use videodl::extractor::MediaKind;
use videodl::poller::{PollerConfig, PollerState};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct CliArgs {
    /// Video page URL
    url: String,

    /// Download the audio track only
    #[arg(short, long)]
    audio: bool,

    #[arg(short, long, default_value = "http://localhost:5000")]
    server: Url,

    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Seconds between progress polls
    #[arg(long, default_value_t = 1)]
    interval: u64,

    /// Consecutive poll failures before progress reporting gives up
    #[arg(long, default_value_t = 10)]
    max_failures: u32,

    /// Polls without forward progress before progress reporting gives up
    #[arg(long, default_value_t = 60)]
    max_stalled: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let args = CliArgs::parse();
    let kind = if args.audio {
        MediaKind::Audio
    } else {
        MediaKind::Video
    };
    let client = ApiClient::new(args.server.clone());

    let info = client
        .video_info(&args.url)
        .await
        .context("Failed to fetch video info")?;
    info!(
        "{} by {} ({} seconds)",
        info.title, info.author, info.length_seconds
    );

    let token = Uuid::new_v4().to_string();
    let mut poller = client.poller(
        &token,
        PollerConfig {
            interval: Duration::from_secs(args.interval.max(1)),
            max_consecutive_failures: args.max_failures,
            max_stalled_polls: args.max_stalled,
        },
    );

    let stop_polling = CancellationToken::new();
    let download = {
        let client = client.clone();
        let url = args.url.clone();
        let title = info.title.clone();
        let output = args.output.clone();
        let token = token.clone();
        let stop_polling = stop_polling.clone();
        tokio::spawn(async move {
            let result = client.download_to(&url, kind, &token, &title, &output).await;
            stop_polling.cancel();
            result
        })
    };

    let finished = poller
        .run(&stop_polling, |state| {
            if let PollerState::Polling { progress } = state {
                info!("{:.1}% downloaded", progress);
            }
        })
        .await;
    if let PollerState::Failed(reason) = &finished
        && reason != "cancelled"
    {
        warn!("Progress unavailable: {}", reason);
    }

    match download.await.context("Download task panicked")? {
        Ok((path, bytes)) => {
            info!("Done: {:?} ({:.2} MB)", path, bytes as f64 / 1024.0 / 1024.0);
            Ok(())
        }
        Err(e) => bail!("Download failed: {}", e),
    }
}
