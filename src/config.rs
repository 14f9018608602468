use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::estimate::SizeHeuristic;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub log_level: String,
    pub ytdlp_path: String,
    pub metadata_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub progress_grace_secs: u64,
    pub sweep_interval_secs: u64,
    pub audio_bytes_per_second: u64,
    pub video_bytes_per_second: u64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            // Default settings
            .set_default("server_port", 5000)?
            .set_default("log_level", "info")?
            .set_default("ytdlp_path", "yt-dlp")?
            .set_default("metadata_timeout_secs", 60)?
            .set_default("download_timeout_secs", 3600)?
            .set_default("progress_grace_secs", 5)?
            .set_default("sweep_interval_secs", 60)?
            .set_default("audio_bytes_per_second", 32_000)?
            .set_default("video_bytes_per_second", 100_000)?
            // Config file (optional)
            .add_source(File::with_name("config").required(false))
            // Environment variables (e.g. VIDEODL_SERVER_PORT=8080)
            .add_source(Environment::with_prefix("VIDEODL"))
            // Plain PORT wins, like most hosting platforms expect
            .set_override_option("server_port", std::env::var("PORT").ok())?;

        builder.build()?.try_deserialize()
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn progress_grace(&self) -> Duration {
        Duration::from_secs(self.progress_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn size_heuristic(&self) -> SizeHeuristic {
        SizeHeuristic {
            audio_bytes_per_second: self.audio_bytes_per_second,
            video_bytes_per_second: self.video_bytes_per_second,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_port: 5000,
            log_level: "info".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            metadata_timeout_secs: 60,
            download_timeout_secs: 3600,
            progress_grace_secs: 5,
            sweep_interval_secs: 60,
            audio_bytes_per_second: 32_000,
            video_bytes_per_second: 100_000,
        }
    }
}
