//! Source download using yt-dlp.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::command::{check_tool, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// Format selector: best MP4 up to 1080p, falling back to any best stream.
const FORMAT_SELECTOR: &str = "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Metadata of a remote video, fetched without downloading it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVideoInfo {
    pub id: String,
    pub title: String,
    /// Duration in seconds
    pub duration: f64,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
}

/// Fetches remote sources onto local storage.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest`, returning the written path.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<PathBuf>;

    /// Fetch metadata only.
    async fn info(&self, url: &str) -> MediaResult<RemoteVideoInfo>;
}

/// yt-dlp settings.
#[derive(Debug, Clone)]
pub struct YtDlpConfig {
    /// Hand segment fetching to aria2c when it is installed
    pub aria2c_enabled: bool,
    pub aria2c_connections: u32,
    pub aria2c_split_size: String,
    pub download_timeout_secs: u64,
    pub info_timeout_secs: u64,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            aria2c_enabled: true,
            aria2c_connections: 16,
            aria2c_split_size: "1M".to_string(),
            download_timeout_secs: 600,
            info_timeout_secs: 30,
        }
    }
}

impl YtDlpConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            aria2c_enabled: std::env::var("ARIA2C_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(defaults.aria2c_enabled),
            aria2c_connections: std::env::var("ARIA2C_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.aria2c_connections),
            aria2c_split_size: std::env::var("ARIA2C_SPLIT_SIZE")
                .unwrap_or(defaults.aria2c_split_size),
            ..defaults
        }
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpJson {
    id: String,
    #[serde(default)]
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
}

/// [`Downloader`] backed by the yt-dlp CLI.
#[derive(Debug, Clone, Default)]
pub struct YtDlpDownloader {
    config: YtDlpConfig,
}

impl YtDlpDownloader {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    /// Build the download arguments.
    pub fn download_args(&self, url: &str, dest: &Path, use_aria2c: bool) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            FORMAT_SELECTOR.to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
        ];

        if use_aria2c {
            let n = self.config.aria2c_connections;
            args.extend([
                "--external-downloader".to_string(),
                "aria2c".to_string(),
                "--external-downloader-args".to_string(),
                format!("-x {} -s {} -k {}", n, n, self.config.aria2c_split_size),
            ]);
        } else {
            args.extend([
                "-N".to_string(),
                "8".to_string(),
                "--concurrent-fragments".to_string(),
                "8".to_string(),
            ]);
        }

        args.extend([
            "--no-playlist".to_string(),
            "-o".to_string(),
            dest.to_string_lossy().to_string(),
            url.to_string(),
        ]);
        args
    }

    fn aria2c_available(&self) -> bool {
        if !self.config.aria2c_enabled {
            return false;
        }
        match check_tool("aria2c") {
            Ok(_) => true,
            Err(_) => {
                warn!("aria2c enabled but not installed, using native downloader");
                false
            }
        }
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let use_aria2c = self.aria2c_available();
        info!(url = %url, aria2c = use_aria2c, "Downloading source");

        let args = self.download_args(url, dest, use_aria2c);
        ToolRunner::new()
            .with_cancel_opt(cancel)
            .with_timeout_secs(self.config.download_timeout_secs)
            .run("yt-dlp", &args)
            .await
            .map_err(|e| match e {
                MediaError::ToolFailed { message, .. } => MediaError::download_failed(message),
                other => other,
            })?;

        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(MediaError::download_failed("output file not found"));
        }

        info!("Source downloaded to {}", dest.display());
        Ok(dest.to_path_buf())
    }

    async fn info(&self, url: &str) -> MediaResult<RemoteVideoInfo> {
        let args = vec!["-j".to_string(), "--no-playlist".to_string(), url.to_string()];
        let output = ToolRunner::new()
            .with_timeout_secs(self.config.info_timeout_secs)
            .run("yt-dlp", &args)
            .await?;
        parse_info(&output.stdout)
    }
}

/// Parse `yt-dlp -j` output.
pub fn parse_info(json: &str) -> MediaResult<RemoteVideoInfo> {
    let raw: YtDlpJson = serde_json::from_str(json.trim())
        .map_err(|e| MediaError::malformed("yt-dlp", e.to_string()))?;
    let duration = raw
        .duration
        .ok_or_else(|| MediaError::malformed("yt-dlp", "missing duration"))?;
    Ok(RemoteVideoInfo {
        id: raw.id,
        title: raw.title,
        duration,
        uploader: raw.uploader,
        thumbnail: raw.thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_args_native() {
        let downloader = YtDlpDownloader::default();
        let args = downloader.download_args("https://youtu.be/x", Path::new("/d/j.mp4"), false);
        assert_eq!(args[1], FORMAT_SELECTOR);
        assert!(args.contains(&"--concurrent-fragments".to_string()));
        assert!(!args.contains(&"aria2c".to_string()));
        assert_eq!(&args[args.len() - 4..], ["--no-playlist", "-o", "/d/j.mp4", "https://youtu.be/x"]);
    }

    #[test]
    fn test_download_args_aria2c() {
        let downloader = YtDlpDownloader::new(YtDlpConfig {
            aria2c_connections: 4,
            ..Default::default()
        });
        let args = downloader.download_args("u", Path::new("o.mp4"), true);
        assert!(args.contains(&"aria2c".to_string()));
        assert!(args.contains(&"-x 4 -s 4 -k 1M".to_string()));
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(
            r#"{"id":"abc","title":"Talk","duration":321.5,"uploader":"Chan","thumbnail":"https://t/1.jpg","formats":[]}"#,
        )
        .unwrap();
        assert_eq!(info.id, "abc");
        assert_eq!(info.duration, 321.5);
        assert_eq!(info.uploader.as_deref(), Some("Chan"));

        assert!(parse_info(r#"{"id":"live"}"#).is_err());
        assert!(parse_info("not json").is_err());
    }
}
