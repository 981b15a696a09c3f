//! Clip uploader with account failover.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::PublishConfig;
use crate::error::{PublishError, PublishResult};
use crate::metadata::ClipMetadata;
use crate::platform::{OAuthTokens, VideoPlatform, YouTubeClient};
use crate::pool::{AccountPool, AccountStats};

/// A successfully published clip.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedVideo {
    pub id: String,
    pub url: String,
    pub account_id: u32,
}

/// Publishes clips through a rotating account pool.
pub struct Uploader {
    pool: AccountPool,
    platform: Arc<dyn VideoPlatform>,
    upload_delay: Duration,
}

impl Uploader {
    pub fn new(pool: AccountPool, platform: Arc<dyn VideoPlatform>, upload_delay: Duration) -> Self {
        if !pool.is_empty() {
            info!("Initialized {} YouTube account(s) for upload rotation", pool.len());
        }
        Self {
            pool,
            platform,
            upload_delay,
        }
    }

    /// YouTube uploader from `YOUTUBE_*` environment variables.
    pub fn from_config(config: PublishConfig) -> PublishResult<Self> {
        let pool = AccountPool::new(config.refresh_tokens.clone());
        let delay = config.upload_delay;
        let platform = Arc::new(YouTubeClient::new(config)?);
        Ok(Self::new(pool, platform, delay))
    }

    pub fn is_configured(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Pause between successive clip uploads of one job.
    pub fn upload_delay(&self) -> Duration {
        self.upload_delay
    }

    /// Upload `file`, moving to the next account on failure. Gives up after
    /// one attempt per account.
    pub async fn publish(&self, file: &Path, metadata: &ClipMetadata) -> PublishResult<PublishedVideo> {
        let attempts = self.pool.len();
        if attempts == 0 {
            return Err(PublishError::NotConfigured);
        }

        let mut last_error = String::new();
        for (attempt, account) in (1..=attempts).zip(self.pool.rotation()) {
            info!(
                "Using YouTube account {} ({} uploads so far)",
                account.id,
                account.upload_count()
            );

            match self.platform.upload(account.refresh_token(), file, metadata).await {
                Ok(video_id) => {
                    account.record_upload();
                    metrics::counter!("hookclip_uploads_total", "outcome" => "success").increment(1);
                    let url = self.platform.video_url(&video_id);
                    info!("Upload successful! Video ID: {} (account {})", video_id, account.id);
                    return Ok(PublishedVideo {
                        id: video_id,
                        url,
                        account_id: account.id,
                    });
                }
                Err(e) => {
                    error!("Upload failed on account {}: {}", account.id, e);
                    metrics::counter!("hookclip_uploads_total", "outcome" => "account_error").increment(1);
                    last_error = e.to_string();
                    if attempt < attempts {
                        warn!("Retrying with next account ({} attempts left)", attempts - attempt);
                    }
                }
            }
        }

        metrics::counter!("hookclip_uploads_total", "outcome" => "exhausted").increment(1);
        Err(PublishError::Exhausted {
            attempts,
            last_error,
        })
    }

    pub fn auth_url(&self) -> String {
        self.platform.auth_url()
    }

    pub async fn exchange_code(&self, code: &str) -> PublishResult<OAuthTokens> {
        self.platform.exchange_code(code).await
    }

    pub fn stats(&self) -> Vec<AccountStats> {
        self.pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails for the listed refresh tokens and records every attempt.
    struct FakePlatform {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakePlatform {
        fn new(failing: Vec<&'static str>) -> Self {
            Self {
                failing,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, token)| token.clone()).collect()
        }

        /// Tokens tried for `file`, sorted.
        fn tokens_for(&self, file: &str) -> Vec<String> {
            let mut tokens: Vec<String> = self
                .calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(f, _)| f == file)
                .map(|(_, token)| token.clone())
                .collect();
            tokens.sort();
            tokens
        }
    }

    #[async_trait]
    impl VideoPlatform for FakePlatform {
        async fn upload(&self, refresh_token: &str, file: &Path, _metadata: &ClipMetadata) -> PublishResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((file.display().to_string(), refresh_token.to_string()));
            // Let concurrent publishes interleave their attempts
            tokio::task::yield_now().await;
            if self.failing.contains(&refresh_token) {
                Err(PublishError::upload("quotaExceeded"))
            } else {
                Ok(format!("vid-{}", refresh_token))
            }
        }

        fn auth_url(&self) -> String {
            "https://auth.example".to_string()
        }

        async fn exchange_code(&self, _code: &str) -> PublishResult<OAuthTokens> {
            Err(PublishError::auth("unused"))
        }

        fn video_url(&self, video_id: &str) -> String {
            format!("https://youtube.com/shorts/{}", video_id)
        }
    }

    fn uploader(tokens: &[&str], platform: Arc<FakePlatform>) -> Uploader {
        let pool = AccountPool::new(tokens.iter().map(|t| t.to_string()).collect());
        Uploader::new(pool, platform, Duration::ZERO)
    }

    fn meta() -> ClipMetadata {
        ClipMetadata::for_clip("Video", 1, 1)
    }

    #[tokio::test]
    async fn test_fails_over_to_next_account() {
        let platform = Arc::new(FakePlatform::new(vec!["a"]));
        let up = uploader(&["a", "b"], platform.clone());

        let video = up.publish(Path::new("clip_1.mp4"), &meta()).await.unwrap();
        assert_eq!(video.account_id, 2);
        assert_eq!(video.url, "https://youtube.com/shorts/vid-b");
        assert_eq!(platform.calls(), vec!["a", "b"]);
        assert_eq!(up.stats()[1].upload_count, 1);
        assert_eq!(up.stats()[0].upload_count, 0);
    }

    #[tokio::test]
    async fn test_exhaustion_after_one_attempt_per_account() {
        let platform = Arc::new(FakePlatform::new(vec!["a", "b", "c"]));
        let up = uploader(&["a", "b", "c"], platform.clone());

        let err = up.publish(Path::new("clip_1.mp4"), &meta()).await.unwrap_err();
        assert!(matches!(err, PublishError::Exhausted { attempts: 3, .. }));
        assert_eq!(platform.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_publishes_each_try_every_account() {
        let platform = Arc::new(FakePlatform::new(vec!["a", "b"]));
        let up = uploader(&["a", "b"], platform.clone());

        let (meta1, meta2) = (meta(), meta());
        let (first, second) = tokio::join!(
            up.publish(Path::new("1.mp4"), &meta1),
            up.publish(Path::new("2.mp4"), &meta2)
        );
        assert!(matches!(first, Err(PublishError::Exhausted { attempts: 2, .. })));
        assert!(matches!(second, Err(PublishError::Exhausted { attempts: 2, .. })));
        assert_eq!(platform.tokens_for("1.mp4"), vec!["a", "b"]);
        assert_eq!(platform.tokens_for("2.mp4"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_not_configured() {
        let platform = Arc::new(FakePlatform::new(Vec::new()));
        let up = uploader(&[], platform.clone());
        assert!(!up.is_configured());
        assert!(matches!(
            up.publish(Path::new("x.mp4"), &meta()).await,
            Err(PublishError::NotConfigured)
        ));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rotation_continues_across_uploads() {
        let platform = Arc::new(FakePlatform::new(Vec::new()));
        let up = uploader(&["a", "b"], platform.clone());
        up.publish(Path::new("1.mp4"), &meta()).await.unwrap();
        up.publish(Path::new("2.mp4"), &meta()).await.unwrap();
        assert_eq!(platform.calls(), vec!["a", "b"]);
    }
}
