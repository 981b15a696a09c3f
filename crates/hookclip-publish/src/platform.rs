//! Video platform connector.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PublishConfig;
use crate::error::{PublishError, PublishResult};
use crate::metadata::ClipMetadata;

const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// OAuth tokens returned by a code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

/// A platform clips can be published to.
#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Upload `file` on behalf of the account holding `refresh_token`. Returns the video id.
    async fn upload(&self, refresh_token: &str, file: &Path, metadata: &ClipMetadata) -> PublishResult<String>;

    /// Consent URL for linking a new account.
    fn auth_url(&self) -> String;

    /// Trade a consent code for tokens.
    async fn exchange_code(&self, code: &str) -> PublishResult<OAuthTokens>;

    /// Public URL of an uploaded video.
    fn video_url(&self, video_id: &str) -> String;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    category_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus<'a> {
    privacy_status: &'a str,
    self_declared_made_for_kids: bool,
}

#[derive(Debug, Serialize)]
struct VideoResource<'a> {
    snippet: VideoSnippet<'a>,
    status: VideoStatus<'a>,
}

#[derive(Debug, Deserialize)]
struct VideoInsertResponse {
    id: String,
}

/// YouTube Data API v3 connector using resumable uploads.
pub struct YouTubeClient {
    client: Client,
    config: PublishConfig,
}

impl YouTubeClient {
    pub fn new(config: PublishConfig) -> PublishResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> PublishResult<TokenResponse> {
        let response = self.client.post(&self.config.token_url).form(params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::auth(format!(
                "token endpoint returned {}: {}",
                status,
                api_error_message(&body)
            )));
        }
        Ok(response.json().await?)
    }

    async fn access_token(&self, refresh_token: &str) -> PublishResult<String> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        Ok(self.token_request(&params).await?.access_token)
    }
}

/// Pull a readable message out of a Google API error body.
fn api_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    match value.get("error") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(details) => details
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| details.to_string()),
        None => body.to_string(),
    }
}

#[async_trait]
impl VideoPlatform for YouTubeClient {
    async fn upload(&self, refresh_token: &str, file: &Path, metadata: &ClipMetadata) -> PublishResult<String> {
        let access_token = self.access_token(refresh_token).await?;
        let body = tokio::fs::read(file).await?;

        let resource = VideoResource {
            snippet: VideoSnippet {
                title: &metadata.title,
                description: &metadata.description,
                tags: &metadata.tags,
                category_id: &metadata.category_id,
            },
            status: VideoStatus {
                privacy_status: &metadata.privacy_status,
                self_declared_made_for_kids: false,
            },
        };

        info!("Uploading to YouTube: {}", metadata.title);

        // Start a resumable session; the upload target comes back in Location
        let session = self
            .client
            .post(format!(
                "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
                self.config.api_base.trim_end_matches('/')
            ))
            .bearer_auth(&access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", body.len())
            .json(&resource)
            .send()
            .await?;

        if !session.status().is_success() {
            let status = session.status();
            let text = session.text().await.unwrap_or_default();
            return Err(PublishError::upload(format!("{}: {}", status, api_error_message(&text))));
        }
        let location = session
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::upload("upload session has no Location header"))?;
        debug!("Resumable upload session: {}", location);

        let response = self
            .client
            .put(&location)
            .bearer_auth(&access_token)
            .header(header::CONTENT_TYPE, "video/mp4")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::upload(format!("{}: {}", status, api_error_message(&text))));
        }
        let inserted: VideoInsertResponse = response.json().await?;
        Ok(inserted.id)
    }

    fn auth_url(&self) -> String {
        format!(
            "{}?access_type=offline&prompt=consent&response_type=code&client_id={}&redirect_uri={}&scope={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(UPLOAD_SCOPE)
        )
    }

    async fn exchange_code(&self, code: &str) -> PublishResult<OAuthTokens> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let token = self.token_request(&params).await?;

        Ok(OAuthTokens {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            scope: token.scope,
        })
    }

    fn video_url(&self, video_id: &str) -> String {
        format!("https://youtube.com/shorts/{}", video_id)
    }
}
