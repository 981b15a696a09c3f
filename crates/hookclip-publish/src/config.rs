//! Publisher configuration.

use std::time::Duration;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com";

/// Default pause between successive clip uploads of one job.
pub const DEFAULT_UPLOAD_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// One refresh token per upload account, in rotation order
    pub refresh_tokens: Vec<String>,
    pub upload_delay: Duration,
    pub auth_url: String,
    pub token_url: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3001/api/oauth/callback".to_string(),
            refresh_tokens: Vec::new(),
            upload_delay: Duration::from_millis(DEFAULT_UPLOAD_DELAY_MS),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: YOUTUBE_API_BASE.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PublishConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            client_id: std::env::var("YOUTUBE_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("YOUTUBE_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: std::env::var("YOUTUBE_REDIRECT_URI").unwrap_or(defaults.redirect_uri),
            refresh_tokens: std::env::var("YOUTUBE_REFRESH_TOKENS")
                .map(|s| parse_refresh_tokens(&s))
                .unwrap_or_default(),
            upload_delay: Duration::from_millis(
                std::env::var("UPLOAD_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_UPLOAD_DELAY_MS),
            ),
            ..defaults
        }
    }
}

/// Split a comma-separated token list, dropping blanks.
pub fn parse_refresh_tokens(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refresh_tokens() {
        assert_eq!(parse_refresh_tokens(" a , b,,c ,"), vec!["a", "b", "c"]);
        assert!(parse_refresh_tokens("").is_empty());
    }
}
