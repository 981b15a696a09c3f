//! Source URL helpers.

use thiserror::Error;
use url::Url;

/// Errors from YouTube video ID extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YoutubeIdError {
    #[error("URL is not a valid YouTube URL")]
    InvalidYoutubeUrl,
    #[error("Video ID has invalid format")]
    InvalidVideoId,
    #[error("Video ID not found in URL")]
    VideoIdNotFound,
}

/// Path prefixes that carry the ID as the next path segment.
const ID_PATH_PREFIXES: [&str; 4] = ["embed", "v", "shorts", "live"];

/// Whether the host belongs to YouTube.
pub fn is_youtube_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "youtu.be"
        || host == "youtube.com"
        || host.ends_with(".youtube.com")
}

/// Extract the 11-character video ID from any common YouTube URL shape.
///
/// Handles `watch?v=`, `youtu.be/`, `embed/`, `v/`, `shorts/` and `live/`.
pub fn extract_youtube_id(raw: &str) -> Result<String, YoutubeIdError> {
    let url = Url::parse(raw.trim()).map_err(|_| YoutubeIdError::InvalidYoutubeUrl)?;
    let host = url.host_str().ok_or(YoutubeIdError::InvalidYoutubeUrl)?;
    if !is_youtube_host(host) {
        return Err(YoutubeIdError::InvalidYoutubeUrl);
    }

    let mut segments = url.path_segments().map(|s| s.filter(|p| !p.is_empty()));

    let candidate = if host.eq_ignore_ascii_case("youtu.be") {
        segments.as_mut().and_then(|s| s.next()).map(str::to_string)
    } else if url.path() == "/watch" {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
    } else {
        segments.and_then(|mut s| {
            let prefix = s.next()?;
            if ID_PATH_PREFIXES.contains(&prefix) {
                s.next().map(str::to_string)
            } else {
                None
            }
        })
    };

    let id = candidate.ok_or(YoutubeIdError::VideoIdNotFound)?;
    validate_youtube_id(id)
}

fn validate_youtube_id(id: String) -> Result<String, YoutubeIdError> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if id.len() != 11 || !valid_chars {
        return Err(YoutubeIdError::InvalidVideoId);
    }
    Ok(id)
}
