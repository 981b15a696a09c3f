//! Per-platform encoding settings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::Platform;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default CRF for short-form output
pub const DEFAULT_CRF: u8 = 20;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Vertical 9:16 output resolution
pub const VERTICAL_WIDTH: u32 = 1080;
pub const VERTICAL_HEIGHT: u32 = 1920;

/// Output geometry and encoder settings for a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlatformSettings {
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl PlatformSettings {
    /// Settings for the given platform. All supported platforms share the
    /// vertical 1080x1920 profile today.
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Youtube | Platform::Instagram | Platform::Tiktok => Self::vertical(),
        }
    }

    fn vertical() -> Self {
        Self {
            width: VERTICAL_WIDTH,
            height: VERTICAL_HEIGHT,
            video_codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }

    /// Target aspect ratio (width / height).
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}
