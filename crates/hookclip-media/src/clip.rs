//! Clip rendering.
//!
//! Each clip is cut from the source with an input-side seek, optionally
//! cropped around the dominant face, fitted into the platform canvas and
//! burned with its caption track.

use std::path::Path;
use std::time::Instant;

use hookclip_models::{HookWindow, PlatformSettings};
use tokio::sync::watch;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner, ToolRunner};
use crate::error::{MediaError, MediaResult};
use crate::face::CropRect;
use crate::progress::FfmpegProgress;

/// Per-clip encode ceiling in seconds.
pub const ENCODE_TIMEOUT_SECS: u64 = 600;

/// Renders hook windows into platform-ready clips.
#[derive(Debug, Clone)]
pub struct Clipper {
    settings: PlatformSettings,
    crop: Option<CropRect>,
    timeout_secs: u64,
}

impl Clipper {
    pub fn new(settings: PlatformSettings) -> Self {
        Self {
            settings,
            crop: None,
            timeout_secs: ENCODE_TIMEOUT_SECS,
        }
    }

    /// Crop applied before scaling, usually from face tracking.
    pub fn with_crop(mut self, crop: Option<CropRect>) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Video filter chain: `[crop,]scale,pad,setsar[,ass]`.
    pub fn filter_chain(&self, subtitles: Option<&Path>) -> String {
        let (w, h) = (self.settings.width, self.settings.height);
        let mut parts = Vec::with_capacity(5);

        if let Some(crop) = &self.crop {
            parts.push(crop.filter());
        }
        parts.push(format!("scale={}:{}:force_original_aspect_ratio=decrease", w, h));
        parts.push(format!("pad={}:{}:(ow-iw)/2:(oh-ih)/2", w, h));
        parts.push("setsar=1".to_string());
        if let Some(path) = subtitles {
            parts.push(format!("ass='{}'", escape_filter_path(path)));
        }

        parts.join(",")
    }

    /// FFmpeg invocation for one clip.
    pub fn build_command(
        &self,
        source: &Path,
        output: &Path,
        window: &HookWindow,
        subtitles: Option<&Path>,
    ) -> FfmpegCommand {
        FfmpegCommand::new(source, output)
            .seek(window.start)
            .duration(window.duration())
            .video_filter(self.filter_chain(subtitles))
            .video_codec(&self.settings.video_codec)
            .preset(&self.settings.preset)
            .crf(self.settings.crf)
            .audio_codec(&self.settings.audio_codec)
            .audio_bitrate(&self.settings.audio_bitrate)
            .faststart()
    }

    /// Render one clip, reporting encode progress as a 0-1 fraction.
    pub async fn render<F>(
        &self,
        source: &Path,
        output: &Path,
        window: &HookWindow,
        subtitles: Option<&Path>,
        cancel: Option<watch::Receiver<bool>>,
        on_progress: F,
    ) -> MediaResult<()>
    where
        F: Fn(f64) + Send + 'static,
    {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let started = Instant::now();
        let cmd = self.build_command(source, output, window, subtitles);
        let runner = FfmpegRunner::new(
            ToolRunner::new()
                .with_cancel_opt(cancel)
                .with_timeout_secs(self.timeout_secs),
        );

        let total = window.duration();
        runner
            .run_with_progress(&cmd, move |p: FfmpegProgress| on_progress(p.fraction(total)))
            .await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(MediaError::internal(format!(
                "ffmpeg produced no output at {}",
                output.display()
            )));
        }

        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!("hookclip_clip_render_seconds").record(elapsed);
        info!(
            "Rendered {} ({:.1}s from {:.1}s) in {:.1}s",
            output.display(),
            total,
            window.start,
            elapsed
        );
        Ok(())
    }
}

/// Escape a path for use inside a quoted filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookclip_models::Platform;
    use std::path::PathBuf;

    fn clipper() -> Clipper {
        Clipper::new(PlatformSettings::for_platform(Platform::Youtube))
    }

    #[test]
    fn test_filter_chain_without_crop() {
        assert_eq!(
            clipper().filter_chain(None),
            "scale=1080:1920:force_original_aspect_ratio=decrease,pad=1080:1920:(ow-iw)/2:(oh-ih)/2,setsar=1"
        );
    }

    #[test]
    fn test_filter_chain_with_crop_and_subtitles() {
        let crop = CropRect {
            x: 656,
            y: 0,
            width: 608,
            height: 1080,
        };
        let chain = clipper()
            .with_crop(Some(crop))
            .filter_chain(Some(Path::new("/out/job/clip_1.ass")));
        assert!(chain.starts_with("crop=608:1080:656:0,scale="));
        assert!(chain.ends_with(",setsar=1,ass='/out/job/clip_1.ass'"));
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path(Path::new("C:\\a\\b.ass")), "C\\:\\\\a\\\\b.ass");
        assert_eq!(escape_filter_path(Path::new("/tmp/it's.ass")), "/tmp/it'\\''s.ass");
    }

    #[test]
    fn test_build_command() {
        let window = HookWindow::new(12.0, 30.0, 0.8);
        let args = clipper()
            .build_command(Path::new("in.mp4"), &PathBuf::from("out/clip_1.mp4"), &window, None)
            .build_args();

        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert_eq!(args[ss + 1], "12.000");
        assert!(args.windows(2).any(|w| w == ["-t", "30.000"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-preset", "medium"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "20"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "128k"]));
        assert!(args.windows(2).any(|w| w == ["-movflags", "+faststart"]));
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(!args[vf + 1].contains("crop="));
        assert_eq!(args.last().unwrap(), "out/clip_1.mp4");
    }
}
