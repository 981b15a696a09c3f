//! Clip rendering seam.

use std::path::Path;

use async_trait::async_trait;
use hookclip_media::{Clipper, CropRect, MediaResult};
use hookclip_models::{HookWindow, PlatformSettings};
use tokio::sync::watch;

/// Everything needed to render one clip.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub source: &'a Path,
    pub output: &'a Path,
    pub window: HookWindow,
    pub settings: PlatformSettings,
    pub crop: Option<CropRect>,
    /// Caption track to burn in
    pub subtitles: Option<&'a Path>,
}

/// Renders clips from a source file.
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    async fn render(
        &self,
        request: &RenderRequest<'_>,
        cancel: Option<watch::Receiver<bool>>,
        on_progress: Box<dyn Fn(f64) + Send>,
    ) -> MediaResult<()>;
}

/// [`ClipRenderer`] encoding with FFmpeg.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegRenderer;

#[async_trait]
impl ClipRenderer for FfmpegRenderer {
    async fn render(
        &self,
        request: &RenderRequest<'_>,
        cancel: Option<watch::Receiver<bool>>,
        on_progress: Box<dyn Fn(f64) + Send>,
    ) -> MediaResult<()> {
        Clipper::new(request.settings.clone())
            .with_crop(request.crop)
            .render(
                request.source,
                request.output,
                &request.window,
                request.subtitles,
                cancel,
                on_progress,
            )
            .await
    }
}
