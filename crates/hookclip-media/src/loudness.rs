//! Per-second audio loudness sampling via FFmpeg `astats`.

use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner, ToolRunner};
use crate::error::MediaResult;

/// RMS levels at or below this are treated as silence.
const SILENCE_FLOOR_DB: f64 = -100.0;

/// Audio filter printing per-frame RMS level to stdout.
const ASTATS_FILTER: &str =
    "astats=metadata=1:reset=1,ametadata=print:key=lavfi.astats.Overall.RMS_level:file=-";

fn pts_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pts_time:(\d+\.?\d*)").expect("valid pts regex"))
}

fn rms_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"lavfi\.astats\.Overall\.RMS_level=(-?\d+\.?\d*|-inf)").expect("valid rms regex")
    })
}

/// One loudness reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessSample {
    /// Whole second the reading falls in
    pub time: u32,
    /// Linear loudness, normalized to 0-1 across the source
    pub value: f64,
}

/// Normalized loudness readings for a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoudnessProfile {
    samples: Vec<LoudnessSample>,
}

impl LoudnessProfile {
    /// Build from `(time, dBFS)` readings: convert to linear and normalize by the maximum.
    pub fn from_db_readings(readings: &[(f64, f64)]) -> Self {
        let mut samples: Vec<LoudnessSample> = readings
            .iter()
            .map(|&(time, db)| LoudnessSample {
                time: time.max(0.0).floor() as u32,
                value: db_to_linear(db),
            })
            .collect();

        let max = samples.iter().map(|s| s.value).fold(0.0_f64, f64::max);
        if max > 0.0 {
            for sample in &mut samples {
                sample.value /= max;
            }
        }
        Self { samples }
    }

    /// One already-normalized value per second, starting at zero.
    pub fn from_per_second(values: &[f64]) -> Self {
        Self {
            samples: values
                .iter()
                .enumerate()
                .map(|(i, &value)| LoudnessSample {
                    time: i as u32,
                    value,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LoudnessSample] {
        &self.samples
    }

    /// Number of whole seconds covered by the readings.
    pub fn seconds(&self) -> u32 {
        self.samples.iter().map(|s| s.time + 1).max().unwrap_or(0)
    }

    /// Values whose second lies in `[start, end)`.
    pub fn window(&self, start: f64, end: f64) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| s.time as f64 >= start && (s.time as f64) < end)
            .map(|s| s.value)
            .collect()
    }

    /// Mean loudness over `[start, end)`, if any readings fall in it.
    pub fn mean(&self, start: f64, end: f64) -> Option<f64> {
        let values = self.window(start, end);
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }
}

/// Convert dBFS to linear amplitude; the silence floor maps to zero.
pub fn db_to_linear(db: f64) -> f64 {
    if db <= SILENCE_FLOOR_DB {
        0.0
    } else {
        10f64.powf(db / 20.0)
    }
}

/// Parse `ametadata=print` output into `(time, dBFS)` readings.
///
/// A `pts_time:` line sets the current time, a `RMS_level=` line records a
/// reading at that time. `-inf` maps to the silence floor.
pub fn parse_astats(output: &str) -> Vec<(f64, f64)> {
    let mut current_time = 0.0;
    let mut readings = Vec::new();

    for line in output.lines() {
        if let Some(caps) = pts_regex().captures(line) {
            if let Ok(t) = caps[1].parse::<f64>() {
                current_time = t;
            }
        }
        if let Some(caps) = rms_regex().captures(line) {
            let db = match &caps[1] {
                "-inf" => SILENCE_FLOOR_DB,
                v => v.parse::<f64>().unwrap_or(SILENCE_FLOOR_DB),
            };
            readings.push((current_time, db));
        }
    }
    readings
}

/// Samples source loudness.
#[async_trait]
pub trait LoudnessAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        source: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<LoudnessProfile>;
}

/// [`LoudnessAnalyzer`] using FFmpeg's `astats` filter.
#[derive(Debug, Clone)]
pub struct FfmpegLoudness {
    timeout_secs: u64,
}

impl Default for FfmpegLoudness {
    fn default() -> Self {
        Self { timeout_secs: 600 }
    }
}

impl FfmpegLoudness {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl LoudnessAnalyzer for FfmpegLoudness {
    async fn analyze(
        &self,
        source: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<LoudnessProfile> {
        info!("Analyzing audio loudness of {}", source.display());

        let cmd = FfmpegCommand::analyze(source).audio_filter(ASTATS_FILTER);
        let runner = FfmpegRunner::new(
            ToolRunner::new()
                .with_cancel_opt(cancel)
                .with_timeout_secs(self.timeout_secs),
        );

        // ffmpeg can exit non-zero on trailing garbage and still print usable stats
        let output = runner.capture(&cmd).await?;
        if !output.success() {
            warn!("ffmpeg exited with {:?} during loudness analysis", output.exit_code);
        }

        let profile = LoudnessProfile::from_db_readings(&parse_astats(&output.stdout));
        info!("Analyzed {} seconds of audio", profile.seconds());
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OUTPUT: &str = "\
frame:0    pts:0       pts_time:0
lavfi.astats.Overall.RMS_level=-inf
frame:1    pts:1024    pts_time:0.5
lavfi.astats.Overall.RMS_level=-26.020600
frame:2    pts:2048    pts_time:1.2
lavfi.astats.Overall.RMS_level=-6.020600
";

    #[test]
    fn test_parse_astats() {
        let readings = parse_astats(SAMPLE_OUTPUT);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0], (0.0, -100.0));
        assert!((readings[1].0 - 0.5).abs() < 1e-9);
        assert!((readings[2].1 + 6.0206).abs() < 1e-4);
    }

    #[test]
    fn test_profile_normalization() {
        let profile = LoudnessProfile::from_db_readings(&parse_astats(SAMPLE_OUTPUT));
        let samples = profile.samples();
        assert_eq!(samples[0].value, 0.0);
        assert_eq!(samples[1].time, 0);
        assert_eq!(samples[2].time, 1);
        assert!((samples[2].value - 1.0).abs() < 1e-9);
        assert!((samples[1].value - 0.1).abs() < 1e-3);
        assert_eq!(profile.seconds(), 2);
    }

    #[test]
    fn test_window_and_mean() {
        let profile = LoudnessProfile::from_per_second(&[0.0, 0.5, 1.0, 0.5]);
        assert_eq!(profile.window(1.0, 3.0), vec![0.5, 1.0]);
        assert_eq!(profile.mean(1.0, 3.0), Some(0.75));
        assert_eq!(profile.mean(10.0, 12.0), None);
    }

    #[test]
    fn test_db_to_linear() {
        assert_eq!(db_to_linear(f64::NEG_INFINITY), 0.0);
        assert_eq!(db_to_linear(-100.0), 0.0);
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-12);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-12);
    }
}
