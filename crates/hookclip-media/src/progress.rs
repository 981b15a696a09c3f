//! FFmpeg `-progress` output parsing.

use serde::{Deserialize, Serialize};

/// Encoder progress snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction (0.0-1.0) of `total_secs` already encoded.
    pub fn fraction(&self, total_secs: f64) -> f64 {
        if total_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / 1000.0 / total_secs).clamp(0.0, 1.0)
    }
}

/// Fold one `key=value` line into `current`.
///
/// Returns a snapshot at each `progress=` line, which closes a block.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // ffmpeg reports microseconds under both keys
        "out_time_ms" | "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }
    None
}
