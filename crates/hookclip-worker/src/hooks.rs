//! Hook detection: picking the most engaging windows of a source.
//!
//! Three strategies, selected by [`DetectionMode`]:
//! - **quick** slides a window over per-second loudness and scores energy,
//!   variance, peaks and silence;
//! - **smart** scores transcript chunks with an LLM and fuses the result
//!   with the mean loudness of each chunk;
//! - **even** spaces windows evenly with a little jitter.
//!
//! Smart falls back to quick, and quick to even, when their inputs are
//! missing. The fallback is part of the result so callers can report it.

use std::path::Path;
use std::sync::Arc;

use hookclip_media::{LoudnessAnalyzer, LoudnessProfile, MediaError, MediaResult};
use hookclip_models::{chunk_segments, DetectionMode, HookWindow, Transcript};
use hookclip_scorer::ChunkScorer;
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::metrics;

const LLM_WEIGHT: f64 = 0.7;
const AUDIO_WEIGHT: f64 = 0.3;
/// Audio score of a chunk with no loudness readings
const NEUTRAL_AUDIO: f64 = 0.5;
/// Half-width of the random offset applied to evenly spaced windows
const EVEN_JITTER_SECS: i32 = 10;

/// Outcome of hook detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// The requested strategy produced the windows
    Detected { windows: Vec<HookWindow> },
    /// A simpler strategy stood in for the requested one
    Fallback {
        windows: Vec<HookWindow>,
        reason: String,
    },
}

impl Detection {
    pub fn windows(&self) -> &[HookWindow] {
        match self {
            Detection::Detected { windows } | Detection::Fallback { windows, .. } => windows,
        }
    }

    pub fn into_windows(self) -> Vec<HookWindow> {
        match self {
            Detection::Detected { windows } | Detection::Fallback { windows, .. } => windows,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Detection::Fallback { .. })
    }

    fn fallback(self, reason: String) -> Self {
        match self {
            Detection::Detected { windows } => Detection::Fallback { windows, reason },
            // Keep the whole chain of reasons
            Detection::Fallback { windows, reason: inner } => Detection::Fallback {
                windows,
                reason: format!("{}; {}", reason, inner),
            },
        }
    }
}

/// Inputs of one detection run.
pub struct DetectRequest<'a> {
    pub source: &'a Path,
    /// Target clip duration, seconds
    pub target_duration: f64,
    pub count: usize,
    /// Source duration, seconds
    pub total_duration: f64,
    pub mode: DetectionMode,
    /// Job transcript, required by smart mode
    pub transcript: Option<&'a Transcript>,
    /// Source title, passed to the LLM
    pub title: &'a str,
    pub cancel: Option<watch::Receiver<bool>>,
}

/// Finds hook windows.
#[derive(Clone)]
pub struct HookDetector {
    loudness: Arc<dyn LoudnessAnalyzer>,
    scorer: Arc<dyn ChunkScorer>,
}

impl HookDetector {
    pub fn new(loudness: Arc<dyn LoudnessAnalyzer>, scorer: Arc<dyn ChunkScorer>) -> Self {
        Self { loudness, scorer }
    }

    /// Detect windows. Fails only when cancelled.
    pub async fn find(&self, request: DetectRequest<'_>) -> MediaResult<Detection> {
        let DetectRequest {
            source,
            target_duration,
            count,
            total_duration,
            mode,
            transcript,
            title,
            cancel,
        } = request;

        let detection = match mode {
            DetectionMode::Even => Detection::Detected {
                windows: even_windows(total_duration, target_duration, count, &mut rand::rng()),
            },
            DetectionMode::Quick => {
                let profile = self.profile(source, cancel).await?;
                quick_detection(&profile, target_duration, count, total_duration)
            }
            DetectionMode::Smart => {
                let profile = self.profile(source, cancel).await?;
                match transcript {
                    Some(transcript) => {
                        self.smart_detection(transcript, &profile, title, target_duration, count, total_duration)
                            .await
                    }
                    None => quick_detection(&profile, target_duration, count, total_duration)
                        .fallback("no transcript available".to_string()),
                }
            }
        };

        if let Detection::Fallback { reason, .. } = &detection {
            warn!("{} detection fell back: {}", mode.as_str(), reason);
            metrics::record_detection_fallback(mode.as_str());
        }
        info!(
            "{} detection selected {} window(s)",
            mode.as_str(),
            detection.windows().len()
        );
        Ok(detection)
    }

    /// Loudness readings; any failure other than cancellation means no data.
    async fn profile(
        &self,
        source: &Path,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<LoudnessProfile> {
        match self.loudness.analyze(source, cancel).await {
            Ok(profile) => Ok(profile),
            Err(MediaError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                warn!("Loudness analysis failed, continuing without audio data: {}", e);
                Ok(LoudnessProfile::default())
            }
        }
    }

    async fn smart_detection(
        &self,
        transcript: &Transcript,
        profile: &LoudnessProfile,
        title: &str,
        target_duration: f64,
        count: usize,
        total_duration: f64,
    ) -> Detection {
        let chunks = chunk_segments(&transcript.segments, target_duration);
        if chunks.is_empty() {
            return quick_detection(profile, target_duration, count, total_duration)
                .fallback("transcript has no segments".to_string());
        }

        let llm_scores = self.scorer.score_chunks(&chunks, title).await;
        let candidates: Vec<HookWindow> = chunks
            .iter()
            .zip(llm_scores)
            .filter_map(|(chunk, llm)| {
                let audio = profile
                    .mean(chunk.start, chunk.end)
                    .map(|v| v.clamp(0.0, 1.0))
                    .unwrap_or(NEUTRAL_AUDIO);
                let window = HookWindow::new(
                    chunk.start.floor(),
                    target_duration,
                    LLM_WEIGHT * llm + AUDIO_WEIGHT * audio,
                );
                (window.end <= total_duration).then_some(window)
            })
            .collect();

        let windows = select_windows(candidates, target_duration, count);
        if windows.is_empty() {
            return quick_detection(profile, target_duration, count, total_duration)
                .fallback("no transcript chunk fits inside the source".to_string());
        }
        Detection::Detected { windows }
    }
}

/// Score of the window starting at `start`, or `None` without readings.
pub fn energy_score(profile: &LoudnessProfile, start: u32, target_duration: f64) -> Option<f64> {
    let values = profile.window(start as f64, start as f64 + target_duration);
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let avg = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / n;
    let peaks = values.iter().filter(|&&v| v > avg * 1.5).count() as f64;
    let silent_ratio = values.iter().filter(|&&v| v < 0.05).count() as f64 / n;

    let silence_penalty = if silent_ratio > 0.3 { silent_ratio * 0.5 } else { 0.0 };
    let opening_bonus = if start <= 10 { 0.2 } else { 0.0 };

    Some(
        0.4 * avg + 0.25 * (variance * 10.0).min(1.0) + 0.15 * (peaks / target_duration).min(0.3)
            - silence_penalty
            + opening_bonus,
    )
}

/// Audio-energy detection, falling back to even spacing with too little audio.
pub fn quick_detection(
    profile: &LoudnessProfile,
    target_duration: f64,
    count: usize,
    total_duration: f64,
) -> Detection {
    let seconds = profile.seconds() as f64;
    if seconds < target_duration {
        return Detection::Fallback {
            windows: even_windows(total_duration, target_duration, count, &mut rand::rng()),
            reason: format!(
                "only {}s of audio data for {}s clips",
                seconds, target_duration
            ),
        };
    }

    let last_start = (seconds - target_duration).floor() as u32;
    let candidates: Vec<HookWindow> = (0..=last_start)
        .filter_map(|start| {
            energy_score(profile, start, target_duration)
                .map(|score| HookWindow::new(start as f64, target_duration, score))
        })
        .filter(|w| total_duration <= 0.0 || w.end <= total_duration)
        .collect();

    Detection::Detected {
        windows: select_windows(candidates, target_duration, count),
    }
}

/// Best-first greedy selection of non-overlapping windows, returned in time order.
pub fn select_windows(mut candidates: Vec<HookWindow>, target_duration: f64, count: usize) -> Vec<HookWindow> {
    // Stable: equal scores keep the earlier window first
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selected: Vec<HookWindow> = Vec::with_capacity(count);
    for candidate in candidates {
        if selected.len() >= count {
            break;
        }
        if selected.iter().all(|kept| !kept.overlaps(&candidate, target_duration)) {
            selected.push(candidate);
        }
    }

    selected.sort_by(|a, b| a.start.total_cmp(&b.start));
    selected
}

/// Evenly spaced windows; the first starts at zero, the rest get a small
/// whole-second jitter.
///
/// A start is pushed to at least one clip length after the previous window,
/// and windows that no longer fit inside the source are dropped.
pub fn even_windows<R: Rng + ?Sized>(
    total_duration: f64,
    target_duration: f64,
    count: usize,
    rng: &mut R,
) -> Vec<HookWindow> {
    let span = (total_duration - target_duration).max(0.0).floor();
    let spacing = span / count.max(1) as f64;

    let mut windows: Vec<HookWindow> = Vec::with_capacity(count);
    for i in 0..count {
        let start = match windows.last() {
            None => 0.0,
            Some(prev) => {
                let jitter = rng.random_range(-EVEN_JITTER_SECS..EVEN_JITTER_SECS) as f64;
                ((spacing * i as f64).floor() + jitter).max(prev.start + target_duration.ceil())
            }
        };
        if start > span {
            break;
        }
        windows.push(HookWindow::new(start, target_duration, 0.0));
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hookclip_models::{Chunk, TranscriptSegment};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct FixedLoudness(Vec<f64>);

    #[async_trait]
    impl LoudnessAnalyzer for FixedLoudness {
        async fn analyze(
            &self,
            _source: &Path,
            _cancel: Option<watch::Receiver<bool>>,
        ) -> MediaResult<LoudnessProfile> {
            Ok(LoudnessProfile::from_per_second(&self.0))
        }
    }

    struct FailingLoudness;

    #[async_trait]
    impl LoudnessAnalyzer for FailingLoudness {
        async fn analyze(
            &self,
            _source: &Path,
            _cancel: Option<watch::Receiver<bool>>,
        ) -> MediaResult<LoudnessProfile> {
            Err(MediaError::tool_failed("ffmpeg", "boom", None, Some(1)))
        }
    }

    /// Scores chunk `i` as `scores[i]`, neutral beyond.
    struct FixedScorer(Vec<f64>);

    #[async_trait]
    impl ChunkScorer for FixedScorer {
        async fn score_chunks(&self, chunks: &[Chunk], _title: &str) -> Vec<f64> {
            (0..chunks.len())
                .map(|i| self.0.get(i).copied().unwrap_or(0.5))
                .collect()
        }
    }

    fn detector(loudness: impl LoudnessAnalyzer + 'static, scores: Vec<f64>) -> HookDetector {
        HookDetector::new(Arc::new(loudness), Arc::new(FixedScorer(scores)))
    }

    fn request(mode: DetectionMode, target: f64, count: usize, total: f64) -> DetectRequest<'static> {
        DetectRequest {
            source: Path::new("source.mp4"),
            target_duration: target,
            count,
            total_duration: total,
            mode,
            transcript: None,
            title: "Talk",
            cancel: None,
        }
    }

    fn segment(id: u32, start: f64, end: f64) -> TranscriptSegment {
        TranscriptSegment {
            id,
            start,
            end,
            text: format!("segment {}", id),
            avg_logprob: 0.0,
            no_speech_prob: 0.0,
            words: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_quick_picks_loud_window() {
        let d = detector(FixedLoudness(vec![0.0, 0.0, 0.0, 0.9, 0.9, 0.9, 0.0, 0.0]), vec![]);
        let detection = d.find(request(DetectionMode::Quick, 3.0, 1, 8.0)).await.unwrap();

        assert!(!detection.is_fallback());
        let windows = detection.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start, 3.0);
        assert_eq!(windows[0].end, 6.0);
    }

    #[test]
    fn test_selection_never_overlaps() {
        let values: Vec<f64> = (0..300).map(|i| ((i * 37) % 100) as f64 / 100.0).collect();
        let profile = LoudnessProfile::from_per_second(&values);
        let windows = quick_detection(&profile, 30.0, 5, 300.0).into_windows();

        assert!(windows.len() <= 5);
        for (i, a) in windows.iter().enumerate() {
            assert!(a.start >= 0.0 && a.end <= 300.0);
            for b in &windows[i + 1..] {
                assert!((a.start - b.start).abs() >= 30.0);
            }
        }
        assert!(windows.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_quick_falls_back_to_even_without_audio() {
        let detection = quick_detection(&LoudnessProfile::default(), 30.0, 3, 120.0);
        assert!(detection.is_fallback());
        assert_eq!(detection.windows().len(), 3);
        assert_eq!(detection.windows()[0].start, 0.0);
    }

    #[tokio::test]
    async fn test_loudness_failure_means_no_data() {
        let d = detector(FailingLoudness, vec![]);
        let detection = d.find(request(DetectionMode::Quick, 30.0, 2, 100.0)).await.unwrap();
        assert!(detection.is_fallback());
    }

    #[test]
    fn test_even_windows_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let windows = even_windows(200.0, 40.0, 4, &mut rng);
            assert_eq!(windows[0].start, 0.0);
            for w in &windows {
                assert!(w.start >= 0.0 && w.start <= 160.0);
                assert_eq!(w.start, w.start.floor());
                assert!((w.duration() - 40.0).abs() < 1e-9);
                assert_eq!(w.score, 0.0);
            }
            assert_non_overlapping(&windows, 40.0);
        }
    }

    #[test]
    fn test_even_windows_never_overlap_when_tightly_packed() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            // Spacing (120 - 40) / 3 is below the clip duration
            let windows = even_windows(120.0, 40.0, 3, &mut rng);
            assert_eq!(windows.len(), 3);
            assert_eq!(windows[0].start, 0.0);
            assert_non_overlapping(&windows, 40.0);
            assert!(windows.iter().all(|w| w.end <= 120.0));
        }
    }

    fn assert_non_overlapping(windows: &[HookWindow], target: f64) {
        for (i, a) in windows.iter().enumerate() {
            for b in &windows[i + 1..] {
                assert!(
                    (a.start - b.start).abs() >= target,
                    "windows at {} and {} overlap",
                    a.start,
                    b.start
                );
            }
        }
    }

    #[test]
    fn test_energy_score_components() {
        // Constant loud window at the opening: 0.4 * 1.0 + opening bonus
        let profile = LoudnessProfile::from_per_second(&[1.0; 20]);
        let score = energy_score(&profile, 0, 10.0).unwrap();
        assert!((score - 0.6).abs() < 1e-9);

        // Past the opening the bonus is gone
        let profile = LoudnessProfile::from_per_second(&[1.0; 40]);
        let score = energy_score(&profile, 20, 10.0).unwrap();
        assert!((score - 0.4).abs() < 1e-9);

        // Silence is penalized
        let profile = LoudnessProfile::from_per_second(&[0.0; 40]);
        let score = energy_score(&profile, 20, 10.0).unwrap();
        assert!((score + 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_smart_prefers_high_llm_score() {
        let transcript = Transcript {
            segments: vec![segment(0, 0.0, 30.0), segment(1, 40.0, 70.0), segment(2, 80.0, 110.0)],
            ..Default::default()
        };
        let d = detector(FixedLoudness(vec![0.5; 150]), vec![0.1, 0.9, 0.2]);
        let mut req = request(DetectionMode::Smart, 30.0, 1, 150.0);
        req.transcript = Some(&transcript);

        let detection = d.find(req).await.unwrap();
        assert_eq!(
            detection,
            Detection::Detected {
                windows: vec![HookWindow::new(40.0, 30.0, 0.7 * 0.9 + 0.3 * 0.5)]
            }
        );
    }

    #[tokio::test]
    async fn test_smart_without_transcript_falls_back() {
        let d = detector(FixedLoudness(vec![0.5; 100]), vec![]);
        let detection = d.find(request(DetectionMode::Smart, 30.0, 2, 100.0)).await.unwrap();
        match detection {
            Detection::Fallback { windows, reason } => {
                assert!(reason.contains("no transcript"));
                assert!(!windows.is_empty());
            }
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_smart_discards_windows_past_the_end() {
        let transcript = Transcript {
            segments: vec![segment(0, 90.0, 95.0)],
            ..Default::default()
        };
        let d = detector(FixedLoudness(vec![0.5; 100]), vec![1.0]);
        let mut req = request(DetectionMode::Smart, 30.0, 1, 100.0);
        req.transcript = Some(&transcript);

        let detection = d.find(req).await.unwrap();
        assert!(detection.is_fallback());
        assert!(detection.windows().iter().all(|w| w.end <= 100.0));
    }
}
