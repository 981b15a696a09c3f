//! Transcript types and clip-sized chunking.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Chunks may span up to this multiple of the target clip duration.
pub const CHUNK_SPAN_FACTOR: f64 = 1.2;

/// A single recognised word with source-relative timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default = "default_probability")]
    pub probability: f64,
}

fn default_probability() -> f64 {
    1.0
}

/// A recognised segment (roughly one sentence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    pub id: u32,
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub avg_logprob: f64,
    #[serde(default)]
    pub no_speech_prob: f64,
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
}

/// Output of the transcription adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct Transcript {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub language_probability: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// All words across segments, in order.
    pub fn words(&self) -> impl Iterator<Item = &TranscriptWord> {
        self.segments.iter().flat_map(|s| s.words.iter())
    }

    /// Words fully inside `[start, end]`, re-based so the window starts at zero.
    pub fn words_in_window(&self, start: f64, end: f64) -> Vec<TranscriptWord> {
        self.words()
            .filter(|w| w.start >= start && w.end <= end)
            .map(|w| TranscriptWord {
                word: w.word.clone(),
                start: w.start - start,
                end: w.end - start,
                probability: w.probability,
            })
            .collect()
    }
}

/// A run of consecutive segments approximating one clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Chunk {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub segment_ids: Vec<u32>,
}

impl Chunk {
    fn from_segment(segment: &TranscriptSegment) -> Self {
        Self {
            start: segment.start,
            end: segment.end,
            text: segment.text.clone(),
            segment_ids: vec![segment.id],
        }
    }
}

/// Group segments into chunks no longer than 1.2x the clip duration.
///
/// A segment joins the open chunk unless `segment.end - chunk.start` would
/// exceed the bound, in which case it opens a new chunk.
pub fn chunk_segments(segments: &[TranscriptSegment], clip_duration: f64) -> Vec<Chunk> {
    let max_span = clip_duration * CHUNK_SPAN_FACTOR;
    let mut chunks = Vec::new();
    let mut current: Option<Chunk> = None;

    for segment in segments {
        match current.as_mut() {
            None => current = Some(Chunk::from_segment(segment)),
            Some(chunk) if segment.end - chunk.start > max_span => {
                let next = Chunk::from_segment(segment);
                if let Some(done) = current.replace(next) {
                    chunks.push(done);
                }
            }
            Some(chunk) => {
                chunk.end = segment.end;
                chunk.text.push(' ');
                chunk.text.push_str(&segment.text);
                chunk.segment_ids.push(segment.id);
            }
        }
    }

    chunks.extend(current);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: u32, start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            id,
            start,
            end,
            text: text.to_string(),
            avg_logprob: 0.0,
            no_speech_prob: 0.0,
            words: Vec::new(),
        }
    }

    #[test]
    fn test_chunking_respects_span_bound() {
        let segments = vec![
            seg(0, 0.0, 10.0, "a"),
            seg(1, 10.0, 20.0, "b"),
            seg(2, 20.0, 30.0, "c"),
            seg(3, 30.0, 40.0, "d"),
        ];
        let chunks = chunk_segments(&segments, 20.0);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].segment_ids, vec![0, 1]);
        assert_eq!(chunks[0].text, "a b");
        assert_eq!(chunks[1].start, 20.0);
        assert_eq!(chunks[1].end, 40.0);
        for chunk in &chunks {
            assert!(chunk.end - chunk.start <= 24.0);
        }
    }

    #[test]
    fn test_chunking_empty() {
        assert!(chunk_segments(&[], 30.0).is_empty());
    }

    #[test]
    fn test_words_in_window_are_rebased() {
        let mut segment = seg(0, 0.0, 20.0, "hello there world");
        segment.words = vec![
            TranscriptWord { word: "hello".into(), start: 9.0, end: 9.5, probability: 0.9 },
            TranscriptWord { word: "there".into(), start: 10.0, end: 10.4, probability: 0.9 },
            TranscriptWord { word: "world".into(), start: 14.8, end: 15.2, probability: 0.9 },
        ];
        let transcript = Transcript {
            segments: vec![segment],
            ..Default::default()
        };

        let words = transcript.words_in_window(10.0, 15.0);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].word, "there");
        assert!((words[0].start - 0.0).abs() < 1e-9);
        assert!((words[0].end - 0.4).abs() < 1e-9);
    }
}
