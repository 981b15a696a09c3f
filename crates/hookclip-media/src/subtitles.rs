//! Caption tracks from word-level timestamps.
//!
//! Two ASS flavours are produced, a plain line-based one and a karaoke one
//! using `\kf` fill tags, plus SRT. Generation is pure: identical words and
//! style always render byte-identical output.

use std::path::Path;

use hookclip_models::{SubtitleStyle, TranscriptWord};
use tracing::info;

use crate::error::MediaResult;

const STANDARD_WORDS_PER_LINE: usize = 6;
const HIGHLIGHT_WORDS_PER_LINE: usize = 5;
const SRT_WORDS_PER_LINE: usize = 8;

const STANDARD_SECONDARY: &str = "&H000000FF";
const HIGHLIGHT_SECONDARY: &str = "&H0000FFFF";

/// Visual settings of the ASS `Default` style.
#[derive(Debug, Clone, PartialEq)]
pub struct AssStyle {
    pub font_name: String,
    pub font_size: u32,
    pub primary_color: String,
    /// Karaoke fill colour; picked per subtitle style when `None`
    pub secondary_color: Option<String>,
    pub outline_color: String,
    pub outline_width: u32,
    pub margin_v: u32,
}

impl Default for AssStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 18,
            primary_color: "&H00FFFFFF".to_string(),
            secondary_color: None,
            outline_color: "&H00000000".to_string(),
            outline_width: 3,
            margin_v: 60,
        }
    }
}

/// Words displayed together.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLine<'a> {
    pub words: &'a [TranscriptWord],
    pub start: f64,
    pub end: f64,
}

/// Group words into lines of at most `per_line` words.
///
/// A line never starts before the previous line ends, and never ends before it starts.
pub fn group_words(words: &[TranscriptWord], per_line: usize) -> Vec<CaptionLine<'_>> {
    let mut lines = Vec::with_capacity(words.len() / per_line.max(1) + 1);
    let mut prev_end = 0.0_f64;

    for chunk in words.chunks(per_line.max(1)) {
        let first = &chunk[0];
        let last = &chunk[chunk.len() - 1];
        let start = first.start.max(prev_end).max(0.0);
        let end = last.end.max(start);
        prev_end = end;
        lines.push(CaptionLine {
            words: chunk,
            start,
            end,
        });
    }
    lines
}

/// Render an ASS track for `words` in the given style.
pub fn generate_ass(words: &[TranscriptWord], style: SubtitleStyle, ass: &AssStyle) -> String {
    let (per_line, default_secondary) = match style {
        SubtitleStyle::Standard => (STANDARD_WORDS_PER_LINE, STANDARD_SECONDARY),
        SubtitleStyle::Highlight => (HIGHLIGHT_WORDS_PER_LINE, HIGHLIGHT_SECONDARY),
    };
    let secondary = ass.secondary_color.as_deref().unwrap_or(default_secondary);

    let mut out = String::new();
    out.push_str("[Script Info]\n");
    out.push_str("ScriptType: v4.00+\n");
    out.push_str("PlayResX: 1080\n");
    out.push_str("PlayResY: 1920\n");
    out.push_str("WrapStyle: 0\n");
    out.push('\n');
    out.push_str("[V4+ Styles]\n");
    out.push_str("Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n");
    out.push_str(&format!(
        "Style: Default,{},{},{},{},{},&H00000000,-1,0,0,0,100,100,0,0,1,{},0,2,10,10,{},1\n",
        ass.font_name,
        ass.font_size,
        ass.primary_color,
        secondary,
        ass.outline_color,
        ass.outline_width,
        ass.margin_v
    ));
    out.push('\n');
    out.push_str("[Events]\n");
    out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");

    for line in group_words(words, per_line) {
        let text = match style {
            SubtitleStyle::Standard => plain_text(line.words),
            SubtitleStyle::Highlight => karaoke_text(line.words),
        };
        out.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}\n",
            format_ass_time(line.start),
            format_ass_time(line.end),
            text
        ));
    }
    out
}

/// Render an SRT track for `words`.
pub fn generate_srt(words: &[TranscriptWord]) -> String {
    let mut out = String::new();
    for (i, line) in group_words(words, SRT_WORDS_PER_LINE).iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_time(line.start),
            format_srt_time(line.end),
            plain_text(line.words)
        ));
    }
    out
}

/// Write a rendered track to disk.
pub async fn write_track(path: &Path, contents: &str) -> MediaResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    info!("Generated subtitle track: {}", path.display());
    Ok(())
}

fn plain_text(words: &[TranscriptWord]) -> String {
    words
        .iter()
        .map(|w| sanitize(&w.word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn karaoke_text(words: &[TranscriptWord]) -> String {
    let mut text = String::new();
    for (i, w) in words.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        let cs = ((w.end - w.start).max(0.0) * 100.0).round() as u64;
        text.push_str(&format!("{{\\kf{}}}{}", cs, sanitize(&w.word)));
    }
    text
}

/// Strip characters ASS treats as override or line-break markup.
fn sanitize(word: &str) -> String {
    word.chars()
        .filter(|c| !matches!(c, '{' | '}' | '\\'))
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `H:MM:SS.CC`
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let cs = total_cs % 100;
    let total_secs = total_cs / 100;
    format!(
        "{}:{:02}:{:02}.{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        cs
    )
}

/// `HH:MM:SS,mmm`
pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64) -> TranscriptWord {
        TranscriptWord {
            word: text.to_string(),
            start,
            end,
            probability: 1.0,
        }
    }

    fn sentence(n: usize) -> Vec<TranscriptWord> {
        (0..n)
            .map(|i| word(&format!("w{}", i), i as f64 * 0.5, i as f64 * 0.5 + 0.4))
            .collect()
    }

    fn dialogue_starts(ass: &str) -> Vec<String> {
        ass.lines()
            .filter_map(|l| l.strip_prefix("Dialogue: 0,"))
            .map(|l| l.split(',').next().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_format_ass_time() {
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(61.5), "0:01:01.50");
        assert_eq!(format_ass_time(3725.25), "1:02:05.25");
        // 59.996 must carry into the next second, not print ".100"
        assert_eq!(format_ass_time(59.996), "0:01:00.00");
    }

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(3661.042), "01:01:01,042");
        assert_eq!(format_srt_time(9.9996), "00:00:10,000");
    }

    #[test]
    fn test_standard_ass() {
        let ass = generate_ass(&sentence(8), SubtitleStyle::Standard, &AssStyle::default());
        assert!(ass.starts_with("[Script Info]\nScriptType: v4.00+\nPlayResX: 1080\nPlayResY: 1920\n"));
        assert!(ass.contains(
            "Style: Default,Arial,18,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,-1,0,0,0,100,100,0,0,1,3,0,2,10,10,60,1\n"
        ));
        assert!(ass.contains("Dialogue: 0,0:00:00.00,0:00:02.90,Default,,0,0,0,,w0 w1 w2 w3 w4 w5\n"));
        assert!(ass.contains("Dialogue: 0,0:00:03.00,0:00:03.90,Default,,0,0,0,,w6 w7\n"));
    }

    #[test]
    fn test_highlight_ass() {
        let ass = generate_ass(&sentence(6), SubtitleStyle::Highlight, &AssStyle::default());
        assert!(ass.contains(",&H0000FFFF,"));
        assert!(ass.contains(
            ",,{\\kf40}w0 {\\kf40}w1 {\\kf40}w2 {\\kf40}w3 {\\kf40}w4\n"
        ));
        assert_eq!(dialogue_starts(&ass).len(), 2);
    }

    #[test]
    fn test_srt() {
        let srt = generate_srt(&sentence(9));
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:03,900\nw0 w1 w2 w3 w4 w5 w6 w7\n\n2\n"));
        assert!(srt.ends_with("w8\n\n"));
    }

    #[test]
    fn test_empty_input() {
        let ass = generate_ass(&[], SubtitleStyle::Highlight, &AssStyle::default());
        assert!(ass.ends_with("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n"));
        assert!(!ass.contains("Dialogue"));
        assert_eq!(generate_srt(&[]), "");
    }

    #[test]
    fn test_generation_is_idempotent() {
        let words = sentence(23);
        for style in [SubtitleStyle::Standard, SubtitleStyle::Highlight] {
            let a = generate_ass(&words, style, &AssStyle::default());
            let b = generate_ass(&words, style, &AssStyle::default());
            assert_eq!(a, b);
        }
        assert_eq!(generate_srt(&words), generate_srt(&words));
    }

    #[test]
    fn test_overlapping_words_do_not_rewind() {
        // Transcribers occasionally emit overlapping word timings
        let mut words = sentence(12);
        words[6].start = 1.0;
        let lines = group_words(&words, 6);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].start >= lines[0].end);
        for pair in lines.windows(2) {
            assert!(pair[1].start >= pair[0].start);
        }
    }

    #[test]
    fn test_markup_is_stripped() {
        let words = vec![word("{\\b1}bold", 0.0, 0.5), word("two\nlines", 0.5, 1.0)];
        let ass = generate_ass(&words, SubtitleStyle::Standard, &AssStyle::default());
        assert!(ass.contains(",,b1bold two lines\n"));
    }

    #[tokio::test]
    async fn test_write_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clip_1.ass");
        write_track(&path, "hello").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "hello");
    }
}
