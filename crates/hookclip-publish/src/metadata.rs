//! Upload metadata for published clips.

use serde::{Deserialize, Serialize};

const MAX_TITLE_CHARS: usize = 100;
const SHORTS_TAGS: [&str; 5] = ["shorts", "viral", "trending", "youtube shorts", "short video"];
/// People & Blogs
const CATEGORY_ID: &str = "22";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

impl ClipMetadata {
    /// Metadata for clip `index` (1-based) of `total` cut from a video titled `title`.
    pub fn for_clip(title: &str, index: usize, total: usize) -> Self {
        let full = if total > 1 {
            format!("{} - Part {}/{}", title, index, total)
        } else {
            title.to_string()
        };

        Self {
            title: truncate_title(&full),
            description: format!(
                "Clip {} of {}\n\n#Shorts #Viral #Trending #YouTubeShorts",
                index, total
            ),
            tags: SHORTS_TAGS.iter().map(|t| t.to_string()).collect(),
            category_id: CATEGORY_ID.to_string(),
            privacy_status: "public".to_string(),
        }
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let head: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_part_title() {
        let meta = ClipMetadata::for_clip("My Video", 2, 3);
        assert_eq!(meta.title, "My Video - Part 2/3");
        assert_eq!(
            meta.description,
            "Clip 2 of 3\n\n#Shorts #Viral #Trending #YouTubeShorts"
        );
        assert_eq!(meta.tags.len(), 5);
        assert_eq!(meta.category_id, "22");
        assert_eq!(meta.privacy_status, "public");
    }

    #[test]
    fn test_single_clip_keeps_title() {
        assert_eq!(ClipMetadata::for_clip("Solo", 1, 1).title, "Solo");
    }

    #[test]
    fn test_long_title_truncated() {
        let meta = ClipMetadata::for_clip(&"é".repeat(120), 1, 1);
        assert_eq!(meta.title.chars().count(), 100);
        assert!(meta.title.ends_with("..."));
    }
}
