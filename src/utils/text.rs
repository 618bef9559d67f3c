// src/utils/text.rs

//! Small text helpers shared by extraction and event messages.

use unicode_segmentation::UnicodeSegmentation;

/// Keep at most `max` grapheme clusters of `text`.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    text.graphemes(true).take(max).collect()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_emoji_whole() {
        assert_eq!(truncate_graphemes("📍 London", 1), "📍");
        assert_eq!(truncate_graphemes("short", 50), "short");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  United \n States "), "United States");
    }
}
