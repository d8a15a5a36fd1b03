//! Small text helpers shared across the pipeline.

use std::sync::LazyLock;

use regex::Regex;

/// Wrap width for HTML-to-text conversion.
const TEXT_WIDTH: usize = 80;

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert an HTML document to readable plain text.
pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH).unwrap_or_default()
}

/// Collapse runs of 3+ newlines to exactly one blank line.
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_RUNS.replace_all(text, "\n\n").into_owned()
}

/// Find the largest byte index <= `i` that is a valid char boundary.
pub fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut pos = i;
    while pos > 0 && !s.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Truncate to at most `max` bytes without splitting a char mid-sequence.
pub fn truncate_bytes(s: &str, max: usize) -> &str {
    &s[..floor_char_boundary(s, max)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_blank_lines_squeezes_runs() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\nb"), "a\nb");
    }

    #[test]
    fn floor_char_boundary_respects_multibyte() {
        let s = "café";
        // 'c'=0, 'a'=1, 'f'=2, 'é'=3..5
        assert_eq!(floor_char_boundary(s, 5), 5);
        assert_eq!(floor_char_boundary(s, 4), 3);
        assert_eq!(floor_char_boundary(s, 3), 3);
        assert_eq!(floor_char_boundary(s, 100), 5);
    }

    #[test]
    fn truncate_bytes_never_splits_chars() {
        let s = "héllo wörld";
        let cut = truncate_bytes(s, 2);
        assert!(cut.len() <= 2);
        assert!(s.starts_with(cut));

        assert_eq!(truncate_bytes("short", 100), "short");
    }

    #[test]
    fn html_to_text_strips_tags() {
        let text = html_to_text("<p>Hello <b>world</b></p>");
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains("<p>"));
    }
}
