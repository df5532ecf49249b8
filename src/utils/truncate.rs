//! Truncation Utilities
//!
//! Shortens prompts, provider bodies and model replies for log lines while
//! respecting UTF-8 boundaries.

/// Keep the head and tail of `content` within `max_bytes`, marking the gap.
pub fn truncate_text(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    if max_bytes == 0 {
        return format!("... [{} bytes truncated] ...", content.len());
    }

    let half = max_bytes / 2;
    let prefix_end = floor_boundary(content, half);
    let mut suffix_start = ceil_boundary(content, content.len().saturating_sub(half));
    if suffix_start < prefix_end {
        suffix_start = prefix_end;
    }

    let prefix = &content[..prefix_end];
    let suffix = &content[suffix_start..];
    let dropped = content.len() - (prefix.len() + suffix.len());
    format!("{} ... [{} bytes truncated] ... {}", prefix, dropped, suffix)
}

/// Single-line head of `content`, at most `max_chars` characters.
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut head: String = flat.chars().take(max_chars).collect();
    head.push_str("...");
    head
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(preview("a  b\nc", 10), "a b c");
    }

    #[test]
    fn test_truncate_keeps_both_ends() {
        let out = truncate_text("abcdefghijklmnopqrstuvwxyz", 10);
        assert!(out.starts_with("abcde"));
        assert!(out.ends_with("vwxyz"));
        assert!(out.contains("16 bytes truncated"));
    }

    #[test]
    fn test_truncate_respects_utf8() {
        let out = truncate_text("ééééééééé", 5);
        assert!(out.contains("truncated"));
    }

    #[test]
    fn test_preview_cuts_by_chars() {
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
