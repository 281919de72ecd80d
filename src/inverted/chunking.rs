//! Parent/child text splitting for the inverted index (C3).
//!
//! Child chunks target `child_chunk_size` characters with `overlap`
//! characters shared between adjacent chunks. The boundary is chosen by
//! preference: paragraph break, then a sentence terminator within the last
//! 50 characters of the target size, then a word boundary, then a hard cut.

const SENTENCE_TERMINATORS: [char; 4] = ['.', '!', '?', '\u{3002}'];
const BOUNDARY_SEARCH_WINDOW: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

/// Splits `text` (treated as a byte-indexed char boundary-safe string) into
/// overlapping spans. Returns byte offsets into `text`.
pub fn split_into_child_spans(text: &str, child_chunk_size: usize, overlap: usize) -> Vec<TextSpan> {
    if text.is_empty() {
        return Vec::new();
    }
    let len = text.len();
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < len {
        let target_end = (start + child_chunk_size).min(len);
        let end = if target_end >= len {
            len
        } else {
            find_boundary(text, start, target_end)
        };
        spans.push(TextSpan { start, end });
        if end >= len {
            break;
        }
        let next_start = end.saturating_sub(overlap);
        start = if next_start > start { next_start } else { end };
    }

    spans
}

fn find_boundary(text: &str, start: usize, target_end: usize) -> usize {
    let window = &text[start..target_end];

    if let Some(pos) = window.rfind("\n\n") {
        let candidate = start + pos + 2;
        if candidate > start {
            return char_boundary(text, candidate);
        }
    }

    let search_from = target_end.saturating_sub(BOUNDARY_SEARCH_WINDOW).max(start);
    let tail = &text[search_from..target_end];
    if let Some(rel) = tail.rfind(SENTENCE_TERMINATORS.as_slice()) {
        let term_char_len = tail[rel..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        let candidate = search_from + rel + term_char_len;
        if candidate > start {
            return char_boundary(text, candidate);
        }
    }

    if let Some(rel) = window.rfind(char::is_whitespace) {
        let candidate = start + rel;
        if candidate > start {
            return char_boundary(text, candidate);
        }
    }

    char_boundary(text, target_end)
}

fn char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_span() {
        let spans = split_into_child_spans("hello world", 1024, 128);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0], TextSpan { start: 0, end: 11 });
    }

    #[test]
    fn long_text_splits_with_overlap() {
        let text = "word ".repeat(400);
        let spans = split_into_child_spans(&text, 1024, 128);
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            assert!(pair[1].start < pair[0].end, "adjacent spans should overlap");
        }
    }

    #[test]
    fn prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(100), "b".repeat(2000));
        let spans = split_into_child_spans(&text, 150, 20);
        assert_eq!(spans[0].end, 102);
    }

    #[test]
    fn empty_text_has_no_spans() {
        assert!(split_into_child_spans("", 1024, 128).is_empty());
    }

    #[test]
    fn spans_cover_every_byte_of_the_source() {
        let text = "x".repeat(3000);
        let spans = split_into_child_spans(&text, 1024, 128);
        assert_eq!(spans.last().unwrap().end, text.len());
        assert_eq!(spans.first().unwrap().start, 0);
    }
}
