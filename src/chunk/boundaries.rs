//! Break point detection for chunking

use unicode_segmentation::UnicodeSegmentation;

/// Priority levels for break points
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BreakPriority {
    /// Word boundary (lowest)
    Word = 1,
    /// Sentence boundary
    Sentence = 2,
    /// Paragraph boundary (highest)
    Paragraph = 3,
}

/// A potential break point in text
#[derive(Debug, Clone)]
pub struct BreakPoint {
    /// Byte position, always on a char boundary
    pub position: usize,
    pub priority: BreakPriority,
}

impl BreakPoint {
    pub fn new(position: usize, priority: BreakPriority) -> Self {
        Self { position, priority }
    }
}

/// Collect break points sorted by position, keeping the highest priority
/// when several kinds coincide.
pub fn find_break_points(text: &str) -> Vec<BreakPoint> {
    let mut points = Vec::new();

    for (i, _) in text.match_indices("\n\n") {
        points.push(BreakPoint::new(i + 2, BreakPriority::Paragraph));
    }

    for (i, _) in text.split_sentence_bound_indices() {
        if i > 0 {
            points.push(BreakPoint::new(i, BreakPriority::Sentence));
        }
    }

    for (i, word) in text.split_word_bound_indices() {
        if i > 0 && !word.trim().is_empty() {
            points.push(BreakPoint::new(i, BreakPriority::Word));
        }
    }

    points.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| b.priority.cmp(&a.priority))
    });
    points.dedup_by_key(|p| p.position);
    points
}

/// Snap a position back to the nearest UTF-8 character boundary
pub fn ensure_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut adjusted = pos;
    while adjusted > 0 && !text.is_char_boundary(adjusted) {
        adjusted -= 1;
    }
    adjusted
}
