#![forbid(unsafe_code)]

//! Grapheme and display-cell arithmetic.
//!
//! The line editor and renderers never count `char`s: they count display
//! cells (what the terminal actually advances by) and move over grapheme
//! clusters (what the user perceives as one character). This module is the
//! single source of truth for both.
//!
//! # Rules
//!
//! - CR and LF occupy 0 cells.
//! - TAB occupies the configured tab width (default 4).
//! - Everything else follows the East-Asian-Width tables: 0 for zero-width
//!   marks, 1 for narrow, 2 for wide.
//! - U+FFFD (the replacement for invalid input) is narrow, 1 cell.
//!
//! Indices taken and returned by these functions are byte offsets into the
//! text, always on grapheme-cluster boundaries.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Default tab width used when none is specified.
pub const DEFAULT_TAB_WIDTH: usize = 4;

/// Display width of a single grapheme cluster.
#[must_use]
pub fn grapheme_width(grapheme: &str, tab_width: usize) -> usize {
    match grapheme {
        "\r" | "\n" | "\r\n" => 0,
        "\t" => tab_width,
        g => g.width(),
    }
}

/// Total display width of `text` using the default tab width.
#[must_use]
pub fn width(text: &str) -> usize {
    width_with_tab(text, DEFAULT_TAB_WIDTH)
}

/// Total display width of `text` with an explicit tab width.
#[must_use]
pub fn width_with_tab(text: &str, tab_width: usize) -> usize {
    text.graphemes(true)
        .map(|g| grapheme_width(g, tab_width))
        .sum()
}

/// Byte index of the grapheme boundary preceding `idx`.
///
/// Returns 0 when `idx` is at (or before) the start of the text. An `idx`
/// past the end of the text is treated as the end.
#[must_use]
pub fn prev_grapheme(text: &str, idx: usize) -> usize {
    let idx = idx.min(text.len());
    text.grapheme_indices(true)
        .take_while(|(start, _)| *start < idx)
        .last()
        .map_or(0, |(start, _)| start)
}

/// Byte index of the grapheme boundary following `idx`.
///
/// Returns `text.len()` when `idx` is within (or after) the last grapheme.
#[must_use]
pub fn next_grapheme(text: &str, idx: usize) -> usize {
    let idx = idx.min(text.len());
    text.grapheme_indices(true)
        .find(|(start, g)| start + g.len() > idx)
        .map_or(text.len(), |(start, g)| start + g.len())
}

/// Byte index of the grapheme occupying display cell `cell`.
///
/// Walks the text accumulating cell widths and returns the start of the
/// grapheme that covers the requested cell (a wide grapheme covers two
/// cells, both mapping to its start). A `cell` at or past the total width
/// maps to `text.len()`.
#[must_use]
pub fn index_at_cell(text: &str, cell: usize) -> usize {
    index_at_cell_with_tab(text, cell, DEFAULT_TAB_WIDTH)
}

/// [`index_at_cell`] with an explicit tab width.
#[must_use]
pub fn index_at_cell_with_tab(text: &str, cell: usize, tab_width: usize) -> usize {
    let mut acc = 0usize;
    for (start, g) in text.grapheme_indices(true) {
        let w = grapheme_width(g, tab_width);
        if cell < acc + w {
            return start;
        }
        acc += w;
    }
    text.len()
}

/// Display-cell offset of the grapheme boundary at byte index `idx`.
#[must_use]
pub fn cell_at_index(text: &str, idx: usize) -> usize {
    cell_at_index_with_tab(text, idx, DEFAULT_TAB_WIDTH)
}

/// [`cell_at_index`] with an explicit tab width.
#[must_use]
pub fn cell_at_index_with_tab(text: &str, idx: usize, tab_width: usize) -> usize {
    let idx = idx.min(text.len());
    text.grapheme_indices(true)
        .take_while(|(start, _)| *start < idx)
        .map(|(_, g)| grapheme_width(g, tab_width))
        .sum()
}

/// A word character is alphanumeric or `_`.
#[must_use]
pub fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Whether `idx` sits at the start of a word: a word char preceded by a
/// non-word char or start-of-text.
#[must_use]
pub fn is_word_start(text: &str, idx: usize) -> bool {
    let at = text[idx.min(text.len())..].chars().next();
    let before = text[..idx.min(text.len())].chars().next_back();
    matches!(at, Some(c) if is_word_char(c)) && !matches!(before, Some(c) if is_word_char(c))
}

/// Whether `idx` sits just past the end of a word run.
#[must_use]
pub fn is_word_end(text: &str, idx: usize) -> bool {
    let at = text[idx.min(text.len())..].chars().next();
    let before = text[..idx.min(text.len())].chars().next_back();
    matches!(before, Some(c) if is_word_char(c)) && !matches!(at, Some(c) if is_word_char(c))
}

/// Byte index of the start of the word at or before `idx`.
///
/// Skips any non-word characters to the left first, then runs to the start
/// of the word run. Returns 0 when no word precedes `idx`.
#[must_use]
pub fn word_start(text: &str, idx: usize) -> usize {
    let mut i = idx.min(text.len());
    while i > 0 {
        let prev = prev_grapheme(text, i);
        let ch = text[prev..].chars().next();
        if matches!(ch, Some(c) if is_word_char(c)) {
            break;
        }
        i = prev;
    }
    while i > 0 {
        let prev = prev_grapheme(text, i);
        let ch = text[prev..].chars().next();
        if !matches!(ch, Some(c) if is_word_char(c)) {
            break;
        }
        i = prev;
    }
    i
}

/// Byte index just past the end of the word at or after `idx`.
///
/// Skips any non-word characters to the right first, then runs past the
/// end of the word run. Returns `text.len()` when no word follows `idx`.
#[must_use]
pub fn word_end(text: &str, idx: usize) -> usize {
    let mut i = idx.min(text.len());
    while i < text.len() {
        let ch = text[i..].chars().next();
        if matches!(ch, Some(c) if is_word_char(c)) {
            break;
        }
        i = next_grapheme(text, i);
    }
    while i < text.len() {
        let ch = text[i..].chars().next();
        if !matches!(ch, Some(c) if is_word_char(c)) {
            break;
        }
        i = next_grapheme(text, i);
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_one_cell_each() {
        assert_eq!(width("hello"), 5);
    }

    #[test]
    fn cr_lf_are_zero_cells() {
        assert_eq!(width("a\r\nb"), 2);
    }

    #[test]
    fn tab_uses_tab_width() {
        assert_eq!(width("\t"), DEFAULT_TAB_WIDTH);
        assert_eq!(width_with_tab("a\tb", 8), 10);
    }

    #[test]
    fn wide_cjk_is_two_cells() {
        assert_eq!(width("漢字"), 4);
    }

    #[test]
    fn replacement_char_is_one_cell() {
        assert_eq!(width("\u{FFFD}"), 1);
    }

    #[test]
    fn combining_mark_is_zero_cells() {
        // "e" followed by a combining acute accent forms one 1-cell grapheme.
        assert_eq!(width("e\u{0301}"), 1);
    }

    #[test]
    fn grapheme_navigation_over_cluster() {
        let s = "ae\u{0301}z";
        assert_eq!(next_grapheme(s, 0), 1);
        assert_eq!(next_grapheme(s, 1), 4); // the full cluster
        assert_eq!(prev_grapheme(s, 4), 1);
        assert_eq!(prev_grapheme(s, 1), 0);
        assert_eq!(prev_grapheme(s, 0), 0);
        assert_eq!(next_grapheme(s, s.len()), s.len());
    }

    #[test]
    fn index_cell_round_trip_narrow() {
        let s = "abcd";
        for (i, _) in s.char_indices() {
            assert_eq!(index_at_cell(s, cell_at_index(s, i)), i);
        }
    }

    #[test]
    fn wide_grapheme_covers_both_cells() {
        let s = "a漢b";
        assert_eq!(index_at_cell(s, 1), 1);
        assert_eq!(index_at_cell(s, 2), 1); // second cell of the wide char
        assert_eq!(index_at_cell(s, 3), 4);
        assert_eq!(index_at_cell(s, 99), s.len());
    }

    use proptest::prelude::*;

    proptest! {
        /// Width is additive over grapheme boundaries, so any prefix cut
        /// on a boundary can only narrow it.
        #[test]
        fn width_is_monotone_over_prefixes(s in "\\PC{0,24}") {
            let mut idx = 0;
            while idx < s.len() {
                let next = next_grapheme(&s, idx);
                prop_assert!(width(&s[..idx]) <= width(&s[..next]));
                idx = next;
            }
            prop_assert!(width(&s[..s.len()]) == width(&s));
        }

        /// Every boundary maps to a cell that maps back to the same
        /// boundary (zero-width graphemes collapse onto their base).
        #[test]
        fn index_cell_mapping_is_consistent(s in "[a-z漢\\t]{0,16}") {
            let mut idx = 0;
            loop {
                let cell = cell_at_index(&s, idx);
                prop_assert_eq!(index_at_cell(&s, cell), idx);
                if idx >= s.len() {
                    break;
                }
                idx = next_grapheme(&s, idx);
            }
        }
    }

    #[test]
    fn word_boundaries() {
        let s = "foo_bar  baz";
        assert!(is_word_start(s, 0));
        assert!(!is_word_start(s, 1));
        assert!(is_word_end(s, 7));
        assert_eq!(word_start(s, 7), 0);
        assert_eq!(word_start(s, 9), 0); // skips the gap back into foo_bar
        assert_eq!(word_end(s, 7), 12); // skips the gap into baz
        assert_eq!(word_end(s, 12), 12);
        assert_eq!(word_start(s, 12), 9);
    }
}
