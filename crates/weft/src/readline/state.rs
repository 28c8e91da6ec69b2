#![forbid(unsafe_code)]

//! Line-editor state.
//!
//! All mutation goes through methods that preserve the invariants:
//! cursor and selection indices are byte offsets on grapheme boundaries
//! within the buffer, and the view start never passes the cursor.
//! Handlers receive `&mut LineState`, so everything here is public API
//! for key/mouse callbacks too.

use weft_core::cell;

use super::history::History;

/// Snapshot for undo/redo.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    buffer: String,
    cursor: usize,
}

/// Reverse-incremental search state.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    /// Current query.
    pub query: String,
    /// History index of the current hit.
    pub hit: Option<usize>,
}

/// Active completion cycle.
#[derive(Debug, Clone)]
pub(crate) struct CompletionCycle {
    pub candidates: Vec<String>,
    pub index: usize,
    pub replace_start: usize,
    /// Byte length of the candidate currently in the buffer.
    pub inserted_len: usize,
}

/// The mutable line-editor state.
#[derive(Debug, Default)]
pub struct LineState {
    buffer: String,
    cursor: usize,
    /// Selection anchor; the selection is anchor..cursor (normalized).
    anchor: Option<usize>,
    /// Byte index of the first visible grapheme.
    view_start: usize,
    undo: Vec<Snapshot>,
    redo: Vec<Snapshot>,
    /// Open coalescing batch: consecutive plain inserts share one undo
    /// snapshot until a non-insert edit or cursor motion closes it.
    insert_batch: bool,
    /// History browse position and the stashed in-progress line.
    history_cursor: Option<usize>,
    stashed_line: Option<String>,
    /// Reverse-search state; `Some` while searching.
    pub(crate) search: Option<SearchState>,
    pub(crate) completion: Option<CompletionCycle>,
    /// Set when an edit was rejected; the render loop rings the bell.
    pub(crate) bell_pending: bool,
    /// Character cap shared with the options record.
    pub(crate) max_length: Option<usize>,
}

impl LineState {
    /// Fresh state with an optional length cap.
    #[must_use]
    pub fn new(max_length: Option<usize>) -> Self {
        Self {
            max_length,
            ..Self::default()
        }
    }

    // ── Introspection ────────────────────────────────────────────────

    /// The edited text.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Cursor byte offset.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Byte offset of the first visible grapheme.
    #[must_use]
    pub fn view_start(&self) -> usize {
        self.view_start
    }

    /// Selection as a normalized byte range, when non-empty.
    #[must_use]
    pub fn selection(&self) -> Option<std::ops::Range<usize>> {
        let anchor = self.anchor?;
        if anchor == self.cursor {
            return None;
        }
        Some(anchor.min(self.cursor)..anchor.max(self.cursor))
    }

    /// The selected text, when any.
    #[must_use]
    pub fn selected_text(&self) -> Option<&str> {
        self.selection().map(|range| &self.buffer[range])
    }

    /// True while reverse search is active.
    #[must_use]
    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    /// The active search query, when searching.
    #[must_use]
    pub fn search_query(&self) -> Option<&str> {
        self.search.as_ref().map(|s| s.query.as_str())
    }

    /// Take the pending bell request.
    pub(crate) fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.bell_pending)
    }

    // ── Undo plumbing ────────────────────────────────────────────────

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            buffer: self.buffer.clone(),
            cursor: self.cursor,
        }
    }

    /// Record an undo point for a non-insert edit.
    fn checkpoint(&mut self) {
        self.undo.push(self.snapshot());
        self.redo.clear();
        self.insert_batch = false;
    }

    /// Record an undo point for an insert, coalescing within a batch.
    fn checkpoint_insert(&mut self) {
        if !self.insert_batch {
            self.undo.push(self.snapshot());
            self.insert_batch = true;
        }
        self.redo.clear();
    }

    /// Close the current insert batch (cursor motion etc.).
    fn end_batch(&mut self) {
        self.insert_batch = false;
    }

    /// Revert to the previous undo point.
    pub fn undo(&mut self) -> bool {
        let Some(prev) = self.undo.pop() else {
            self.bell_pending = true;
            return false;
        };
        self.redo.push(self.snapshot());
        self.buffer = prev.buffer;
        self.cursor = prev.cursor;
        self.anchor = None;
        self.insert_batch = false;
        true
    }

    /// Re-apply the last reverted edit.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo.pop() else {
            self.bell_pending = true;
            return false;
        };
        self.undo.push(self.snapshot());
        self.buffer = next.buffer;
        self.cursor = next.cursor;
        self.anchor = None;
        self.insert_batch = false;
        true
    }

    // ── Editing ──────────────────────────────────────────────────────

    fn remaining_capacity(&self) -> usize {
        match self.max_length {
            Some(max) => max.saturating_sub(self.buffer.chars().count()),
            None => usize::MAX,
        }
    }

    /// Insert text at the cursor, replacing any selection.
    ///
    /// Returns the number of characters inserted; zero (with the bell
    /// pending) when the cap rejects the whole edit. Oversize inserts
    /// are truncated to fit.
    pub fn insert(&mut self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        if self.selection().is_some() {
            // Replacing a selection is a distinct edit.
            self.checkpoint();
            self.delete_selection_internal();
        } else {
            self.checkpoint_insert();
        }

        let capacity = self.remaining_capacity();
        if capacity == 0 {
            self.bell_pending = true;
            return 0;
        }
        let take: String = text.chars().take(capacity).collect();
        if take.chars().count() < text.chars().count() {
            self.bell_pending = true;
        }
        self.buffer.insert_str(self.cursor, &take);
        self.cursor += take.len();
        take.chars().count()
    }

    fn delete_selection_internal(&mut self) {
        if let Some(range) = self.selection() {
            self.cursor = range.start;
            self.buffer.replace_range(range, "");
        }
        self.anchor = None;
    }

    /// Delete the selection, if any. Returns true when something went.
    pub fn delete_selection(&mut self) -> bool {
        if self.selection().is_none() {
            return false;
        }
        self.checkpoint();
        self.delete_selection_internal();
        true
    }

    /// Backspace: selection, or the grapheme before the cursor.
    pub fn backspace(&mut self) -> bool {
        if self.delete_selection() {
            return true;
        }
        if self.cursor == 0 {
            return false;
        }
        self.checkpoint();
        let start = cell::prev_grapheme(&self.buffer, self.cursor);
        self.buffer.replace_range(start..self.cursor, "");
        self.cursor = start;
        true
    }

    /// Delete: selection, or the grapheme under the cursor.
    pub fn delete(&mut self) -> bool {
        if self.delete_selection() {
            return true;
        }
        if self.cursor >= self.buffer.len() {
            return false;
        }
        self.checkpoint();
        let end = cell::next_grapheme(&self.buffer, self.cursor);
        self.buffer.replace_range(self.cursor..end, "");
        true
    }

    /// Delete back to the previous word start.
    pub fn backspace_word(&mut self) -> bool {
        if self.delete_selection() {
            return true;
        }
        let start = cell::word_start(&self.buffer, self.cursor);
        if start == self.cursor {
            return false;
        }
        self.checkpoint();
        self.buffer.replace_range(start..self.cursor, "");
        self.cursor = start;
        true
    }

    /// Delete forward to the next word end.
    pub fn delete_word(&mut self) -> bool {
        if self.delete_selection() {
            return true;
        }
        let end = cell::word_end(&self.buffer, self.cursor);
        if end == self.cursor {
            return false;
        }
        self.checkpoint();
        self.buffer.replace_range(self.cursor..end, "");
        true
    }

    /// Erase the whole line.
    pub fn clear_line(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        self.checkpoint();
        self.buffer.clear();
        self.cursor = 0;
        self.anchor = None;
        true
    }

    /// Replace the entire buffer (history recall, search hits).
    pub fn set_buffer(&mut self, text: &str) {
        self.checkpoint();
        self.buffer = text.to_owned();
        self.cursor = self.buffer.len();
        self.anchor = None;
    }

    // ── Cursor motion ────────────────────────────────────────────────

    fn move_cursor(&mut self, to: usize, select: bool) {
        if select {
            if self.anchor.is_none() {
                self.anchor = Some(self.cursor);
            }
        } else {
            self.anchor = None;
        }
        self.cursor = to.min(self.buffer.len());
        self.end_batch();
    }

    /// One grapheme left.
    pub fn cursor_left(&mut self, select: bool) {
        let to = cell::prev_grapheme(&self.buffer, self.cursor);
        self.move_cursor(to, select);
    }

    /// One grapheme right.
    pub fn cursor_right(&mut self, select: bool) {
        let to = cell::next_grapheme(&self.buffer, self.cursor);
        self.move_cursor(to, select);
    }

    /// Start of line.
    pub fn cursor_home(&mut self, select: bool) {
        self.move_cursor(0, select);
    }

    /// End of line.
    pub fn cursor_end(&mut self, select: bool) {
        self.move_cursor(self.buffer.len(), select);
    }

    /// Previous word start.
    pub fn word_left(&mut self, select: bool) {
        let to = cell::word_start(&self.buffer, self.cursor);
        self.move_cursor(to, select);
    }

    /// Next word end.
    pub fn word_right(&mut self, select: bool) {
        let to = cell::word_end(&self.buffer, self.cursor);
        self.move_cursor(to, select);
    }

    /// Absolute cursor placement (mouse click).
    pub fn cursor_to(&mut self, index: usize, select: bool) {
        // Snap onto a grapheme boundary.
        let snapped = cell::next_grapheme(&self.buffer, cell::prev_grapheme(&self.buffer, index));
        let snapped = if index == 0 { 0 } else { snapped };
        self.move_cursor(snapped.min(self.buffer.len()), select);
    }

    // ── History ──────────────────────────────────────────────────────

    /// Step to an older history entry.
    pub fn history_prev(&mut self, history: &History) -> bool {
        let next_index = match self.history_cursor {
            None => 0,
            Some(i) => i + 1,
        };
        let Some(entry) = history.get(next_index) else {
            self.bell_pending = true;
            return false;
        };
        if self.history_cursor.is_none() {
            self.stashed_line = Some(self.buffer.clone());
        }
        let entry = entry.to_owned();
        self.history_cursor = Some(next_index);
        self.set_buffer(&entry);
        true
    }

    /// Step back toward the in-progress line.
    pub fn history_next(&mut self, history: &History) -> bool {
        match self.history_cursor {
            None => {
                self.bell_pending = true;
                false
            }
            Some(0) => {
                self.history_cursor = None;
                let restored = self.stashed_line.take().unwrap_or_default();
                self.set_buffer(&restored);
                true
            }
            Some(i) => {
                let Some(entry) = history.get(i - 1) else {
                    self.bell_pending = true;
                    return false;
                };
                let entry = entry.to_owned();
                self.history_cursor = Some(i - 1);
                self.set_buffer(&entry);
                true
            }
        }
    }

    // ── View ─────────────────────────────────────────────────────────

    /// Keep the caret inside a `view_cells`-wide window, adjusting
    /// [`view_start`](Self::view_start) as needed.
    pub fn update_view(&mut self, view_cells: usize) {
        if view_cells == 0 {
            self.view_start = self.cursor;
            return;
        }
        let cursor_cell = cell::cell_at_index(&self.buffer, self.cursor);
        let mut start_cell = cell::cell_at_index(&self.buffer, self.view_start);
        if cursor_cell < start_cell {
            start_cell = cursor_cell;
        }
        // The caret itself needs one cell at the right edge.
        if cursor_cell + 1 > start_cell + view_cells {
            start_cell = cursor_cell + 1 - view_cells;
        }
        self.view_start = cell::index_at_cell(&self.buffer, start_cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_moves_cursor() {
        let mut s = LineState::new(None);
        s.insert("abc");
        assert_eq!(s.buffer(), "abc");
        assert_eq!(s.cursor(), 3);
    }

    #[test]
    fn max_length_rejects_with_bell_and_truncates() {
        let mut s = LineState::new(Some(3));
        assert_eq!(s.insert("abcd"), 3);
        assert!(s.take_bell());
        assert_eq!(s.buffer(), "abc");
        assert_eq!(s.insert("e"), 0);
        assert!(s.take_bell());
    }

    #[test]
    fn backspace_and_delete_respect_graphemes() {
        let mut s = LineState::new(None);
        s.insert("ae\u{0301}z");
        s.cursor_left(false);
        s.backspace();
        assert_eq!(s.buffer(), "az");
        assert_eq!(s.cursor(), 1);
        s.cursor_home(false);
        s.delete();
        assert_eq!(s.buffer(), "z");
    }

    #[test]
    fn selection_via_shifted_motion() {
        let mut s = LineState::new(None);
        s.insert("hello");
        s.cursor_home(false);
        s.cursor_right(true);
        s.cursor_right(true);
        assert_eq!(s.selected_text(), Some("he"));
        s.insert("X");
        assert_eq!(s.buffer(), "Xllo");
        assert!(s.selection().is_none());
    }

    #[test]
    fn selection_collapses_on_plain_motion() {
        let mut s = LineState::new(None);
        s.insert("hello");
        s.cursor_home(false);
        s.cursor_right(true);
        assert!(s.selection().is_some());
        s.cursor_right(false);
        assert!(s.selection().is_none());
    }

    #[test]
    fn word_motion_and_deletion() {
        let mut s = LineState::new(None);
        s.insert("foo bar baz");
        s.word_left(false);
        assert_eq!(s.cursor(), 8);
        s.backspace_word();
        assert_eq!(s.buffer(), "foo baz");
    }

    #[test]
    fn undo_coalesces_insert_batches() {
        let mut s = LineState::new(None);
        s.insert("a");
        s.insert("b");
        s.insert("c");
        s.cursor_left(false); // closes the batch
        s.insert("X");
        assert_eq!(s.buffer(), "abXc");
        assert!(s.undo());
        assert_eq!(s.buffer(), "abc");
        assert!(s.undo());
        assert_eq!(s.buffer(), "");
        assert!(!s.undo());
    }

    #[test]
    fn redo_round_trip() {
        let mut s = LineState::new(None);
        s.insert("abc");
        s.cursor_left(false);
        s.backspace();
        assert_eq!(s.buffer(), "ac");
        assert!(s.undo());
        assert_eq!(s.buffer(), "abc");
        assert!(s.redo());
        assert_eq!(s.buffer(), "ac");
        s.insert("!");
        assert!(!s.redo(), "new edits clear the redo stack");
    }

    #[test]
    fn history_navigation_stashes_current_line() {
        let mut history = History::new();
        history.add("first");
        history.add("second");
        let mut s = LineState::new(None);
        s.insert("draft");
        assert!(s.history_prev(&history));
        assert_eq!(s.buffer(), "second");
        assert!(s.history_prev(&history));
        assert_eq!(s.buffer(), "first");
        assert!(!s.history_prev(&history));
        assert!(s.history_next(&history));
        assert_eq!(s.buffer(), "second");
        assert!(s.history_next(&history));
        assert_eq!(s.buffer(), "draft");
        assert!(!s.history_next(&history));
    }

    #[test]
    fn view_follows_cursor() {
        let mut s = LineState::new(None);
        s.insert("0123456789");
        s.update_view(5);
        // Cursor at end: window shows the tail.
        assert_eq!(s.view_start(), 6);
        s.cursor_home(false);
        s.update_view(5);
        assert_eq!(s.view_start(), 0);
    }

    #[test]
    fn cursor_invariants_hold_under_mutation() {
        let mut s = LineState::new(None);
        s.insert("漢字テスト");
        for _ in 0..10 {
            s.cursor_left(true);
        }
        assert_eq!(s.cursor(), 0);
        assert!(s.selection().is_some());
        s.delete_selection();
        assert!(s.buffer().is_empty());
        assert_eq!(s.cursor(), 0);
    }
}
