#![forbid(unsafe_code)]

//! Line rendering.
//!
//! Every redraw is one atomic block: return to column 0, erase the
//! line, write the prompt and the visible slice, then park the caret on
//! its cell. The visible slice is capped by cell width, with an
//! ellipsis on whichever side is truncated; the view window follows the
//! cursor so the caret is always on screen.

use std::fmt::Write as _;

use unicode_segmentation::UnicodeSegmentation;
use weft_core::cell;
use weft_core::error::Result;

use super::options::ReadLineOptions;
use super::state::LineState;
use crate::writer::SyncWriter;

const ELLIPSIS: char = '…';

/// What one redraw of the line looks like before styling.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    /// Prompt text (search mode substitutes its own).
    pub prompt: String,
    /// The visible slice, ellipses included.
    pub visible: String,
    /// Selection range within `visible`, when any of it is on screen.
    pub selection: Option<std::ops::Range<usize>>,
    /// Caret cell, counted from the line start (prompt included).
    pub caret_cell: usize,
}

/// Compute the visible slice and caret cell for the current state.
pub(crate) fn layout(state: &mut LineState, options: &ReadLineOptions, term_cols: u16) -> Layout {
    let prompt = if let Some(query) = state.search_query() {
        format!("(reverse-i-search)'{query}': ")
    } else {
        options.prompt.clone()
    };
    let prompt_cells = cell::width(&prompt);

    let total_cells = usize::from(term_cols.max(2));
    let view_cells = match options.view_width {
        Some(cells) => usize::from(cells),
        None => total_cells.saturating_sub(prompt_cells).saturating_sub(1),
    }
    .max(1);

    state.update_view(view_cells);

    let buffer = state.buffer();
    let view_start = state.view_start();
    let left_truncated = view_start > 0;

    // Collect graphemes that fit the window, reserving a cell per
    // ellipsis edge.
    let budget = view_cells;
    let mut used = if left_truncated { 1 } else { 0 };
    let mut end = view_start;
    let mut right_truncated = false;
    for (offset, grapheme) in buffer[view_start..].grapheme_indices(true) {
        let width = cell::grapheme_width(grapheme, cell::DEFAULT_TAB_WIDTH);
        let remaining_after = buffer.len() - (view_start + offset + grapheme.len());
        // The last cell doubles as the right ellipsis when more follows.
        let reserve = usize::from(remaining_after > 0);
        if used + width + reserve > budget && remaining_after > 0 {
            right_truncated = true;
            break;
        }
        if used + width > budget {
            right_truncated = true;
            break;
        }
        used += width;
        end = view_start + offset + grapheme.len();
    }

    let mut visible = String::new();
    if left_truncated {
        visible.push(ELLIPSIS);
    }
    let slice_start_in_visible = visible.len();
    visible.push_str(&buffer[view_start..end]);
    if right_truncated {
        visible.push(ELLIPSIS);
    }

    let selection = state.selection().and_then(|range| {
        let start = range.start.clamp(view_start, end);
        let stop = range.end.clamp(view_start, end);
        if start >= stop {
            return None;
        }
        Some(
            slice_start_in_visible + (start - view_start)
                ..slice_start_in_visible + (stop - view_start),
        )
    });

    let cursor_cell = cell::cell_at_index(buffer, state.cursor());
    let start_cell = cell::cell_at_index(buffer, view_start);
    let caret_cell =
        prompt_cells + usize::from(left_truncated) + cursor_cell.saturating_sub(start_cell);

    Layout {
        prompt,
        visible,
        selection,
        caret_cell,
    }
}

/// Redraw the line as a single atomic block.
pub(crate) fn redraw(
    state: &mut LineState,
    options: &ReadLineOptions,
    term_cols: u16,
    out: &SyncWriter,
) -> Result<()> {
    if !options.echo {
        if state.take_bell() {
            out.write("\x07")?;
        }
        return Ok(());
    }

    let bell = state.take_bell();
    let layout = layout(state, options, term_cols);
    let rendered = match (&options.markup_renderer, &layout.selection) {
        (Some(renderer), selection) => renderer(&layout.visible, selection.clone()),
        (None, _) => layout.visible.clone(),
    };

    out.write_atomic(|w| {
        w.carriage_return()?;
        w.erase_line()?;
        w.text(&layout.prompt)?;
        w.text(&rendered)?;
        w.carriage_return()?;
        w.cursor_forward(layout.caret_cell.min(usize::from(u16::MAX)) as u16)?;
        if bell {
            w.bell()?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(prompt: &str) -> ReadLineOptions {
        ReadLineOptions::with_prompt(prompt)
    }

    #[test]
    fn short_line_renders_whole_buffer() {
        let mut state = LineState::new(None);
        state.insert("abc");
        let l = layout(&mut state, &opts("> "), 80);
        assert_eq!(l.prompt, "> ");
        assert_eq!(l.visible, "abc");
        assert_eq!(l.caret_cell, 5);
        assert_eq!(l.selection, None);
    }

    #[test]
    fn long_line_shows_left_ellipsis_at_end() {
        let mut state = LineState::new(None);
        state.insert("0123456789");
        let options = opts("> ").view_width(5);
        let l = layout(&mut state, &options, 80);
        assert!(l.visible.starts_with(ELLIPSIS));
        assert!(l.visible.ends_with('9'));
        // Caret one past the last visible char.
        assert_eq!(l.caret_cell, 2 + 5);
    }

    #[test]
    fn long_line_shows_right_ellipsis_at_start() {
        let mut state = LineState::new(None);
        state.insert("0123456789");
        state.cursor_home(false);
        let options = opts("").view_width(5);
        let l = layout(&mut state, &options, 80);
        assert_eq!(l.visible, format!("0123{ELLIPSIS}"));
        assert_eq!(l.caret_cell, 0);
    }

    #[test]
    fn selection_range_is_clipped_to_view() {
        let mut state = LineState::new(None);
        state.insert("hello");
        state.cursor_home(false);
        state.cursor_right(true);
        state.cursor_right(true);
        let l = layout(&mut state, &opts(""), 80);
        assert_eq!(l.selection, Some(0..2));
    }

    #[test]
    fn search_mode_substitutes_prompt() {
        let mut state = LineState::new(None);
        state.search = Some(super::super::state::SearchState {
            query: "abc".into(),
            hit: None,
        });
        let l = layout(&mut state, &opts("> "), 80);
        assert_eq!(l.prompt, "(reverse-i-search)'abc': ");
    }

    #[test]
    fn auto_view_width_tracks_terminal() {
        let mut state = LineState::new(None);
        state.insert("0123456789");
        // 8 columns minus 2 prompt cells minus 1 caret cell = 5 content.
        let l = layout(&mut state, &opts("> "), 8);
        assert!(l.visible.starts_with(ELLIPSIS));
        assert_eq!(cell::width(&l.visible), 5);
    }
}
