#![forbid(unsafe_code)]

//! Interactive line editor.
//!
//! A state machine driven by `next_event().await`: no nested callbacks,
//! no exceptions for control flow, cancellation as a first-class
//! result. The editor subscribes to the event bus (leaving the default
//! subscription untouched for other readers), applies commands to
//! [`LineState`], and redraws through the atomic writer after every
//! change.
//!
//! # Outcomes
//!
//! | Situation                    | Result                       |
//! |------------------------------|------------------------------|
//! | Accept (Enter)               | `Ok(Some(line))`             |
//! | Event stream ended           | `Ok(None)`                   |
//! | Ctrl+C without selection     | `Err(Error::Cancelled)`      |
//! | Token cancelled              | `Err(Error::Cancelled)`      |
//!
//! Clipboard failures ring the bell; oversize edits ring the bell;
//! oversize pastes are truncated to the length cap.

mod commands;
mod history;
mod options;
mod render;
mod state;

pub use commands::{Command, KeyBindings, KeyCombo, default_bindings};
pub use history::History;
pub use options::{
    Completion, CompletionHandler, KeyHandler, MarkupRenderer, MouseHandler, ReadLineOptions,
};
pub use state::LineState;

use state::CompletionCycle;

use weft_core::cell;
use weft_core::error::{Error, Result};
use weft_core::event::{Event, Key, KeyEvent, Modifiers, MouseEvent, MouseEventKind, Signal};

use crate::scope::Scope;
use crate::terminal::Terminal;

/// What an event did to the edit session.
enum Flow {
    Continue,
    Accept,
    Cancel,
}

struct Editor<'a> {
    terminal: &'a Terminal,
    options: &'a ReadLineOptions,
    state: LineState,
    defaults: KeyBindings,
    term_cols: u16,
    prompt_cells: usize,
    _scopes: Vec<Scope>,
}

/// Run the line editor against a terminal.
pub(crate) async fn read_line(
    terminal: &Terminal,
    options: &ReadLineOptions,
) -> Result<Option<String>> {
    // Scoped state: dropped on every exit path, restoring the terminal.
    let mut scopes = Vec::new();
    if options.enable_bracketed_paste && terminal.capabilities().bracketed_paste {
        if let Ok(scope) = terminal.enable_bracketed_paste_input() {
            scopes.push(scope);
        }
    }
    if options.enable_mouse_editing && terminal.capabilities().mouse {
        if let Ok(scope) = terminal.enable_mouse_input(weft_backend::MouseMode::Drag) {
            scopes.push(scope);
        }
    }

    let term_cols = terminal.size().map(|s| s.cols).unwrap_or(0);
    let mut editor = Editor {
        terminal,
        options,
        state: LineState::new(options.max_length),
        defaults: default_bindings(),
        term_cols: if term_cols == 0 { 80 } else { term_cols },
        prompt_cells: cell::width(&options.prompt),
        _scopes: scopes,
    };

    let (_subscription, mut reader) = terminal.subscribe()?;
    editor.redraw()?;

    loop {
        let event = match &options.cancel {
            Some(token) => reader.read_cancellable(token).await,
            None => reader.read().await,
        };
        let event = match event {
            Ok(event) => event,
            Err(Error::EndOfInput) => return Ok(None),
            Err(err) => return Err(err),
        };

        match editor.handle(&event)? {
            Flow::Continue => editor.redraw()?,
            Flow::Accept => {
                let line = editor.state.buffer().to_owned();
                editor.finish_line()?;
                if options.add_to_history && !line.is_empty() {
                    lock_history(options).add(&line);
                }
                return Ok(Some(line));
            }
            Flow::Cancel => {
                editor.finish_line()?;
                return Err(Error::Cancelled);
            }
        }
    }
}

fn lock_history(options: &ReadLineOptions) -> std::sync::MutexGuard<'_, History> {
    options
        .history
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Editor<'_> {
    fn redraw(&mut self) -> Result<()> {
        render::redraw(
            &mut self.state,
            self.options,
            self.term_cols,
            self.terminal.out(),
        )
    }

    /// Final render plus the accept newline.
    fn finish_line(&mut self) -> Result<()> {
        if !self.options.echo {
            if self.options.emit_newline_on_accept {
                self.terminal.out().write("\n")?;
            }
            return Ok(());
        }
        self.redraw()?;
        if self.options.emit_newline_on_accept {
            self.terminal.out().write("\n")?;
        }
        Ok(())
    }

    fn handle(&mut self, event: &Event) -> Result<Flow> {
        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Text(text) => self.handle_text(text),
            Event::Paste(text) => {
                if self.options.enable_bracketed_paste {
                    self.state.insert(text);
                }
                Ok(Flow::Continue)
            }
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            Event::Resize(size) => {
                if size.cols > 0 {
                    self.term_cols = size.cols;
                }
                Ok(Flow::Continue)
            }
            Event::Signal(Signal::Interrupt | Signal::Break) => self.cancel_or_copy(),
        }
    }

    /// Printable input arrives as aggregate text; the matching per-char
    /// key events are skipped in [`handle_key`].
    fn handle_text(&mut self, text: &str) -> Result<Flow> {
        if self.state.is_searching() {
            self.extend_search(text);
            return Ok(Flow::Continue);
        }
        self.drop_completion();
        self.state.insert(text);
        Ok(Flow::Continue)
    }

    fn handle_key(&mut self, key: &KeyEvent) -> Result<Flow> {
        // Per-character echo of a text run: already consumed as Text.
        let plain_char = key.ch.is_some()
            && matches!(key.key, Key::Unknown | Key::Space)
            && !key
                .modifiers
                .intersects(Modifiers::CTRL | Modifiers::ALT | Modifiers::META);
        if plain_char {
            return Ok(Flow::Continue);
        }

        if let Some(handler) = &self.options.key_handler {
            if handler(&mut self.state, key) {
                return Ok(Flow::Continue);
            }
        }

        if self.state.is_searching() {
            return self.handle_search_key(key);
        }

        // Ctrl+C: copy when a selection exists, cancel otherwise.
        if key.is_char('c') && key.ctrl() {
            return self.cancel_or_copy();
        }

        // Tab drives completion when a provider is configured.
        if key.key == Key::Tab {
            if self.options.completion_handler.is_some() {
                self.cycle_completion(key.shift());
                return Ok(Flow::Continue);
            }
            if self.options.enable_editing {
                self.drop_completion();
                self.state.insert("\t");
            }
            return Ok(Flow::Continue);
        }

        let combo = KeyCombo::from_event(key);
        let command = self
            .options
            .key_bindings
            .get(&combo)
            .or_else(|| self.defaults.get(&combo))
            .copied();
        let Some(command) = command else {
            if key.key == Key::Escape {
                // Escape collapses the selection.
                self.state.cursor_to(self.state.cursor(), false);
            }
            return Ok(Flow::Continue);
        };

        if command != Command::Ignore {
            self.drop_completion();
        }
        self.apply(command, key.shift())
    }

    fn apply(&mut self, command: Command, select: bool) -> Result<Flow> {
        let editing = self.options.enable_editing;
        match command {
            Command::Accept => return Ok(Flow::Accept),
            Command::Cancel => return self.cancel_or_copy(),
            Command::CursorHome if editing => self.state.cursor_home(select),
            Command::CursorEnd if editing => self.state.cursor_end(select),
            Command::CursorLeft if editing => self.state.cursor_left(select),
            Command::CursorRight if editing => self.state.cursor_right(select),
            Command::WordLeft if editing => self.state.word_left(select),
            Command::WordRight if editing => self.state.word_right(select),
            Command::BackspaceChar if editing => {
                self.state.backspace();
            }
            Command::BackspaceWord if editing => {
                self.state.backspace_word();
            }
            Command::DeleteChar if editing => {
                self.state.delete();
            }
            Command::DeleteWord if editing => {
                self.state.delete_word();
            }
            Command::ClearLine if editing => {
                self.state.clear_line();
            }
            Command::Undo if editing => {
                self.state.undo();
            }
            Command::Redo if editing => {
                self.state.redo();
            }
            Command::CutSelection if editing => self.cut_selection(),
            Command::CopySelection => self.copy_selection(),
            Command::Paste if editing => self.paste_clipboard(),
            Command::HistoryPrev if self.options.enable_history => {
                let history = lock_history(self.options);
                self.state.history_prev(&history);
            }
            Command::HistoryNext if self.options.enable_history => {
                let history = lock_history(self.options);
                self.state.history_next(&history);
            }
            Command::ReverseSearch if self.options.enable_history => self.enter_or_step_search(),
            Command::Ignore => {}
            // Commands gated off by the options fall through silently.
            _ => {}
        }
        Ok(Flow::Continue)
    }

    // ── Ctrl+C / clipboard ───────────────────────────────────────────

    fn cancel_or_copy(&mut self) -> Result<Flow> {
        if self.state.selection().is_some() {
            self.copy_selection();
            return Ok(Flow::Continue);
        }
        Ok(Flow::Cancel)
    }

    fn copy_selection(&mut self) {
        let Some(text) = self.state.selected_text().map(str::to_owned) else {
            self.state.bell_pending = true;
            return;
        };
        if self.terminal.clipboard_set(&text).is_err() {
            self.state.bell_pending = true;
        }
    }

    fn cut_selection(&mut self) {
        let Some(text) = self.state.selected_text().map(str::to_owned) else {
            self.state.bell_pending = true;
            return;
        };
        if self.terminal.clipboard_set(&text).is_err() {
            self.state.bell_pending = true;
            return;
        }
        self.state.delete_selection();
    }

    fn paste_clipboard(&mut self) {
        match self.terminal.clipboard_get() {
            Ok(Some(text)) if !text.is_empty() => {
                self.state.insert(&text);
            }
            _ => self.state.bell_pending = true,
        }
    }

    // ── Mouse ────────────────────────────────────────────────────────

    fn handle_mouse(&mut self, mouse: &MouseEvent) -> Result<Flow> {
        if let Some(handler) = &self.options.mouse_handler {
            if handler(&mut self.state, mouse) {
                return Ok(Flow::Continue);
            }
        }
        if !self.options.enable_mouse_editing || !self.options.enable_editing {
            return Ok(Flow::Continue);
        }
        match mouse.kind {
            MouseEventKind::Down | MouseEventKind::Drag => {
                let col = usize::from(mouse.pos.col);
                let view_start_cell =
                    cell::cell_at_index(self.state.buffer(), self.state.view_start());
                let cell_in_buffer = col
                    .saturating_sub(self.prompt_cells)
                    .saturating_add(view_start_cell);
                let index = cell::index_at_cell(self.state.buffer(), cell_in_buffer);
                self.state
                    .cursor_to(index, mouse.kind == MouseEventKind::Drag);
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }

    // ── Reverse search ───────────────────────────────────────────────

    fn enter_or_step_search(&mut self) {
        if self.state.is_searching() {
            self.step_search();
            return;
        }
        self.state.search = Some(state::SearchState::default());
    }

    fn extend_search(&mut self, text: &str) {
        let Some(search) = self.state.search.as_mut() else {
            return;
        };
        search.query.push_str(text);
        search.hit = None;
        self.find_search_hit(false);
    }

    fn step_search(&mut self) {
        self.find_search_hit(true);
    }

    /// Search backward for the next containing entry; `step` continues
    /// past the current hit.
    fn find_search_hit(&mut self, step: bool) {
        let Some(search) = self.state.search.as_mut() else {
            return;
        };
        let query = search.query.clone();
        let after = if step { search.hit } else { None };
        let found = lock_history(self.options).search_backward(&query, after);
        let Some(search) = self.state.search.as_mut() else {
            return;
        };
        match found {
            Some(index) => {
                search.hit = Some(index);
                let entry = lock_history(self.options)
                    .get(index)
                    .unwrap_or_default()
                    .to_owned();
                self.state.set_buffer(&entry);
            }
            None => self.state.bell_pending = true,
        }
    }

    fn handle_search_key(&mut self, key: &KeyEvent) -> Result<Flow> {
        match key.key {
            Key::Enter => {
                self.state.search = None;
                return Ok(Flow::Accept);
            }
            Key::Up | Key::Down | Key::Left | Key::Right | Key::Home | Key::End => {
                self.state.search = None;
                return Ok(Flow::Continue);
            }
            Key::Escape => {
                self.state.search = None;
                return Ok(Flow::Continue);
            }
            Key::Backspace => {
                if let Some(search) = self.state.search.as_mut() {
                    search.query.pop();
                    search.hit = None;
                    if self.state.search_query().is_some_and(|q| !q.is_empty()) {
                        self.find_search_hit(false);
                    }
                }
                return Ok(Flow::Continue);
            }
            _ => {}
        }
        if key.is_char('r') && key.ctrl() {
            self.step_search();
            return Ok(Flow::Continue);
        }
        if key.is_char('c') && key.ctrl() {
            self.state.search = None;
            return self.cancel_or_copy();
        }
        Ok(Flow::Continue)
    }

    // ── Completion ───────────────────────────────────────────────────

    fn drop_completion(&mut self) {
        self.state.completion = None;
    }

    fn cycle_completion(&mut self, backward: bool) {
        if let Some(cycle) = self.state.completion.take() {
            let len = cycle.candidates.len();
            let index = if backward {
                (cycle.index + len - 1) % len
            } else {
                (cycle.index + 1) % len
            };
            self.apply_candidate(cycle, index);
            return;
        }

        let Some(handler) = &self.options.completion_handler else {
            return;
        };
        let completion = handler(self.state.buffer(), self.state.cursor());
        if completion.candidates.is_empty() {
            self.state.bell_pending = true;
            return;
        }
        let replace_start = completion.replace_start.min(self.state.buffer().len());
        let replace_len = completion
            .replace_length
            .min(self.state.buffer().len() - replace_start);
        let cycle = CompletionCycle {
            candidates: completion.candidates,
            index: 0,
            replace_start,
            inserted_len: replace_len,
        };
        self.apply_candidate(cycle, 0);
    }

    fn apply_candidate(&mut self, mut cycle: CompletionCycle, index: usize) {
        let candidate = cycle.candidates[index].clone();
        let start = cycle.replace_start;
        let end = start + cycle.inserted_len;
        self.state.cursor_to(end.min(self.state.buffer().len()), false);
        self.state.cursor_to(start, true);
        self.state.insert(&candidate);
        cycle.index = index;
        cycle.inserted_len = candidate.len();
        self.state.completion = Some(cycle);
    }
}
