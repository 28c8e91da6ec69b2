#![forbid(unsafe_code)]

//! Line-editor options.
//!
//! The record is the unit of reuse: history is scoped to the options
//! value, and handlers are shared `Arc` closures so one configured
//! record can drive many `read_line` calls.

use std::ops::Range;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use weft_core::event::{KeyEvent, MouseEvent};

use super::commands::KeyBindings;
use super::history::History;
use super::state::LineState;

/// Completion candidates for the text around the cursor.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// Candidate replacements, cycled by Tab.
    pub candidates: Vec<String>,
    /// Byte offset of the text being replaced.
    pub replace_start: usize,
    /// Byte length of the text being replaced.
    pub replace_length: usize,
}

/// Pre-dispatch key callback. Return `true` to mark the event handled.
pub type KeyHandler = Arc<dyn Fn(&mut LineState, &KeyEvent) -> bool + Send + Sync>;

/// Pre-dispatch mouse callback. Return `true` to mark the event handled.
pub type MouseHandler = Arc<dyn Fn(&mut LineState, &MouseEvent) -> bool + Send + Sync>;

/// Completion provider: buffer text and cursor byte offset in, candidates out.
pub type CompletionHandler = Arc<dyn Fn(&str, usize) -> Completion + Send + Sync>;

/// Visible-slice renderer for selection/keyword highlighting.
///
/// Receives the visible slice and the selection range within it (when
/// any part of the selection is visible); returns the styled text to
/// print. The rendered text must keep the slice's display width.
pub type MarkupRenderer = Arc<dyn Fn(&str, Option<Range<usize>>) -> String + Send + Sync>;

/// Options for [`crate::Terminal::read_line`].
#[derive(Clone)]
pub struct ReadLineOptions {
    /// Prompt printed before the input line.
    pub prompt: String,
    /// Render the buffer and cursor; `false` accepts silently.
    pub echo: bool,
    /// Visible width in cells; `None` sizes to the terminal.
    pub view_width: Option<u16>,
    /// Cap on input length in characters; oversize edits ring the bell.
    pub max_length: Option<usize>,
    /// Write `\n` after accepting.
    pub emit_newline_on_accept: bool,
    /// Allow cursor motion and mid-line edits.
    pub enable_editing: bool,
    /// Up/Down traverse history; Ctrl+R searches it.
    pub enable_history: bool,
    /// Append non-empty accepted lines to [`Self::history`].
    pub add_to_history: bool,
    /// Consume paste events as bulk inserts.
    pub enable_bracketed_paste: bool,
    /// Mouse clicks position the cursor; drags select.
    pub enable_mouse_editing: bool,
    /// Extra bindings consulted before the defaults.
    pub key_bindings: KeyBindings,
    /// Pre-dispatch key callback.
    pub key_handler: Option<KeyHandler>,
    /// Pre-dispatch mouse callback.
    pub mouse_handler: Option<MouseHandler>,
    /// Completion provider; Tab cycles candidates.
    pub completion_handler: Option<CompletionHandler>,
    /// Visible-slice renderer.
    pub markup_renderer: Option<MarkupRenderer>,
    /// The options-scoped history.
    pub history: Arc<Mutex<History>>,
    /// Cooperative cancellation for the whole call.
    pub cancel: Option<CancellationToken>,
}

impl Default for ReadLineOptions {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            echo: true,
            view_width: None,
            max_length: None,
            emit_newline_on_accept: true,
            enable_editing: true,
            enable_history: true,
            add_to_history: true,
            enable_bracketed_paste: true,
            enable_mouse_editing: false,
            key_bindings: KeyBindings::new(),
            key_handler: None,
            mouse_handler: None,
            completion_handler: None,
            markup_renderer: None,
            history: Arc::new(Mutex::new(History::new())),
            cancel: None,
        }
    }
}

impl std::fmt::Debug for ReadLineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadLineOptions")
            .field("prompt", &self.prompt)
            .field("echo", &self.echo)
            .field("view_width", &self.view_width)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl ReadLineOptions {
    /// Options with a prompt.
    #[must_use]
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Set the visible width.
    #[must_use]
    pub fn view_width(mut self, cells: u16) -> Self {
        self.view_width = Some(cells);
        self
    }

    /// Set the length cap.
    #[must_use]
    pub fn max_length(mut self, chars: usize) -> Self {
        self.max_length = Some(chars);
        self
    }

    /// Disable echo (silent accept).
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Enable mouse-driven cursor placement and selection.
    #[must_use]
    pub fn mouse_editing(mut self) -> Self {
        self.enable_mouse_editing = true;
        self
    }

    /// Set the completion provider.
    #[must_use]
    pub fn completions(mut self, handler: CompletionHandler) -> Self {
        self.completion_handler = Some(handler);
        self
    }

    /// Set the cancellation token.
    #[must_use]
    pub fn cancellable(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
