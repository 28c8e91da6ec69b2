#![forbid(unsafe_code)]

//! Backend contract: the boundary between the terminal facade and the
//! platform-specific implementations (Unix tty, Windows console, and the
//! in-memory backend for tests).
//!
//! The trait is deliberately synchronous and object-safe: the async
//! surface of the library lives entirely in the event broadcaster and the
//! facade, so a backend only has to move bytes and flip modes. Scope
//! ref-counting also lives above this boundary; backends see plain
//! enable/disable transitions and never a nested scope.

use std::time::Duration;

use weft_core::broadcast::EventBus;
use weft_core::caps::{Capabilities, ColorLevel};
use weft_core::error::{Error, Result};
use weft_core::geometry::{TermPos, TermSize};

pub mod memory;
pub mod options;

pub use memory::{MemoryBackend, SharedSink};
pub use options::{InputOptions, TerminalOptions, WindowsVtInput};

/// Raw input modes, by how much line discipline they remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RawMode {
    /// No line buffering or echo; signal keys still work.
    CBreak,
    /// Everything off, bytes flow through untouched.
    Raw,
}

/// Mouse reporting modes, rank-ordered: a higher mode reports a superset
/// of events of the lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum MouseMode {
    /// No mouse reporting.
    #[default]
    Off,
    /// Button presses and releases.
    Clicks,
    /// Clicks plus motion while a button is held.
    Drag,
    /// All pointer motion.
    Move,
}

/// What to erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearKind {
    /// The current line.
    Line,
    /// The visible screen.
    Screen,
    /// The visible screen and the scrollback buffer.
    ScreenAndScrollback,
}

/// A color for the backend fg/bg state setters.
///
/// Styling and markup rendering are out of scope for the core; this type
/// exists so the facade can expose plain color state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    /// The terminal's default color.
    #[default]
    Default,
    /// One of the 16 basic ANSI colors (0-15).
    Ansi(u8),
    /// An indexed 256-palette color.
    Indexed(u8),
    /// 24-bit RGB.
    Rgb(u8, u8, u8),
}

impl Color {
    /// Render this color as an SGR parameter list for the given plane.
    ///
    /// `foreground` selects between the 3x/38 and 4x/48 parameter space.
    /// Colors beyond the terminal's depth are clamped to the nearest
    /// representable form by the caller's capability gate, not here.
    #[must_use]
    pub fn sgr_params(&self, foreground: bool) -> String {
        let base: u8 = if foreground { 30 } else { 40 };
        match *self {
            Self::Default => format!("{}", base + 9),
            Self::Ansi(n) if n < 8 => format!("{}", base + n),
            Self::Ansi(n) => format!("{}", base + 60 + (n & 7)),
            Self::Indexed(n) => format!("{};5;{n}", base + 8),
            Self::Rgb(r, g, b) => format!("{};2;{r};{g};{b}", base + 8),
        }
    }
}

/// The platform contract.
///
/// Capability-gated behavior: an operation the backend cannot perform is
/// a silent no-op, unless the terminal was opened in strict mode, in
/// which case it fails with [`Error::NotSupported`]. The
/// [`unsupported`] helper implements that policy.
pub trait Backend: Send + Sync {
    /// The capability snapshot taken at init. Immutable for the backend's
    /// lifetime.
    fn capabilities(&self) -> &Capabilities;

    /// The event bus all decoded input is published to.
    fn events(&self) -> &EventBus;

    // ── Sized state ──────────────────────────────────────────────────

    /// Current window size in cells.
    fn window_size(&self) -> Result<TermSize>;

    /// Resize the window, where the platform allows it.
    fn set_window_size(&self, size: TermSize) -> Result<()>;

    /// Current scrollback buffer size.
    fn buffer_size(&self) -> Result<TermSize> {
        self.window_size()
    }

    /// Resize the scrollback buffer.
    fn set_buffer_size(&self, _size: TermSize) -> Result<()> {
        unsupported(self.capabilities(), false, "buffer size")
    }

    /// Query the cursor position. May block briefly (bounded by the
    /// cursor-report timeout) on VT backends.
    fn cursor_position(&self) -> Result<TermPos>;

    /// Move the cursor.
    fn set_cursor_position(&self, pos: TermPos) -> Result<()>;

    /// Show or hide the cursor.
    fn set_cursor_visible(&self, visible: bool) -> Result<()>;

    /// Read the window title, where the platform allows it.
    fn title(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Set the window title.
    fn set_title(&self, title: &str) -> Result<()>;

    /// Set foreground and/or background colors.
    fn set_colors(&self, fg: Option<Color>, bg: Option<Color>) -> Result<()>;

    /// Reset colors to the terminal defaults.
    fn reset_colors(&self) -> Result<()>;

    /// Ring the bell.
    fn beep(&self) -> Result<()>;

    /// Erase per [`ClearKind`].
    fn clear(&self, kind: ClearKind) -> Result<()>;

    // ── Scoped-state primitives ──────────────────────────────────────
    //
    // The facade's scope registry ref-counts; backends only ever see the
    // 0→1 and 1→0 transitions (or a rank change for the mouse mode).

    /// Enter the given raw mode, or restore the saved input mode on
    /// `None`.
    fn set_raw_mode(&self, mode: Option<RawMode>) -> Result<()>;

    /// Enter or leave the alternate screen.
    fn set_alternate_screen(&self, active: bool) -> Result<()>;

    /// Switch mouse reporting to the given mode.
    fn set_mouse_mode(&self, mode: MouseMode) -> Result<()>;

    /// Enable or disable bracketed paste.
    fn set_bracketed_paste(&self, active: bool) -> Result<()>;

    /// Enable or disable input echo.
    fn set_input_echo(&self, enabled: bool) -> Result<()>;

    // ── Output sinks ─────────────────────────────────────────────────
    //
    // Callers serialize through the facade's output lock; backends only
    // need each call to be written out whole.

    /// Write to the primary output.
    fn write_out(&self, text: &str) -> Result<()>;

    /// Write to the error output.
    fn write_err(&self, text: &str) -> Result<()>;

    /// Flush both sinks.
    fn flush(&self) -> Result<()>;

    // ── Input loop ───────────────────────────────────────────────────

    /// Start the input loop. Idempotent; the first call snapshots the
    /// terminal input state that `stop_input` restores.
    fn start_input(&self, opts: InputOptions) -> Result<()>;

    /// Stop the input loop and join its thread. Idempotent.
    fn stop_input(&self) -> Result<()>;

    /// True while the input loop is running.
    fn input_running(&self) -> bool;

    // ── Clipboard ────────────────────────────────────────────────────

    /// Best-effort clipboard read.
    fn clipboard_get(&self) -> Result<Option<String>>;

    /// Best-effort clipboard write.
    fn clipboard_set(&self, text: &str) -> Result<()>;
}

/// Apply the unsupported-operation policy: silent no-op, or
/// [`Error::NotSupported`] in strict mode.
pub fn unsupported(_caps: &Capabilities, strict: bool, what: &'static str) -> Result<()> {
    if strict {
        Err(Error::not_supported(what))
    } else {
        tracing::debug!(what, "unsupported operation ignored");
        Ok(())
    }
}

/// Swallow a best-effort failure unless strict mode is set.
pub fn best_effort(result: Result<()>, strict: bool, what: &'static str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if strict => Err(err),
        Err(err) => {
            tracing::debug!(what, %err, "best-effort operation failed");
            Ok(())
        }
    }
}

/// How long the Unix input loop waits in `poll(2)` before an idle flush.
pub const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a cursor-position query waits for its report.
pub const CURSOR_REPORT_TIMEOUT: Duration = Duration::from_millis(250);

/// How long a clipboard helper subprocess may run.
pub const CLIPBOARD_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pick the effective color level for a backend: capability, capped by
/// preference, downgraded by `NO_COLOR` when respected.
#[must_use]
pub fn effective_color_level(
    detected: ColorLevel,
    preferred: Option<ColorLevel>,
    no_color: bool,
) -> ColorLevel {
    if no_color {
        return ColorLevel::None;
    }
    match preferred {
        Some(cap) if cap < detected => cap,
        _ => detected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_modes_are_rank_ordered() {
        assert!(MouseMode::Off < MouseMode::Clicks);
        assert!(MouseMode::Clicks < MouseMode::Drag);
        assert!(MouseMode::Drag < MouseMode::Move);
    }

    #[test]
    fn sgr_params_cover_the_planes() {
        assert_eq!(Color::Default.sgr_params(true), "39");
        assert_eq!(Color::Ansi(1).sgr_params(true), "31");
        assert_eq!(Color::Ansi(9).sgr_params(true), "91");
        assert_eq!(Color::Ansi(1).sgr_params(false), "41");
        assert_eq!(Color::Indexed(180).sgr_params(true), "38;5;180");
        assert_eq!(Color::Rgb(1, 2, 3).sgr_params(false), "48;2;1;2;3");
    }

    #[test]
    fn strict_mode_turns_noops_into_errors() {
        let caps = Capabilities::dumb();
        assert!(unsupported(&caps, false, "beep").is_ok());
        let err = unsupported(&caps, true, "beep").unwrap_err();
        assert!(matches!(err, Error::NotSupported { what: "beep" }));
    }

    #[test]
    fn color_level_resolution() {
        use ColorLevel::{Ansi16, TrueColor};
        assert_eq!(effective_color_level(TrueColor, None, false), TrueColor);
        assert_eq!(effective_color_level(TrueColor, Some(Ansi16), false), Ansi16);
        assert_eq!(effective_color_level(Ansi16, Some(TrueColor), false), Ansi16);
        assert_eq!(effective_color_level(TrueColor, None, true), ColorLevel::None);
    }
}
