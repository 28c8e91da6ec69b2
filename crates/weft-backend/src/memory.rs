#![forbid(unsafe_code)]

//! Deterministic in-memory backend.
//!
//! Implements every backend contract without touching the OS: output is
//! captured into shared string sinks, input is whatever the test injects,
//! and every scope transition succeeds. Alternate screen and cursor
//! visibility additionally emit their ANSI sequences to the sink (when
//! ANSI is enabled) so scope-restore behavior is observable byte for
//! byte.

use std::sync::{Arc, Mutex, MutexGuard};

use weft_core::ansi::AnsiWriter;
use weft_core::broadcast::EventBus;
use weft_core::caps::Capabilities;
use weft_core::decoder::Decoder;
use weft_core::error::Result;
use weft_core::event::Event;
use weft_core::geometry::{TermPos, TermSize};

use crate::options::InputOptions;
use crate::{Backend, ClearKind, Color, MouseMode, RawMode, unsupported};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A shared, inspectable text sink.
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    buf: Arc<Mutex<String>>,
}

impl SharedSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        lock(&self.buf).clone()
    }

    /// Discard captured output.
    pub fn clear(&self) {
        lock(&self.buf).clear();
    }

    fn push(&self, text: &str) {
        lock(&self.buf).push_str(text);
    }
}

/// Mutable terminal state tracked by the virtual backend.
#[derive(Debug)]
struct MemoryState {
    size: TermSize,
    cursor: TermPos,
    cursor_visible: bool,
    title: Option<String>,
    raw_mode: Option<RawMode>,
    alternate_screen: bool,
    mouse_mode: MouseMode,
    bracketed_paste: bool,
    input_echo: bool,
    input_running: bool,
    clipboard: Option<String>,
    decoder: Decoder,
}

/// In-memory backend for tests and headless use.
pub struct MemoryBackend {
    caps: Capabilities,
    bus: EventBus,
    out: SharedSink,
    err: SharedSink,
    strict: bool,
    state: Mutex<MemoryState>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("caps", &self.caps.terminal_name)
            .field("size", &lock(&self.state).size)
            .finish_non_exhaustive()
    }
}

impl MemoryBackend {
    /// A fully capable 80x24 virtual terminal.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::vt_full("weft-virtual"))
    }

    /// A virtual terminal with explicit capabilities.
    #[must_use]
    pub fn with_capabilities(mut caps: Capabilities) -> Self {
        // The in-memory clipboard always works.
        caps.clipboard_get = true;
        caps.clipboard_set = true;
        Self {
            caps,
            bus: EventBus::new(),
            out: SharedSink::new(),
            err: SharedSink::new(),
            strict: false,
            state: Mutex::new(MemoryState {
                size: TermSize::new(80, 24),
                cursor: TermPos::default(),
                cursor_visible: true,
                title: None,
                raw_mode: None,
                alternate_screen: false,
                mouse_mode: MouseMode::Off,
                bracketed_paste: false,
                input_echo: true,
                input_running: false,
                clipboard: None,
                decoder: Decoder::new(),
            }),
        }
    }

    /// The capability profile CI hosts get: ANSI capture, no interactivity.
    #[must_use]
    pub fn ci() -> Self {
        Self::with_capabilities(Capabilities::ci())
    }

    /// Enable strict mode (unsupported operations fail).
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// The captured primary output.
    #[must_use]
    pub fn out_sink(&self) -> SharedSink {
        self.out.clone()
    }

    /// The captured error output.
    #[must_use]
    pub fn err_sink(&self) -> SharedSink {
        self.err.clone()
    }

    /// Inject a ready-made event.
    pub fn push_event(&self, event: Event) {
        self.bus.publish(event);
    }

    /// Decode a raw character stream exactly as a live backend would.
    pub fn push_text(&self, input: &str, last: bool) {
        let events = lock(&self.state).decoder.feed(input, last);
        for event in events {
            self.bus.publish(event);
        }
    }

    /// Change the reported size, optionally publishing a resize event.
    pub fn set_size(&self, size: TermSize, publish: bool) {
        lock(&self.state).size = size;
        if publish {
            self.bus.publish(Event::Resize(size));
        }
    }

    /// Current recorded mouse mode (test observability).
    #[must_use]
    pub fn mouse_mode(&self) -> MouseMode {
        lock(&self.state).mouse_mode
    }

    /// Current recorded raw mode (test observability).
    #[must_use]
    pub fn raw_mode(&self) -> Option<RawMode> {
        lock(&self.state).raw_mode
    }

    /// Recorded title (test observability).
    #[must_use]
    pub fn recorded_title(&self) -> Option<String> {
        lock(&self.state).title.clone()
    }

    /// Whether bracketed paste is recorded active (test observability).
    #[must_use]
    pub fn bracketed_paste(&self) -> bool {
        lock(&self.state).bracketed_paste
    }

    /// Whether the cursor is recorded visible (test observability).
    #[must_use]
    pub fn cursor_visible(&self) -> bool {
        lock(&self.state).cursor_visible
    }

    /// Whether input echo is recorded enabled (test observability).
    #[must_use]
    pub fn input_echo(&self) -> bool {
        lock(&self.state).input_echo
    }

    fn emit(&self, f: impl FnOnce(&mut AnsiWriter<&mut String>) -> std::fmt::Result) {
        if !self.caps.ansi {
            return;
        }
        let mut buf = String::new();
        let mut writer = AnsiWriter::new(&mut buf);
        if f(&mut writer).is_ok() {
            self.out.push(&buf);
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn events(&self) -> &EventBus {
        &self.bus
    }

    fn window_size(&self) -> Result<TermSize> {
        Ok(lock(&self.state).size)
    }

    fn set_window_size(&self, size: TermSize) -> Result<()> {
        self.set_size(size, true);
        Ok(())
    }

    fn cursor_position(&self) -> Result<TermPos> {
        Ok(lock(&self.state).cursor)
    }

    fn set_cursor_position(&self, pos: TermPos) -> Result<()> {
        lock(&self.state).cursor = pos;
        self.emit(|w| w.cursor_to(pos));
        Ok(())
    }

    fn set_cursor_visible(&self, visible: bool) -> Result<()> {
        lock(&self.state).cursor_visible = visible;
        self.emit(|w| w.cursor_visible(visible));
        Ok(())
    }

    fn title(&self) -> Result<Option<String>> {
        Ok(lock(&self.state).title.clone())
    }

    fn set_title(&self, title: &str) -> Result<()> {
        lock(&self.state).title = Some(title.to_owned());
        Ok(())
    }

    fn set_colors(&self, fg: Option<Color>, bg: Option<Color>) -> Result<()> {
        self.emit(|w| {
            use std::fmt::Write;
            if let Some(fg) = fg {
                write!(w, "\x1b[{}m", fg.sgr_params(true))?;
            }
            if let Some(bg) = bg {
                write!(w, "\x1b[{}m", bg.sgr_params(false))?;
            }
            Ok(())
        });
        Ok(())
    }

    fn reset_colors(&self) -> Result<()> {
        self.emit(|w| w.sgr_reset());
        Ok(())
    }

    fn beep(&self) -> Result<()> {
        self.emit(|w| w.bell());
        Ok(())
    }

    fn clear(&self, kind: ClearKind) -> Result<()> {
        self.emit(|w| match kind {
            ClearKind::Line => w.erase_line(),
            ClearKind::Screen => w.erase_display(),
            ClearKind::ScreenAndScrollback => {
                w.erase_display()?;
                w.erase_scrollback()
            }
        });
        Ok(())
    }

    fn set_raw_mode(&self, mode: Option<RawMode>) -> Result<()> {
        if !self.caps.raw_mode {
            return unsupported(&self.caps, self.strict, "raw mode");
        }
        lock(&self.state).raw_mode = mode;
        Ok(())
    }

    fn set_alternate_screen(&self, active: bool) -> Result<()> {
        if !self.caps.alternate_screen {
            return unsupported(&self.caps, self.strict, "alternate screen");
        }
        lock(&self.state).alternate_screen = active;
        self.emit(|w| w.alternate_screen(active));
        Ok(())
    }

    fn set_mouse_mode(&self, mode: MouseMode) -> Result<()> {
        if !self.caps.mouse {
            return unsupported(&self.caps, self.strict, "mouse input");
        }
        lock(&self.state).mouse_mode = mode;
        Ok(())
    }

    fn set_bracketed_paste(&self, active: bool) -> Result<()> {
        if !self.caps.bracketed_paste {
            return unsupported(&self.caps, self.strict, "bracketed paste");
        }
        lock(&self.state).bracketed_paste = active;
        Ok(())
    }

    fn set_input_echo(&self, enabled: bool) -> Result<()> {
        lock(&self.state).input_echo = enabled;
        Ok(())
    }

    fn write_out(&self, text: &str) -> Result<()> {
        self.out.push(text);
        Ok(())
    }

    fn write_err(&self, text: &str) -> Result<()> {
        self.err.push(text);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn start_input(&self, _opts: InputOptions) -> Result<()> {
        lock(&self.state).input_running = true;
        Ok(())
    }

    fn stop_input(&self) -> Result<()> {
        lock(&self.state).input_running = false;
        Ok(())
    }

    fn input_running(&self) -> bool {
        lock(&self.state).input_running
    }

    fn clipboard_get(&self) -> Result<Option<String>> {
        Ok(lock(&self.state).clipboard.clone())
    }

    fn clipboard_set(&self, text: &str) -> Result<()> {
        lock(&self.state).clipboard = Some(text.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::event::{Key, KeyEvent};

    #[test]
    fn captures_output() {
        let backend = MemoryBackend::new();
        backend.write_out("hello").unwrap();
        backend.write_err("oops").unwrap();
        assert_eq!(backend.out_sink().contents(), "hello");
        assert_eq!(backend.err_sink().contents(), "oops");
    }

    #[tokio::test]
    async fn push_text_decodes_through_the_shared_grammar() {
        let backend = MemoryBackend::new();
        let bus = backend.events().clone();
        backend.push_text("\x1b[A", false);
        let event = bus.read().await.unwrap();
        assert_eq!(event, Event::Key(KeyEvent::new(Key::Up)));
    }

    #[tokio::test]
    async fn set_size_publishes_resize() {
        let backend = MemoryBackend::new();
        let bus = backend.events().clone();
        backend.set_size(TermSize::new(100, 40), true);
        assert_eq!(
            bus.read().await.unwrap(),
            Event::Resize(TermSize::new(100, 40))
        );
        assert_eq!(backend.window_size().unwrap(), TermSize::new(100, 40));
    }

    #[test]
    fn alternate_screen_emits_sequences() {
        let backend = MemoryBackend::new();
        backend.set_alternate_screen(true).unwrap();
        backend.write_out("X").unwrap();
        backend.set_alternate_screen(false).unwrap();
        assert_eq!(backend.out_sink().contents(), "\x1b[?1049hX\x1b[?1049l");
    }

    #[test]
    fn strict_mode_surfaces_missing_capabilities() {
        let backend = MemoryBackend::with_capabilities(Capabilities::dumb()).strict();
        assert!(backend.set_alternate_screen(true).is_err());
        let lenient = MemoryBackend::with_capabilities(Capabilities::dumb());
        assert!(lenient.set_alternate_screen(true).is_ok());
        assert!(lenient.out_sink().contents().is_empty());
    }

    #[test]
    fn clipboard_round_trip() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.clipboard_get().unwrap(), None);
        backend.clipboard_set("copied").unwrap();
        assert_eq!(backend.clipboard_get().unwrap(), Some("copied".into()));
    }
}
