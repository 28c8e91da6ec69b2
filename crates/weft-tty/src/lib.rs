#![forbid(unsafe_code)]

//! Native Unix terminal backend.
//!
//! Owns the termios state, the `/dev/tty` input thread, DEC private-mode
//! toggles, the terminfo capability probe, and the clipboard shell-outs.
//! Decoded input is published to the shared event bus; output goes
//! straight to stdio (the facade serializes writers above this layer).
//!
//! ## Escape Sequence Reference
//!
//! | Feature           | Enable                   | Disable                  |
//! |-------------------|--------------------------|--------------------------|
//! | Mouse clicks      | `CSI ? 1000 h`           | `CSI ? 1000 l`           |
//! | Mouse drag        | `CSI ? 1002 h`           | `CSI ? 1002 l`           |
//! | Mouse any-motion  | `CSI ? 1003 h`           | `CSI ? 1003 l`           |
//! | SGR mouse coords  | `CSI ? 1006 h`           | `CSI ? 1006 l`           |
//! | Bracketed paste   | `CSI ? 2004 h`           | `CSI ? 2004 l`           |
//! | Alternate screen  | `CSI ? 1049 h`           | `CSI ? 1049 l`           |
//! | Cursor visibility | `CSI ? 25 h`             | `CSI ? 25 l`             |
//! | Position query    | `CSI 6 n` → `CSI r;c R`  |                          |

#[cfg(unix)]
pub mod clipboard;
#[cfg(unix)]
pub mod input;
#[cfg(unix)]
pub mod modes;
#[cfg(unix)]
pub mod probe;

#[cfg(unix)]
pub use backend::UnixBackend;

#[cfg(unix)]
mod backend {
    use std::io::{self, Read, Write};
    use std::sync::{Mutex, MutexGuard};

    use weft_backend::{
        Backend, CURSOR_REPORT_TIMEOUT, ClearKind, Color, InputOptions, MouseMode, RawMode,
        TerminalOptions, best_effort, unsupported,
    };
    use weft_core::ansi::{AnsiWriter, private_mode};
    use weft_core::broadcast::EventBus;
    use weft_core::caps::Capabilities;
    use weft_core::decoder::CprSlot;
    use weft_core::error::{Error, Result};
    use weft_core::geometry::{TermPos, TermSize};

    use crate::clipboard::{self, Provider};
    use crate::input::{self, InputLoop};
    use crate::modes::ModeState;
    use crate::probe;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The Unix terminal backend.
    pub struct UnixBackend {
        caps: Capabilities,
        bus: EventBus,
        strict: bool,
        seven_bit: bool,
        clipboard_provider: Option<Provider>,
        osc52_fallback: bool,
        /// Termios mutations take this mutex, distinct from any output
        /// serialization above.
        modes: Mutex<ModeState>,
        input: Mutex<Option<InputLoop>>,
        /// Pending cursor-position query rendezvous, shared with the
        /// decoder on the input thread.
        cpr: CprSlot,
        /// Tracks which DEC mouse modes are currently written to the
        /// terminal so transitions emit minimal deltas.
        mouse_mode: Mutex<MouseMode>,
    }

    impl UnixBackend {
        /// Probe the environment and build the backend.
        pub fn new(opts: &TerminalOptions) -> Result<Self> {
            let caps = probe::detect(opts);
            Ok(Self {
                caps,
                bus: EventBus::new(),
                strict: opts.strict_mode,
                seven_bit: opts.prefer_7bit_c1,
                clipboard_provider: clipboard::detect(),
                osc52_fallback: opts.enable_osc52_clipboard,
                modes: Mutex::new(ModeState::default()),
                input: Mutex::new(None),
                cpr: CprSlot::new(),
                mouse_mode: Mutex::new(MouseMode::Off),
            })
        }

        /// Emit a sequence built by `f` when ANSI output is available.
        fn emit(
            &self,
            f: impl FnOnce(&mut AnsiWriter<&mut String>) -> std::fmt::Result,
        ) -> Result<()> {
            if !self.caps.ansi {
                return Ok(());
            }
            let mut buf = String::new();
            let result = if self.seven_bit {
                f(&mut AnsiWriter::new(&mut buf))
            } else {
                f(&mut AnsiWriter::new(&mut buf).with_8bit_c1())
            };
            result.map_err(|_| Error::Io(io::Error::other("format failure")))?;
            self.write_raw(&buf)
        }

        fn write_raw(&self, text: &str) -> Result<()> {
            let mut out = io::stdout().lock();
            out.write_all(text.as_bytes())?;
            out.flush()?;
            Ok(())
        }

        /// Run a cursor-position query through whichever path applies.
        fn query_cursor(&self) -> Result<TermPos> {
            if !self.caps.cursor_position_get {
                return Err(Error::not_supported("cursor position query"));
            }
            if self.input_running() {
                // The input thread owns the decoder; rendezvous through
                // the report slot.
                let rx = self.cpr.arm();
                self.emit(|w| w.query_cursor_position())?;
                match rx.recv_timeout(CURSOR_REPORT_TIMEOUT) {
                    Ok(pos) => Ok(pos),
                    Err(_) => {
                        self.cpr.disarm();
                        Err(Error::Io(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "cursor position report timed out",
                        )))
                    }
                }
            } else {
                // No input loop: briefly own the tty and parse the report
                // directly.
                let mut modes = lock(&self.modes);
                modes.ensure_saved()?;
                let seq = self.render_query()?;
                modes.with_temporary_cbreak(|tty| {
                    self.write_raw(&seq)?;
                    read_cursor_report(tty)
                })
            }
        }

        fn render_query(&self) -> Result<String> {
            let mut buf = String::new();
            let mut writer = AnsiWriter::new(&mut buf);
            writer
                .query_cursor_position()
                .map_err(|_| Error::Io(io::Error::other("format failure")))?;
            Ok(buf)
        }

        fn clipboard_unsupported(&self, what: &'static str) -> Result<()> {
            unsupported(&self.caps, self.strict, what)
        }
    }

    /// Parse `ESC [ row ; col R` straight off the tty, bounded by the
    /// report timeout.
    fn read_cursor_report(tty: &std::fs::File) -> Result<TermPos> {
        let deadline = std::time::Instant::now() + CURSOR_REPORT_TIMEOUT;
        let mut collected = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "cursor position report timed out",
                )));
            }
            if !input::poll_readable(tty, deadline - now)? {
                continue;
            }
            let mut reader = tty;
            if reader.read(&mut byte)? == 0 {
                return Err(Error::EndOfInput);
            }
            collected.push(byte[0]);
            if byte[0] == b'R' {
                break;
            }
        }
        parse_cursor_report(&collected).ok_or_else(|| {
            Error::Io(io::Error::other("malformed cursor position report"))
        })
    }

    fn parse_cursor_report(bytes: &[u8]) -> Option<TermPos> {
        let text = std::str::from_utf8(bytes).ok()?;
        let start = text.rfind("\x1b[")?;
        let body = &text[start + 2..text.len().checked_sub(1)?];
        let mut parts = body.split(';');
        let row: u16 = parts.next()?.parse().ok()?;
        let col: u16 = parts.next()?.parse().ok()?;
        Some(TermPos::from_wire(col, row))
    }

    impl Drop for UnixBackend {
        fn drop(&mut self) {
            // Best-effort restore; errors cannot propagate from drop.
            if let Some(running) = lock(&self.input).take() {
                running.shutdown();
            }
            let modes = lock(&self.modes);
            if modes.restore_original().is_err() {
                tracing::warn!("failed to restore termios on drop");
            }
        }
    }

    impl Backend for UnixBackend {
        fn capabilities(&self) -> &Capabilities {
            &self.caps
        }

        fn events(&self) -> &EventBus {
            &self.bus
        }

        fn window_size(&self) -> Result<TermSize> {
            if !self.caps.window_size_get {
                unsupported(&self.caps, self.strict, "window size")?;
                return Ok(TermSize::default());
            }
            let modes = lock(&self.modes);
            if let Some(tty) = modes.tty() {
                return Ok(input::window_size(tty));
            }
            drop(modes);
            match std::fs::File::open("/dev/tty") {
                Ok(tty) => Ok(input::window_size(&tty)),
                Err(_) => Ok(TermSize::default()),
            }
        }

        fn set_window_size(&self, _size: TermSize) -> Result<()> {
            unsupported(&self.caps, self.strict, "window resize")
        }

        fn cursor_position(&self) -> Result<TermPos> {
            match self.query_cursor() {
                Ok(pos) => Ok(pos),
                Err(err) if self.strict => Err(err),
                Err(err) => {
                    tracing::debug!(%err, "cursor query failed, reporting origin");
                    Ok(TermPos::default())
                }
            }
        }

        fn set_cursor_position(&self, pos: TermPos) -> Result<()> {
            if !self.caps.cursor_position_set {
                return unsupported(&self.caps, self.strict, "cursor positioning");
            }
            self.emit(|w| w.cursor_to(pos))
        }

        fn set_cursor_visible(&self, visible: bool) -> Result<()> {
            if !self.caps.cursor_visibility {
                return unsupported(&self.caps, self.strict, "cursor visibility");
            }
            self.emit(|w| w.cursor_visible(visible))
        }

        fn set_title(&self, title: &str) -> Result<()> {
            if !self.caps.title_set {
                return unsupported(&self.caps, self.strict, "window title");
            }
            best_effort(self.emit(|w| w.set_title(title)), self.strict, "window title")
        }

        fn set_colors(&self, fg: Option<Color>, bg: Option<Color>) -> Result<()> {
            if !self.caps.ansi {
                return unsupported(&self.caps, self.strict, "colors");
            }
            let mut seq = String::new();
            if let Some(fg) = fg {
                seq.push_str(&format!("\x1b[{}m", fg.sgr_params(true)));
            }
            if let Some(bg) = bg {
                seq.push_str(&format!("\x1b[{}m", bg.sgr_params(false)));
            }
            best_effort(self.write_raw(&seq), self.strict, "colors")
        }

        fn reset_colors(&self) -> Result<()> {
            if !self.caps.ansi {
                return unsupported(&self.caps, self.strict, "colors");
            }
            best_effort(self.emit(|w| w.sgr_reset()), self.strict, "colors")
        }

        fn beep(&self) -> Result<()> {
            if !self.caps.beep {
                return unsupported(&self.caps, self.strict, "beep");
            }
            best_effort(self.write_raw("\x07"), self.strict, "beep")
        }

        fn clear(&self, kind: ClearKind) -> Result<()> {
            if !self.caps.ansi {
                return unsupported(&self.caps, self.strict, "clear");
            }
            self.emit(|w| match kind {
                ClearKind::Line => {
                    w.carriage_return()?;
                    w.erase_line()
                }
                ClearKind::Screen => {
                    w.erase_display()?;
                    w.cursor_to(TermPos::default())
                }
                ClearKind::ScreenAndScrollback => {
                    w.erase_display()?;
                    w.erase_scrollback()?;
                    w.cursor_to(TermPos::default())
                }
            })
        }

        fn set_raw_mode(&self, mode: Option<RawMode>) -> Result<()> {
            if !self.caps.raw_mode {
                return unsupported(&self.caps, self.strict, "raw mode");
            }
            let mut modes = lock(&self.modes);
            if mode.is_some() {
                modes.ensure_saved()?;
            }
            modes.scope_mode = mode;
            modes.apply()
        }

        fn set_alternate_screen(&self, active: bool) -> Result<()> {
            if !self.caps.alternate_screen {
                return unsupported(&self.caps, self.strict, "alternate screen");
            }
            self.emit(|w| w.alternate_screen(active))
        }

        fn set_mouse_mode(&self, mode: MouseMode) -> Result<()> {
            if !self.caps.mouse {
                return unsupported(&self.caps, self.strict, "mouse input");
            }
            let mut current = lock(&self.mouse_mode);
            if *current == mode {
                return Ok(());
            }
            self.emit(|w| {
                // Disable the previous tracking mode, enable the new one,
                // and keep SGR coordinates on while any mode is active.
                for (m, dec) in [
                    (MouseMode::Clicks, private_mode::MOUSE_CLICKS),
                    (MouseMode::Drag, private_mode::MOUSE_DRAG),
                    (MouseMode::Move, private_mode::MOUSE_MOVE),
                ] {
                    if *current == m {
                        w.private_mode(dec, false)?;
                    }
                    if mode == m {
                        w.private_mode(dec, true)?;
                    }
                }
                if mode == MouseMode::Off {
                    w.private_mode(private_mode::MOUSE_SGR, false)?;
                } else if *current == MouseMode::Off {
                    w.private_mode(private_mode::MOUSE_SGR, true)?;
                }
                Ok(())
            })?;
            *current = mode;
            Ok(())
        }

        fn set_bracketed_paste(&self, active: bool) -> Result<()> {
            if !self.caps.bracketed_paste {
                return unsupported(&self.caps, self.strict, "bracketed paste");
            }
            self.emit(|w| w.private_mode(private_mode::BRACKETED_PASTE, active))
        }

        fn set_input_echo(&self, enabled: bool) -> Result<()> {
            if !self.caps.raw_mode {
                return unsupported(&self.caps, self.strict, "input echo");
            }
            let mut modes = lock(&self.modes);
            modes.ensure_saved()?;
            modes.echo_override = Some(enabled);
            modes.apply()
        }

        fn write_out(&self, text: &str) -> Result<()> {
            self.write_raw(text)
        }

        fn write_err(&self, text: &str) -> Result<()> {
            let mut err = io::stderr().lock();
            err.write_all(text.as_bytes())?;
            err.flush()?;
            Ok(())
        }

        fn flush(&self) -> Result<()> {
            io::stdout().lock().flush()?;
            io::stderr().lock().flush()?;
            Ok(())
        }

        fn start_input(&self, opts: InputOptions) -> Result<()> {
            let mut input = lock(&self.input);
            if input.is_some() {
                return Ok(());
            }
            if self.caps.input_redirected {
                return unsupported(&self.caps, self.strict, "input loop");
            }
            {
                let mut modes = lock(&self.modes);
                modes.ensure_saved()?;
                modes.input_active = true;
                modes.ctrl_c_as_input = opts.treat_control_c_as_input;
                modes.apply()?;
            }
            let initial = self.window_size().unwrap_or_default();
            let started = InputLoop::spawn(self.bus.clone(), self.cpr.clone(), opts, initial)?;
            *input = Some(started);
            tracing::debug!("input loop started");
            Ok(())
        }

        fn stop_input(&self) -> Result<()> {
            let running = lock(&self.input).take();
            if let Some(running) = running {
                running.shutdown();
                let mut modes = lock(&self.modes);
                modes.input_active = false;
                modes.apply()?;
                tracing::debug!("input loop stopped");
            }
            Ok(())
        }

        fn input_running(&self) -> bool {
            lock(&self.input).is_some()
        }

        fn clipboard_get(&self) -> Result<Option<String>> {
            match self.clipboard_provider {
                Some(provider) => match provider.get() {
                    Ok(text) => Ok(text),
                    Err(err) if self.strict => Err(err),
                    Err(err) => {
                        tracing::debug!(%err, "clipboard read failed");
                        Ok(None)
                    }
                },
                None => {
                    self.clipboard_unsupported("clipboard read")?;
                    Ok(None)
                }
            }
        }

        fn clipboard_set(&self, text: &str) -> Result<()> {
            if let Some(provider) = self.clipboard_provider {
                return best_effort(provider.set(text), self.strict, "clipboard write");
            }
            if self.osc52_fallback && self.caps.osc52_clipboard {
                return best_effort(
                    self.emit(|w| w.set_clipboard(text)),
                    self.strict,
                    "clipboard write",
                );
            }
            self.clipboard_unsupported("clipboard write")
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn cursor_report_parsing() {
            assert_eq!(
                parse_cursor_report(b"\x1b[5;10R"),
                Some(TermPos::new(9, 4))
            );
            // Stray bytes before the report are tolerated.
            assert_eq!(
                parse_cursor_report(b"x\x1b[1;1R"),
                Some(TermPos::new(0, 0))
            );
            assert_eq!(parse_cursor_report(b"\x1b[R"), None);
            assert_eq!(parse_cursor_report(b"junk"), None);
        }
    }
}
