//! Win32 console backend.
//!
//! Console input records are read in 32-record batches on a dedicated
//! thread and translated by [`crate::records::Translator`]; when
//! `ENABLE_VIRTUAL_TERMINAL_INPUT` is negotiated, key characters are
//! routed through the shared VT decoder instead so bracketed paste and
//! SGR mouse behave exactly as on Unix. Output prefers
//! `ENABLE_VIRTUAL_TERMINAL_PROCESSING`; colors fall back to native
//! console attributes when the mode does not stick.

#![cfg(windows)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;

use windows_sys::Win32::Foundation::{HANDLE, INVALID_HANDLE_VALUE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::Globalization::CP_UTF8;
use windows_sys::Win32::System::Console::{
    CONSOLE_CURSOR_INFO, CONSOLE_MODE, CONSOLE_SCREEN_BUFFER_INFO, COORD, CTRL_BREAK_EVENT,
    CTRL_C_EVENT, ENABLE_ECHO_INPUT, ENABLE_EXTENDED_FLAGS, ENABLE_LINE_INPUT,
    ENABLE_MOUSE_INPUT, ENABLE_PROCESSED_INPUT, ENABLE_VIRTUAL_TERMINAL_INPUT,
    ENABLE_VIRTUAL_TERMINAL_PROCESSING, ENABLE_WINDOW_INPUT, FillConsoleOutputAttribute,
    FillConsoleOutputCharacterW, GetConsoleCursorInfo, GetConsoleMode,
    GetConsoleScreenBufferInfo, GetConsoleTitleW, GetStdHandle, INPUT_RECORD, KEY_EVENT,
    MOUSE_EVENT, ReadConsoleInputW, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
    SetConsoleCtrlHandler, SetConsoleCursorInfo, SetConsoleCursorPosition, SetConsoleMode,
    SetConsoleOutputCP, SetConsoleScreenBufferSize, SetConsoleTextAttribute, SetConsoleTitleW,
    WINDOW_BUFFER_SIZE_EVENT,
};
use windows_sys::Win32::System::Threading::WaitForSingleObject;

use weft_backend::{
    Backend, ClearKind, Color, InputOptions, MouseMode, RawMode, TerminalOptions, WindowsVtInput,
    best_effort, unsupported,
};
use weft_core::ansi::{AnsiWriter, private_mode};
use weft_core::broadcast::EventBus;
use weft_core::caps::{Capabilities, ColorLevel};
use weft_core::decoder::{CprSlot, Decoder};
use weft_core::error::{Error, Result};
use weft_core::event::{Event, Signal};
use weft_core::geometry::{TermPos, TermSize};

use crate::clipboard;
use crate::records::{KeyRecord, MouseRecord, Translator};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn last_os_error() -> Error {
    Error::Io(io::Error::last_os_error())
}

fn stdin_handle() -> Result<HANDLE> {
    // SAFETY: GetStdHandle has no preconditions.
    let handle = unsafe { GetStdHandle(STD_INPUT_HANDLE) };
    if handle == INVALID_HANDLE_VALUE {
        return Err(last_os_error());
    }
    Ok(handle)
}

fn stdout_handle() -> Result<HANDLE> {
    // SAFETY: GetStdHandle has no preconditions.
    let handle = unsafe { GetStdHandle(STD_OUTPUT_HANDLE) };
    if handle == INVALID_HANDLE_VALUE {
        return Err(last_os_error());
    }
    Ok(handle)
}

fn console_mode(handle: HANDLE) -> Result<CONSOLE_MODE> {
    let mut mode: CONSOLE_MODE = 0;
    // SAFETY: handle is a console handle and mode is a valid out pointer.
    if unsafe { GetConsoleMode(handle, &mut mode) } == 0 {
        return Err(last_os_error());
    }
    Ok(mode)
}

fn set_console_mode(handle: HANDLE, mode: CONSOLE_MODE) -> Result<()> {
    // SAFETY: handle is a console handle.
    if unsafe { SetConsoleMode(handle, mode) } == 0 {
        return Err(last_os_error());
    }
    Ok(())
}

fn screen_buffer_info(handle: HANDLE) -> Result<CONSOLE_SCREEN_BUFFER_INFO> {
    // SAFETY: zeroed CONSOLE_SCREEN_BUFFER_INFO is a valid out value.
    let mut info: CONSOLE_SCREEN_BUFFER_INFO = unsafe { std::mem::zeroed() };
    // SAFETY: handle is a console handle and info is a valid out pointer.
    if unsafe { GetConsoleScreenBufferInfo(handle, &mut info) } == 0 {
        return Err(last_os_error());
    }
    Ok(info)
}

// Ctrl events arrive on a system thread; the handler can only reach the
// backend through process-global state. First hook installed wins.
static CTRL_BUS: OnceLock<EventBus> = OnceLock::new();

unsafe extern "system" fn ctrl_handler(ctrl_type: u32) -> i32 {
    let Some(bus) = CTRL_BUS.get() else {
        return 0;
    };
    let signal = match ctrl_type {
        CTRL_C_EVENT => Signal::Interrupt,
        CTRL_BREAK_EVENT => Signal::Break,
        _ => return 0,
    };
    bus.publish(Event::Signal(signal));
    1
}

/// Console-mode layering, the Windows analogue of the termios state.
#[derive(Debug, Default)]
struct ModeState {
    original_in: Option<CONSOLE_MODE>,
    scope_mode: Option<RawMode>,
    input_active: bool,
    ctrl_c_as_input: bool,
    echo_override: Option<bool>,
    vt_input: bool,
}

impl ModeState {
    fn ensure_saved(&mut self) -> Result<()> {
        if self.original_in.is_none() {
            self.original_in = Some(console_mode(stdin_handle()?)?);
            tracing::debug!("saved original console input mode");
        }
        Ok(())
    }

    fn apply(&self) -> Result<()> {
        let Some(original) = self.original_in else {
            return Ok(());
        };
        let mut mode = original;
        if self.input_active || self.scope_mode.is_some() {
            mode = ENABLE_EXTENDED_FLAGS | ENABLE_WINDOW_INPUT | ENABLE_MOUSE_INPUT;
            let raw = matches!(self.scope_mode, Some(RawMode::Raw));
            if !raw && !self.ctrl_c_as_input {
                mode |= ENABLE_PROCESSED_INPUT;
            }
            if self.vt_input {
                mode |= ENABLE_VIRTUAL_TERMINAL_INPUT;
            }
        }
        if let Some(echo) = self.echo_override {
            if echo {
                mode |= ENABLE_ECHO_INPUT | ENABLE_LINE_INPUT;
            } else {
                mode &= !(ENABLE_ECHO_INPUT | ENABLE_LINE_INPUT);
            }
        }
        set_console_mode(stdin_handle()?, mode)
    }

    fn restore_original(&self) -> Result<()> {
        if let Some(original) = self.original_in {
            set_console_mode(stdin_handle()?, original)?;
        }
        Ok(())
    }
}

struct InputLoop {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InputLoop {
    fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for InputLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The Windows console backend.
pub struct WindowsBackend {
    caps: Capabilities,
    bus: EventBus,
    strict: bool,
    vt_output: bool,
    modes: Mutex<ModeState>,
    input: Mutex<Option<InputLoop>>,
    cpr: CprSlot,
    mouse_mode: Mutex<MouseMode>,
    vt_input_choice: WindowsVtInput,
}

impl WindowsBackend {
    /// Probe the console and build the backend.
    pub fn new(opts: &TerminalOptions) -> Result<Self> {
        if opts.prefer_utf8_output {
            // SAFETY: SetConsoleOutputCP has no preconditions.
            unsafe { SetConsoleOutputCP(CP_UTF8) };
        }

        // Negotiate VT output; fall back to native attributes if the
        // console rejects the mode.
        let vt_output = stdout_handle()
            .and_then(console_mode)
            .and_then(|mode| {
                set_console_mode(stdout_handle()?, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING)
            })
            .is_ok();

        let input_tty = stdin_handle().and_then(console_mode).is_ok();
        let output_tty = stdout_handle().and_then(console_mode).is_ok();

        let vt_input = match opts.windows_vt_input {
            WindowsVtInput::Disabled => false,
            WindowsVtInput::Enabled => true,
            WindowsVtInput::Auto => {
                vt_output && input_tty && Self::probe_vt_input().unwrap_or(false)
            }
        };

        let no_color = opts.respect_no_color && std::env::var_os("NO_COLOR").is_some();
        let detected = if vt_output {
            ColorLevel::TrueColor
        } else {
            ColorLevel::Ansi16
        };
        let mut caps = Capabilities {
            ansi: vt_output || opts.force_ansi,
            color_level: weft_backend::effective_color_level(
                detected,
                opts.preferred_color_level,
                no_color,
            ),
            osc8_links: vt_output,
            alternate_screen: vt_output,
            cursor_visibility: true,
            mouse: input_tty,
            bracketed_paste: vt_input,
            private_modes: vt_output,
            raw_mode: input_tty,
            cursor_position_get: output_tty,
            cursor_position_set: output_tty,
            clipboard_get: true,
            clipboard_set: true,
            osc52_clipboard: false,
            title_get: true,
            title_set: true,
            window_size_get: output_tty,
            window_size_set: false,
            buffer_size_get: output_tty,
            buffer_size_set: output_tty,
            beep: true,
            output_redirected: !output_tty,
            input_redirected: !input_tty,
            terminal_name: if std::env::var_os("WT_SESSION").is_some() {
                "windows-terminal".to_owned()
            } else {
                "conhost".to_owned()
            },
        };
        if !input_tty {
            caps.mouse = false;
            caps.bracketed_paste = false;
        }

        Ok(Self {
            caps,
            bus: EventBus::new(),
            strict: opts.strict_mode,
            vt_output,
            modes: Mutex::new(ModeState::default()),
            input: Mutex::new(None),
            cpr: CprSlot::new(),
            mouse_mode: Mutex::new(MouseMode::Off),
            vt_input_choice: opts.windows_vt_input,
        })
    }

    /// Check whether `ENABLE_VIRTUAL_TERMINAL_INPUT` sticks.
    fn probe_vt_input() -> Result<bool> {
        let handle = stdin_handle()?;
        let original = console_mode(handle)?;
        let accepted =
            set_console_mode(handle, original | ENABLE_VIRTUAL_TERMINAL_INPUT).is_ok();
        set_console_mode(handle, original)?;
        Ok(accepted)
    }

    fn emit(
        &self,
        f: impl FnOnce(&mut AnsiWriter<&mut String>) -> std::fmt::Result,
    ) -> Result<()> {
        if !self.caps.ansi {
            return Ok(());
        }
        let mut buf = String::new();
        f(&mut AnsiWriter::new(&mut buf))
            .map_err(|_| Error::Io(io::Error::other("format failure")))?;
        self.write_raw(&buf)
    }

    fn write_raw(&self, text: &str) -> Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Window-relative cursor position from the buffer info.
    fn native_cursor_position(&self) -> Result<TermPos> {
        let info = screen_buffer_info(stdout_handle()?)?;
        let col = (info.dwCursorPosition.X - info.srWindow.Left).max(0);
        let row = (info.dwCursorPosition.Y - info.srWindow.Top).max(0);
        Ok(TermPos::new(col as u16, row as u16))
    }
}

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        if let Some(running) = lock(&self.input).take() {
            running.shutdown();
        }
        if lock(&self.modes).restore_original().is_err() {
            tracing::warn!("failed to restore console mode on drop");
        }
    }
}

impl Backend for WindowsBackend {
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
        let info = screen_buffer_info(stdout_handle()?)?;
        let cols = (info.srWindow.Right - info.srWindow.Left + 1).max(0);
        let rows = (info.srWindow.Bottom - info.srWindow.Top + 1).max(0);
        Ok(TermSize::new(cols as u16, rows as u16))
    }

    fn set_window_size(&self, _size: TermSize) -> Result<()> {
        unsupported(&self.caps, self.strict, "window resize")
    }

    fn buffer_size(&self) -> Result<TermSize> {
        if !self.caps.buffer_size_get {
            unsupported(&self.caps, self.strict, "buffer size")?;
            return Ok(TermSize::default());
        }
        let info = screen_buffer_info(stdout_handle()?)?;
        Ok(TermSize::new(
            info.dwSize.X.max(0) as u16,
            info.dwSize.Y.max(0) as u16,
        ))
    }

    fn set_buffer_size(&self, size: TermSize) -> Result<()> {
        if !self.caps.buffer_size_set {
            return unsupported(&self.caps, self.strict, "buffer size");
        }
        let coord = COORD {
            X: size.cols.min(i16::MAX as u16) as i16,
            Y: size.rows.min(i16::MAX as u16) as i16,
        };
        // SAFETY: handle is a console handle.
        if unsafe { SetConsoleScreenBufferSize(stdout_handle()?, coord) } == 0 {
            return best_effort(Err(last_os_error()), self.strict, "buffer size");
        }
        Ok(())
    }

    fn cursor_position(&self) -> Result<TermPos> {
        match self.native_cursor_position() {
            Ok(pos) => Ok(pos),
            Err(err) if self.strict => Err(err),
            Err(_) => Ok(TermPos::default()),
        }
    }

    fn set_cursor_position(&self, pos: TermPos) -> Result<()> {
        if !self.caps.cursor_position_set {
            return unsupported(&self.caps, self.strict, "cursor positioning");
        }
        if self.vt_output {
            return self.emit(|w| w.cursor_to(pos));
        }
        let info = screen_buffer_info(stdout_handle()?)?;
        let coord = COORD {
            X: info.srWindow.Left + pos.col.min(i16::MAX as u16) as i16,
            Y: info.srWindow.Top + pos.row.min(i16::MAX as u16) as i16,
        };
        // SAFETY: handle is a console handle.
        if unsafe { SetConsoleCursorPosition(stdout_handle()?, coord) } == 0 {
            return best_effort(Err(last_os_error()), self.strict, "cursor positioning");
        }
        Ok(())
    }

    fn set_cursor_visible(&self, visible: bool) -> Result<()> {
        if self.vt_output {
            return self.emit(|w| w.cursor_visible(visible));
        }
        let handle = stdout_handle()?;
        // SAFETY: zeroed CONSOLE_CURSOR_INFO is a valid out value.
        let mut info: CONSOLE_CURSOR_INFO = unsafe { std::mem::zeroed() };
        // SAFETY: handle is a console handle and info is a valid pointer.
        if unsafe { GetConsoleCursorInfo(handle, &mut info) } == 0 {
            return best_effort(Err(last_os_error()), self.strict, "cursor visibility");
        }
        info.bVisible = i32::from(visible);
        // SAFETY: info was initialized above.
        if unsafe { SetConsoleCursorInfo(handle, &info) } == 0 {
            return best_effort(Err(last_os_error()), self.strict, "cursor visibility");
        }
        Ok(())
    }

    fn title(&self) -> Result<Option<String>> {
        let mut buf = [0u16; 1024];
        // SAFETY: buf is a valid out buffer of the given length.
        let len = unsafe { GetConsoleTitleW(buf.as_mut_ptr(), buf.len() as u32) };
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf16_lossy(&buf[..len as usize])))
    }

    fn set_title(&self, title: &str) -> Result<()> {
        let wide: Vec<u16> = title.encode_utf16().chain(std::iter::once(0)).collect();
        // SAFETY: wide is NUL-terminated.
        if unsafe { SetConsoleTitleW(wide.as_ptr()) } == 0 {
            return best_effort(Err(last_os_error()), self.strict, "window title");
        }
        Ok(())
    }

    fn set_colors(&self, fg: Option<Color>, bg: Option<Color>) -> Result<()> {
        if self.vt_output {
            let mut seq = String::new();
            if let Some(fg) = fg {
                seq.push_str(&format!("\x1b[{}m", fg.sgr_params(true)));
            }
            if let Some(bg) = bg {
                seq.push_str(&format!("\x1b[{}m", bg.sgr_params(false)));
            }
            return best_effort(self.write_raw(&seq), self.strict, "colors");
        }
        let info = screen_buffer_info(stdout_handle()?)?;
        let mut attrs = info.wAttributes;
        if let Some(fg) = fg {
            if let Some(bits) = native_attr(fg) {
                attrs = (attrs & !0x0F) | bits;
            }
        }
        if let Some(bg) = bg {
            if let Some(bits) = native_attr(bg) {
                attrs = (attrs & !0xF0) | (bits << 4);
            }
        }
        // SAFETY: handle is a console handle.
        if unsafe { SetConsoleTextAttribute(stdout_handle()?, attrs) } == 0 {
            return best_effort(Err(last_os_error()), self.strict, "colors");
        }
        Ok(())
    }

    fn reset_colors(&self) -> Result<()> {
        if self.vt_output {
            return best_effort(self.emit(|w| w.sgr_reset()), self.strict, "colors");
        }
        self.set_colors(Some(Color::Ansi(7)), Some(Color::Ansi(0)))
    }

    fn beep(&self) -> Result<()> {
        best_effort(self.write_raw("\x07"), self.strict, "beep")
    }

    fn clear(&self, kind: ClearKind) -> Result<()> {
        if self.vt_output {
            return self.emit(|w| match kind {
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
            });
        }

        let handle = stdout_handle()?;
        let info = screen_buffer_info(handle)?;
        let (origin, cells) = match kind {
            ClearKind::Line => (
                COORD {
                    X: 0,
                    Y: info.dwCursorPosition.Y,
                },
                u32::from(info.dwSize.X.max(0) as u16),
            ),
            ClearKind::Screen | ClearKind::ScreenAndScrollback => (
                COORD { X: 0, Y: 0 },
                u32::from(info.dwSize.X.max(0) as u16) * u32::from(info.dwSize.Y.max(0) as u16),
            ),
        };
        let mut written: u32 = 0;
        // SAFETY: handle is a console handle; written is a valid out
        // pointer.
        unsafe {
            FillConsoleOutputCharacterW(handle, ' ' as u16, cells, origin, &mut written);
            FillConsoleOutputAttribute(handle, info.wAttributes, cells, origin, &mut written);
        }
        if matches!(kind, ClearKind::Screen | ClearKind::ScreenAndScrollback) {
            self.set_cursor_position(TermPos::default())?;
        }
        Ok(())
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
        // Native records already deliver every motion kind; only the VT
        // input path needs the DEC modes on the wire.
        if lock(&self.modes).vt_input {
            self.emit(|w| {
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
        }
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

        let vt_input = match self.vt_input_choice {
            WindowsVtInput::Disabled => false,
            WindowsVtInput::Enabled => true,
            WindowsVtInput::Auto => self.caps.bracketed_paste,
        };
        {
            let mut modes = lock(&self.modes);
            modes.ensure_saved()?;
            modes.input_active = true;
            modes.ctrl_c_as_input = opts.treat_control_c_as_input;
            modes.vt_input = vt_input;
            modes.apply()?;
        }

        if !opts.treat_control_c_as_input {
            let _ = CTRL_BUS.set(self.bus.clone());
            // SAFETY: ctrl_handler is a valid handler for the process
            // lifetime.
            unsafe { SetConsoleCtrlHandler(Some(ctrl_handler), 1) };
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let bus = self.bus.clone();
        let cpr = self.cpr.clone();
        let treat = opts.treat_control_c_as_input;
        let thread = std::thread::Builder::new()
            .name("weft-input".to_owned())
            .spawn(move || input_loop(&bus, cpr, vt_input, treat, &stop_flag))
            .map_err(Error::Io)?;
        *input = Some(InputLoop {
            stop,
            thread: Some(thread),
        });
        tracing::debug!(vt_input, "input loop started");
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
        match clipboard::get() {
            Ok(text) => Ok(text),
            Err(err) if self.strict => Err(err),
            Err(err) => {
                tracing::debug!(%err, "clipboard read failed");
                Ok(None)
            }
        }
    }

    fn clipboard_set(&self, text: &str) -> Result<()> {
        best_effort(clipboard::set(text), self.strict, "clipboard write")
    }
}

/// ANSI 0-15 to native console attribute bits (R/G/B order differs).
fn native_attr(color: Color) -> Option<u16> {
    const MAP: [u16; 8] = [0, 4, 2, 6, 1, 5, 3, 7];
    match color {
        Color::Ansi(n) if n < 8 => Some(MAP[n as usize]),
        Color::Ansi(n) if n < 16 => Some(MAP[(n - 8) as usize] | 0x8),
        _ => None,
    }
}

const INPUT_BATCH: usize = 32;
const INPUT_WAIT_MS: u32 = 50;

fn input_loop(bus: &EventBus, cpr: CprSlot, vt_input: bool, treat_ctrl_c: bool, stop: &AtomicBool) {
    let Ok(handle) = stdin_handle() else {
        bus.complete();
        return;
    };
    let mut translator = Translator::new();
    let mut decoder = Decoder::with_cpr_slot(cpr);
    decoder.set_ctrl_c_signal(!treat_ctrl_c);
    let mut vt_chars = String::new();
    let mut surrogate: Option<u16> = None;

    while !stop.load(Ordering::Relaxed) {
        // SAFETY: handle is a console handle.
        match unsafe { WaitForSingleObject(handle, INPUT_WAIT_MS) } {
            WAIT_OBJECT_0 => {}
            WAIT_TIMEOUT => {
                let mut events = Vec::new();
                translator.flush(&mut events);
                if vt_input {
                    events.extend(decoder.feed("", true));
                }
                for event in events {
                    bus.publish(event);
                }
                continue;
            }
            _ => {
                bus.complete();
                return;
            }
        }

        // SAFETY: zeroed INPUT_RECORDs are valid out values.
        let mut records: [INPUT_RECORD; INPUT_BATCH] = unsafe { std::mem::zeroed() };
        let mut read: u32 = 0;
        // SAFETY: records points at INPUT_BATCH valid records.
        let ok = unsafe {
            ReadConsoleInputW(handle, records.as_mut_ptr(), INPUT_BATCH as u32, &mut read)
        };
        if ok == 0 {
            bus.complete();
            return;
        }

        let mut events = Vec::new();
        for record in &records[..read as usize] {
            match record.EventType {
                KEY_EVENT => {
                    // SAFETY: EventType says the union holds a key event.
                    let key = unsafe { record.Event.KeyEvent };
                    if vt_input {
                        if key.bKeyDown == 0 {
                            continue;
                        }
                        // SAFETY: uChar is a plain u16 union.
                        let unit = unsafe { key.uChar.UnicodeChar };
                        push_utf16_unit(&mut vt_chars, &mut surrogate, unit);
                    } else {
                        // SAFETY: uChar is a plain u16 union.
                        let unit = unsafe { key.uChar.UnicodeChar };
                        translator.key(
                            &KeyRecord {
                                key_down: key.bKeyDown != 0,
                                repeat: key.wRepeatCount,
                                virtual_key: key.wVirtualKeyCode,
                                unicode_char: unit,
                                control_state: key.dwControlKeyState,
                            },
                            &mut events,
                        );
                    }
                }
                MOUSE_EVENT => {
                    // SAFETY: EventType says the union holds a mouse event.
                    let mouse = unsafe { record.Event.MouseEvent };
                    translator.mouse(
                        &MouseRecord {
                            x: mouse.dwMousePosition.X,
                            y: mouse.dwMousePosition.Y,
                            button_state: mouse.dwButtonState,
                            control_state: mouse.dwControlKeyState,
                            event_flags: mouse.dwEventFlags,
                        },
                        &mut events,
                    );
                }
                WINDOW_BUFFER_SIZE_EVENT => {
                    // SAFETY: EventType says the union holds a size event.
                    let size = unsafe { record.Event.WindowBufferSizeEvent };
                    translator.resize(size.dwSize.X, size.dwSize.Y, &mut events);
                }
                _ => {}
            }
        }
        translator.flush(&mut events);
        if vt_input && !vt_chars.is_empty() {
            events.extend(decoder.feed(&vt_chars, false));
            vt_chars.clear();
        }
        for event in events {
            bus.publish(event);
        }
    }
}

fn push_utf16_unit(buf: &mut String, surrogate: &mut Option<u16>, unit: u16) {
    if unit == 0 {
        return;
    }
    if (0xD800..0xDC00).contains(&unit) {
        *surrogate = Some(unit);
        return;
    }
    if (0xDC00..0xE000).contains(&unit) {
        if let Some(high) = surrogate.take() {
            let combined =
                0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
            if let Some(ch) = char::from_u32(combined) {
                buf.push(ch);
            }
        }
        return;
    }
    *surrogate = None;
    if let Some(ch) = char::from_u32(u32::from(unit)) {
        buf.push(ch);
    }
}
