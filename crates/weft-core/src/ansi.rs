#![forbid(unsafe_code)]

//! ANSI sequence emission.
//!
//! A thin, allocation-free writer for the escape sequences the core
//! emits. Styling/markup rendering is deliberately out of scope; this
//! covers cursor movement, erasing, DEC private modes, and the OSC
//! commands the backends and the line editor need.
//!
//! # Sequences Emitted
//!
//! | Feature            | Sequence                      |
//! |--------------------|-------------------------------|
//! | Cursor move        | `CUP`, `CUU/CUD/CUF/CUB`      |
//! | Erase              | `EL 2`, `ED 2`, `ED 3`        |
//! | Mouse reporting    | `CSI ? 1000/1002/1003/1006 h/l` |
//! | Bracketed paste    | `CSI ? 2004 h/l`              |
//! | Alternate screen   | `CSI ? 1049 h/l`              |
//! | Cursor visibility  | `CSI ? 25 h/l`                |
//! | Title              | `OSC 0`                       |
//! | Hyperlink          | `OSC 8`                       |
//! | Clipboard set      | `OSC 52`                      |
//! | Position query     | `CSI 6 n`                     |

use std::fmt::{self, Write};

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::geometry::TermPos;

/// DEC private mode numbers used by the core.
pub mod private_mode {
    /// Basic mouse click reporting.
    pub const MOUSE_CLICKS: u16 = 1000;
    /// Click + drag reporting.
    pub const MOUSE_DRAG: u16 = 1002;
    /// All-motion reporting.
    pub const MOUSE_MOVE: u16 = 1003;
    /// SGR extended mouse coordinates.
    pub const MOUSE_SGR: u16 = 1006;
    /// Bracketed paste.
    pub const BRACKETED_PASTE: u16 = 2004;
    /// Alternate screen buffer.
    pub const ALTERNATE_SCREEN: u16 = 1049;
    /// Cursor visibility.
    pub const CURSOR_VISIBLE: u16 = 25;
}

/// Buffered ANSI sequence writer over any [`fmt::Write`] sink.
///
/// Defaults to 7-bit ESC forms; 8-bit C1 introducers are available for
/// hosts that prefer them.
#[derive(Debug)]
pub struct AnsiWriter<W> {
    sink: W,
    seven_bit: bool,
}

impl<W: Write> AnsiWriter<W> {
    /// Wrap a sink, emitting 7-bit ESC forms.
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            seven_bit: true,
        }
    }

    /// Use 8-bit C1 introducers instead of 7-bit ESC forms.
    #[must_use]
    pub fn with_8bit_c1(mut self) -> Self {
        self.seven_bit = false;
        self
    }

    /// Unwrap the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn csi(&mut self) -> fmt::Result {
        if self.seven_bit {
            self.sink.write_str("\x1b[")
        } else {
            self.sink.write_char('\u{9b}')
        }
    }

    fn osc(&mut self) -> fmt::Result {
        if self.seven_bit {
            self.sink.write_str("\x1b]")
        } else {
            self.sink.write_char('\u{9d}')
        }
    }

    fn st(&mut self) -> fmt::Result {
        if self.seven_bit {
            self.sink.write_str("\x1b\\")
        } else {
            self.sink.write_char('\u{9c}')
        }
    }

    /// Pass plain text through untouched.
    pub fn text(&mut self, s: &str) -> fmt::Result {
        self.sink.write_str(s)
    }

    /// `CUP`: move to an absolute position (0-based input).
    pub fn cursor_to(&mut self, pos: TermPos) -> fmt::Result {
        let (col, row) = pos.to_wire();
        self.csi()?;
        write!(self.sink, "{row};{col}H")
    }

    /// `CUU`: cursor up.
    pub fn cursor_up(&mut self, n: u16) -> fmt::Result {
        if n > 0 {
            self.csi()?;
            write!(self.sink, "{n}A")?;
        }
        Ok(())
    }

    /// `CUD`: cursor down.
    pub fn cursor_down(&mut self, n: u16) -> fmt::Result {
        if n > 0 {
            self.csi()?;
            write!(self.sink, "{n}B")?;
        }
        Ok(())
    }

    /// `CUF`: cursor forward.
    pub fn cursor_forward(&mut self, n: u16) -> fmt::Result {
        if n > 0 {
            self.csi()?;
            write!(self.sink, "{n}C")?;
        }
        Ok(())
    }

    /// `CUB`: cursor back.
    pub fn cursor_back(&mut self, n: u16) -> fmt::Result {
        if n > 0 {
            self.csi()?;
            write!(self.sink, "{n}D")?;
        }
        Ok(())
    }

    /// Move to column 0 of the current row.
    pub fn carriage_return(&mut self) -> fmt::Result {
        self.sink.write_char('\r')
    }

    /// `EL 2`: erase the whole current line.
    pub fn erase_line(&mut self) -> fmt::Result {
        self.csi()?;
        self.sink.write_str("2K")
    }

    /// `ED 2`: erase the whole screen.
    pub fn erase_display(&mut self) -> fmt::Result {
        self.csi()?;
        self.sink.write_str("2J")
    }

    /// `ED 3`: erase the scrollback buffer.
    pub fn erase_scrollback(&mut self) -> fmt::Result {
        self.csi()?;
        self.sink.write_str("3J")
    }

    /// Set or reset a DEC private mode.
    pub fn private_mode(&mut self, mode: u16, enable: bool) -> fmt::Result {
        self.csi()?;
        write!(self.sink, "?{mode}{}", if enable { 'h' } else { 'l' })
    }

    /// Enter or leave the alternate screen.
    pub fn alternate_screen(&mut self, enter: bool) -> fmt::Result {
        self.private_mode(private_mode::ALTERNATE_SCREEN, enter)
    }

    /// Show or hide the cursor.
    pub fn cursor_visible(&mut self, visible: bool) -> fmt::Result {
        self.private_mode(private_mode::CURSOR_VISIBLE, visible)
    }

    /// `SGR 0`: reset styling.
    pub fn sgr_reset(&mut self) -> fmt::Result {
        self.csi()?;
        self.sink.write_str("0m")
    }

    /// `CSI 6 n`: request a cursor-position report.
    pub fn query_cursor_position(&mut self) -> fmt::Result {
        self.csi()?;
        self.sink.write_str("6n")
    }

    /// BEL.
    pub fn bell(&mut self) -> fmt::Result {
        self.sink.write_char('\x07')
    }

    /// `OSC 0`: set icon name and window title.
    pub fn set_title(&mut self, title: &str) -> fmt::Result {
        self.osc()?;
        write!(self.sink, "0;{title}")?;
        self.st()
    }

    /// `OSC 8`: wrap `text` in a hyperlink to `url`.
    pub fn hyperlink(&mut self, url: &str, text: &str) -> fmt::Result {
        self.osc()?;
        write!(self.sink, "8;;{url}")?;
        self.st()?;
        self.sink.write_str(text)?;
        self.osc()?;
        self.sink.write_str("8;;")?;
        self.st()
    }

    /// `OSC 52`: set the system clipboard through the terminal.
    pub fn set_clipboard(&mut self, text: &str) -> fmt::Result {
        self.osc()?;
        self.sink.write_str("52;c;")?;
        self.sink.write_str(&STANDARD.encode(text.as_bytes()))?;
        self.st()
    }
}

impl<W: Write> Write for AnsiWriter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.sink.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(f: impl FnOnce(&mut AnsiWriter<&mut String>)) -> String {
        let mut buf = String::new();
        let mut w = AnsiWriter::new(&mut buf);
        f(&mut w);
        buf
    }

    #[test]
    fn cursor_to_is_one_based_on_the_wire() {
        let out = collect(|w| w.cursor_to(TermPos::new(0, 0)).unwrap());
        assert_eq!(out, "\x1b[1;1H");
        let out = collect(|w| w.cursor_to(TermPos::new(9, 4)).unwrap());
        assert_eq!(out, "\x1b[5;10H");
    }

    #[test]
    fn zero_length_moves_emit_nothing() {
        let out = collect(|w| w.cursor_forward(0).unwrap());
        assert!(out.is_empty());
    }

    #[test]
    fn private_modes() {
        let out = collect(|w| {
            w.alternate_screen(true).unwrap();
            w.alternate_screen(false).unwrap();
        });
        assert_eq!(out, "\x1b[?1049h\x1b[?1049l");
    }

    #[test]
    fn title_uses_osc_with_st() {
        let out = collect(|w| w.set_title("hi").unwrap());
        assert_eq!(out, "\x1b]0;hi\x1b\\");
    }

    #[test]
    fn eight_bit_c1_introducers() {
        let mut buf = String::new();
        let mut w = AnsiWriter::new(&mut buf).with_8bit_c1();
        w.erase_line().unwrap();
        assert_eq!(buf, "\u{9b}2K");
    }

    #[test]
    fn osc52_payload_is_base64() {
        let out = collect(|w| w.set_clipboard("hi").unwrap());
        assert_eq!(out, "\x1b]52;c;aGk=\x1b\\");
        let out = collect(|w| w.set_clipboard("foo").unwrap());
        assert_eq!(out, "\x1b]52;c;Zm9v\x1b\\");
    }
}
