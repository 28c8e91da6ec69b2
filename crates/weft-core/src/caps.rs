#![forbid(unsafe_code)]

//! Terminal capability snapshot.
//!
//! Backends probe their environment once at initialization and freeze the
//! result in a [`Capabilities`] value. The facade consults the snapshot to
//! decide whether an operation is a real state change, a silent no-op, or
//! (in strict mode) an error. Capability predicates are monotone for the
//! lifetime of a backend: nothing flips after init.

/// Color depth the terminal is believed to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ColorLevel {
    /// No color at all.
    #[default]
    None,
    /// The classic 16 ANSI colors.
    Ansi16,
    /// 256-color indexed palette.
    Ansi256,
    /// 24-bit RGB.
    TrueColor,
}

/// Immutable capability record snapshotted at backend init.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// ANSI escape sequences are interpreted by the output device.
    pub ansi: bool,
    /// Color depth.
    pub color_level: ColorLevel,
    /// OSC 8 hyperlinks.
    pub osc8_links: bool,
    /// Alternate screen buffer (DEC mode 1049).
    pub alternate_screen: bool,
    /// Cursor show/hide (DEC mode 25).
    pub cursor_visibility: bool,
    /// Mouse reporting.
    pub mouse: bool,
    /// Bracketed paste (DEC mode 2004).
    pub bracketed_paste: bool,
    /// DEC private mode set/reset in general.
    pub private_modes: bool,
    /// Raw/cbreak input modes.
    pub raw_mode: bool,
    /// Cursor position can be queried.
    pub cursor_position_get: bool,
    /// Cursor position can be set.
    pub cursor_position_set: bool,
    /// Clipboard reads.
    pub clipboard_get: bool,
    /// Clipboard writes.
    pub clipboard_set: bool,
    /// OSC 52 clipboard-set fallback.
    pub osc52_clipboard: bool,
    /// Window title can be read back.
    pub title_get: bool,
    /// Window title can be set.
    pub title_set: bool,
    /// Window size can be queried.
    pub window_size_get: bool,
    /// Window size can be changed.
    pub window_size_set: bool,
    /// Scrollback buffer size can be queried.
    pub buffer_size_get: bool,
    /// Scrollback buffer size can be changed.
    pub buffer_size_set: bool,
    /// Audible bell.
    pub beep: bool,
    /// Stdout does not point at a terminal.
    pub output_redirected: bool,
    /// Stdin does not point at a terminal.
    pub input_redirected: bool,
    /// Best-effort terminal name (`TERM` on Unix, console class on Windows).
    pub terminal_name: String,
}

impl Capabilities {
    /// A terminal that can do nothing beyond plain text.
    #[must_use]
    pub fn dumb() -> Self {
        Self {
            terminal_name: "dumb".to_owned(),
            ..Self::default()
        }
    }

    /// A fully capable VT-style terminal, the common modern case.
    #[must_use]
    pub fn vt_full(terminal_name: impl Into<String>) -> Self {
        Self {
            ansi: true,
            color_level: ColorLevel::TrueColor,
            osc8_links: true,
            alternate_screen: true,
            cursor_visibility: true,
            mouse: true,
            bracketed_paste: true,
            private_modes: true,
            raw_mode: true,
            cursor_position_get: true,
            cursor_position_set: true,
            clipboard_get: false,
            clipboard_set: false,
            osc52_clipboard: true,
            title_get: false,
            title_set: true,
            window_size_get: true,
            window_size_set: false,
            buffer_size_get: true,
            buffer_size_set: false,
            beep: true,
            output_redirected: false,
            input_redirected: false,
            terminal_name: terminal_name.into(),
        }
    }

    /// ANSI-but-headless profile used on CI hosts: sequences are emitted
    /// for capture, interactive features are off.
    #[must_use]
    pub fn ci() -> Self {
        Self {
            ansi: true,
            color_level: ColorLevel::Ansi16,
            cursor_position_set: true,
            output_redirected: true,
            input_redirected: true,
            terminal_name: "ci".to_owned(),
            ..Self::default()
        }
    }

    /// Cap the color level at `max`.
    #[must_use]
    pub fn with_color_cap(mut self, max: ColorLevel) -> Self {
        if self.color_level > max {
            self.color_level = max;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_levels_are_ordered() {
        assert!(ColorLevel::None < ColorLevel::Ansi16);
        assert!(ColorLevel::Ansi16 < ColorLevel::Ansi256);
        assert!(ColorLevel::Ansi256 < ColorLevel::TrueColor);
    }

    #[test]
    fn color_cap_only_lowers() {
        let caps = Capabilities::vt_full("xterm").with_color_cap(ColorLevel::Ansi256);
        assert_eq!(caps.color_level, ColorLevel::Ansi256);
        let caps = Capabilities::dumb().with_color_cap(ColorLevel::TrueColor);
        assert_eq!(caps.color_level, ColorLevel::None);
    }

    #[test]
    fn dumb_terminal_has_nothing() {
        let caps = Capabilities::dumb();
        assert!(!caps.ansi);
        assert!(!caps.raw_mode);
        assert_eq!(caps.terminal_name, "dumb");
    }
}
