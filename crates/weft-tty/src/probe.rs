#![forbid(unsafe_code)]

//! Unix capability detection.
//!
//! The snapshot is built from three layers:
//!
//! 1. The terminfo database for `TERM` (honoring `TERMINFO`,
//!    `TERMINFO_DIRS` and `HOME` the way ncurses does): color count,
//!    alternate screen, cursor visibility, addressing, mouse, bell.
//! 2. Environment refinements: `COLORTERM=truecolor|24bit` upgrades the
//!    color level, `TERM_PROGRAM`/`WT_SESSION`/`VSCODE_PID` mark modern
//!    hosts whose terminfo entries undersell them, `NO_COLOR` downgrades
//!    when respected.
//! 3. Redirection checks: a non-tty stdout disables ANSI output unless
//!    forced; a non-tty stdin disables raw mode and input features.

use terminfo::{Database, capability};
use weft_backend::{TerminalOptions, effective_color_level};
use weft_core::caps::{Capabilities, ColorLevel};

/// Terminal hosts known to support every VT feature the core uses even
/// when their terminfo entry is conservative.
const MODERN_TERM_PROGRAMS: &[&str] = &[
    "iTerm.app",
    "WezTerm",
    "Alacritty",
    "Ghostty",
    "kitty",
    "vscode",
];

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn color_level_from_terminfo(db: &Database) -> ColorLevel {
    let max_colors = db.get::<capability::MaxColors>().map_or(0, |c| c.0);
    if max_colors >= 16_777_216 {
        ColorLevel::TrueColor
    } else if max_colors >= 256 {
        ColorLevel::Ansi256
    } else if max_colors >= 16 {
        ColorLevel::Ansi16
    } else {
        ColorLevel::None
    }
}

/// Snapshot capabilities for the current process environment.
#[must_use]
pub fn detect(opts: &TerminalOptions) -> Capabilities {
    let term = env("TERM").unwrap_or_default();
    let output_tty = rustix::termios::isatty(std::io::stdout());
    let input_tty = rustix::termios::isatty(std::io::stdin());

    let mut caps = Capabilities {
        terminal_name: if term.is_empty() {
            "unknown".to_owned()
        } else {
            term.clone()
        },
        output_redirected: !output_tty,
        input_redirected: !input_tty,
        ..Capabilities::default()
    };

    if term == "dumb" {
        caps.terminal_name = "dumb".to_owned();
        return caps;
    }

    caps.ansi = output_tty || opts.force_ansi;

    let database = Database::from_env().ok();
    let mut detected_color = ColorLevel::Ansi16;
    match &database {
        Some(db) => {
            detected_color = color_level_from_terminfo(db);
            caps.alternate_screen = db.get::<capability::EnterCaMode>().is_some();
            caps.cursor_visibility = db.get::<capability::CursorInvisible>().is_some()
                && db.get::<capability::CursorNormal>().is_some();
            caps.cursor_position_set = db.get::<capability::CursorAddress>().is_some();
            caps.beep = db.get::<capability::Bell>().is_some();
            caps.mouse = db.get::<capability::KeyMouse>().is_some();
        }
        None => {
            // No database: assume the xterm common denominator.
            caps.alternate_screen = true;
            caps.cursor_visibility = true;
            caps.cursor_position_set = true;
            caps.beep = true;
            caps.mouse = term.contains("xterm") || term.contains("screen");
        }
    }

    let term_program = env("TERM_PROGRAM").unwrap_or_default();
    let modern = MODERN_TERM_PROGRAMS.iter().any(|p| term_program == *p)
        || env("WT_SESSION").is_some()
        || env("VSCODE_PID").is_some()
        || term.contains("kitty")
        || term.contains("alacritty")
        || term.contains("wezterm")
        || term.contains("ghostty");
    if modern {
        detected_color = detected_color.max(ColorLevel::Ansi256);
        caps.alternate_screen = true;
        caps.cursor_visibility = true;
        caps.cursor_position_set = true;
        caps.mouse = true;
        caps.osc8_links = true;
    }

    if matches!(env("COLORTERM").as_deref(), Some("truecolor" | "24bit")) {
        detected_color = ColorLevel::TrueColor;
    }

    let no_color = opts.respect_no_color && env("NO_COLOR").is_some();
    caps.color_level = effective_color_level(detected_color, opts.preferred_color_level, no_color);

    // VT features that ride on the escape channel rather than terminfo.
    caps.private_modes = caps.ansi;
    caps.bracketed_paste = caps.ansi;
    caps.mouse = caps.mouse && caps.ansi;
    caps.alternate_screen = caps.alternate_screen && caps.ansi;
    caps.cursor_visibility = caps.cursor_visibility && caps.ansi;
    caps.cursor_position_set = caps.cursor_position_set && caps.ansi;
    caps.cursor_position_get = caps.ansi && input_tty;
    caps.title_set = caps.ansi
        && (term.contains("xterm")
            || term.contains("rxvt")
            || term.contains("screen")
            || term.contains("tmux")
            || modern);
    caps.raw_mode = input_tty;
    caps.window_size_get = output_tty || input_tty;
    caps.buffer_size_get = caps.window_size_get;
    caps.osc52_clipboard = opts.enable_osc52_clipboard && caps.ansi;

    let provider = crate::clipboard::detect();
    caps.clipboard_get = provider.is_some();
    caps.clipboard_set = provider.is_some() || caps.osc52_clipboard;

    tracing::debug!(
        term,
        term_program,
        color = ?caps.color_level,
        ansi = caps.ansi,
        mouse = caps.mouse,
        "detected terminal capabilities"
    );
    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    // Detection reads process-global environment, so tests stick to the
    // pure pieces.

    #[test]
    fn default_capabilities_are_all_off() {
        // detect() only turns features on after the dumb-terminal check,
        // so the default record is the dumb baseline.
        let caps = Capabilities::default();
        assert!(!caps.ansi);
        assert!(!caps.mouse);
        assert!(!caps.raw_mode);
    }

    #[test]
    fn modern_host_list_covers_the_common_programs() {
        assert!(MODERN_TERM_PROGRAMS.contains(&"WezTerm"));
        assert!(MODERN_TERM_PROGRAMS.contains(&"iTerm.app"));
        assert!(MODERN_TERM_PROGRAMS.contains(&"Ghostty"));
    }
}
