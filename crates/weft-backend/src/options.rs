#![forbid(unsafe_code)]

//! Terminal and input-loop options.

use weft_core::caps::ColorLevel;

/// Windows VT input negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowsVtInput {
    /// Probe the console; use VT input when the mode sticks.
    #[default]
    Auto,
    /// Force VT input decoding.
    Enabled,
    /// Never use VT input; translate raw console records.
    Disabled,
}

/// Options accepted by `initialize`/`open`.
///
/// The record is plain data; backends snapshot what they need at init.
#[derive(Debug, Clone)]
pub struct TerminalOptions {
    /// Set stdio encodings to UTF-8 (without BOM) where possible.
    pub prefer_utf8_output: bool,
    /// Emit 7-bit ESC forms instead of 8-bit C1 introducers.
    pub prefer_7bit_c1: bool,
    /// Assume ANSI output even when output is redirected.
    pub force_ansi: bool,
    /// Fail on unsupported operations instead of no-oping.
    pub strict_mode: bool,
    /// Cap the detected color level.
    pub preferred_color_level: Option<ColorLevel>,
    /// Honor the `NO_COLOR` environment variable.
    pub respect_no_color: bool,
    /// Use OSC 52 as a clipboard-set fallback.
    pub enable_osc52_clipboard: bool,
    /// Windows VT input negotiation.
    pub windows_vt_input: WindowsVtInput,
    /// Start the input loop automatically on the first event read.
    pub implicit_start_input: bool,
    /// Deliver Ctrl+C as a key event instead of a `Signal`.
    pub treat_control_c_as_input: bool,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            prefer_utf8_output: true,
            prefer_7bit_c1: true,
            force_ansi: false,
            strict_mode: false,
            preferred_color_level: None,
            respect_no_color: true,
            enable_osc52_clipboard: false,
            windows_vt_input: WindowsVtInput::Auto,
            implicit_start_input: true,
            treat_control_c_as_input: false,
        }
    }
}

impl TerminalOptions {
    /// The per-loop slice of these options.
    #[must_use]
    pub fn input_options(&self) -> InputOptions {
        InputOptions {
            treat_control_c_as_input: self.treat_control_c_as_input,
        }
    }
}

/// Options for a backend input loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputOptions {
    /// Deliver Ctrl+C as a key event instead of a `Signal`.
    pub treat_control_c_as_input: bool,
}
