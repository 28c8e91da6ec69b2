#![forbid(unsafe_code)]

//! Termios mode management.
//!
//! The original termios is saved exactly once (on the first transition
//! away from it) and every later change is computed from that snapshot,
//! so stacked transitions cannot compound. [`ModeState::apply`] is the
//! single writer: it derives the effective termios from the desired
//! layers (input loop active, raw-mode scope, echo override) and sets it
//! in one `tcsetattr` call.
//!
//! Layering, strongest first:
//!
//! | Layer              | Effect                                        |
//! |--------------------|-----------------------------------------------|
//! | Raw scope          | `cfmakeraw`                                   |
//! | CBreak scope       | cbreak flags below                            |
//! | Input loop running | cbreak flags below                            |
//! | (none)             | the saved original                            |
//!
//! Cbreak clears ICANON, ECHO and IEXTEN (plus ISIG when Ctrl+C is
//! treated as input), clears ICRNL and IXON so Enter yields `\r` and
//! Ctrl+S/Q reach the application, and sets VMIN=1 VTIME=0.

use std::fs::File;
use std::io;

use nix::sys::termios::{
    self, InputFlags, LocalFlags, SetArg, SpecialCharacterIndices, Termios,
};
use weft_backend::RawMode;
use weft_core::error::Result;

/// Apply cbreak flags to a termios derived from the saved original.
pub fn make_cbreak(termios: &mut Termios, ctrl_c_as_input: bool) {
    termios
        .local_flags
        .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::IEXTEN);
    if ctrl_c_as_input {
        termios.local_flags.remove(LocalFlags::ISIG);
    }
    termios
        .input_flags
        .remove(InputFlags::ICRNL | InputFlags::IXON);
    termios.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    termios.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
}

/// Saved termios plus the desired mode layers.
#[derive(Debug, Default)]
pub struct ModeState {
    /// Controlling terminal handle used for all termios calls.
    tty: Option<File>,
    /// The pre-library termios, captured once.
    original: Option<Termios>,
    /// Active raw-mode scope, if any.
    pub scope_mode: Option<RawMode>,
    /// The input loop needs at least cbreak while running.
    pub input_active: bool,
    /// Ctrl+C flows through as a byte instead of raising SIGINT.
    pub ctrl_c_as_input: bool,
    /// Echo override from the input-echo scope.
    pub echo_override: Option<bool>,
}

impl ModeState {
    /// Capture the original termios if not already saved.
    ///
    /// Opens `/dev/tty` so the handle stays valid even when stdio is
    /// redirected later.
    pub fn ensure_saved(&mut self) -> Result<()> {
        if self.original.is_some() {
            return Ok(());
        }
        let tty = File::open("/dev/tty")?;
        let original = termios::tcgetattr(&tty).map_err(io::Error::other)?;
        self.tty = Some(tty);
        self.original = Some(original);
        tracing::debug!("saved original termios");
        Ok(())
    }

    /// Recompute and set the effective termios for the current layers.
    pub fn apply(&self) -> Result<()> {
        let (Some(tty), Some(original)) = (&self.tty, &self.original) else {
            return Ok(());
        };
        let mut target = original.clone();
        match (self.scope_mode, self.input_active) {
            (Some(RawMode::Raw), _) => termios::cfmakeraw(&mut target),
            (Some(RawMode::CBreak), _) | (None, true) => {
                make_cbreak(&mut target, self.ctrl_c_as_input);
            }
            (None, false) => {}
        }
        if let Some(echo) = self.echo_override {
            target.local_flags.set(LocalFlags::ECHO, echo);
        }
        termios::tcsetattr(tty, SetArg::TCSANOW, &target).map_err(io::Error::other)?;
        Ok(())
    }

    /// Restore the saved original termios unconditionally.
    pub fn restore_original(&self) -> Result<()> {
        if let (Some(tty), Some(original)) = (&self.tty, &self.original) {
            termios::tcsetattr(tty, SetArg::TCSAFLUSH, original).map_err(io::Error::other)?;
        }
        Ok(())
    }

    /// Run `f` with a temporary cbreak applied on top of whatever is
    /// active, restoring the previous effective mode afterwards.
    ///
    /// This is the direct cursor-query path used while the input loop is
    /// stopped; it deliberately bypasses the scope ref-counter. Nesting
    /// under an outer raw scope is safe because the recomputation in
    /// [`apply`](Self::apply) reinstates that scope's termios on exit.
    pub fn with_temporary_cbreak<T>(&self, f: impl FnOnce(&File) -> Result<T>) -> Result<T> {
        let (Some(tty), Some(original)) = (&self.tty, &self.original) else {
            return Err(io::Error::other("terminal modes not initialized").into());
        };
        let mut target = original.clone();
        make_cbreak(&mut target, self.ctrl_c_as_input);
        termios::tcsetattr(tty, SetArg::TCSANOW, &target).map_err(io::Error::other)?;
        let result = f(tty);
        self.apply()?;
        result
    }

    /// The controlling terminal handle, once saved.
    #[must_use]
    pub fn tty(&self) -> Option<&File> {
        self.tty.as_ref()
    }
}
