//! Windows console backend.
//!
//! Translates `ReadConsoleInputW` records into the canonical event model
//! (optionally routing characters through the shared VT decoder when
//! `ENABLE_VIRTUAL_TERMINAL_INPUT` is available), manages console modes
//! with saved-state restore, and provides the Win32 clipboard.
//!
//! The record-translation rules live in [`records`] and compile on every
//! platform so their tests run everywhere; the Win32 surface itself is
//! `cfg(windows)`.

pub mod records;

#[cfg(windows)]
mod clipboard;
#[cfg(windows)]
mod console;

#[cfg(windows)]
pub use console::WindowsBackend;
