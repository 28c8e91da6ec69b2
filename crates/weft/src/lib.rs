#![forbid(unsafe_code)]

//! Weft public facade crate.
//!
//! # Role in Weft
//! This crate is the user-facing entry point: the terminal facade with
//! its scope factories and serialized writers, plus the interactive
//! line editor. It re-exports the commonly used types from the internal
//! crates so application code does not need to wire each crate
//! individually.
//!
//! # How it fits in the system
//! - Event model, decoding, and fan-out: provided by `weft-core`
//! - Backend contract and the in-memory backend: `weft-backend`
//! - Platform backends: `weft-tty` (Unix) and `weft-windows`
//! - This crate ties them together for application authors.
//!
//! If you only depend on one crate in your application, it should be
//! `weft`.

pub mod readline;
pub mod scope;
pub mod terminal;
pub mod writer;

pub use scope::Scope;
pub use terminal::{Session, Terminal, init, terminal};
pub use writer::SyncWriter;

// --- Core re-exports -------------------------------------------------------

pub use weft_core::ansi::AnsiWriter;
pub use weft_core::broadcast::{EventBus, EventReader, EventStream, SubscriptionHandle};
pub use weft_core::caps::{Capabilities, ColorLevel};
pub use weft_core::error::{Error, Result};
pub use weft_core::event::{
    Event, Key, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseEventKind, Signal,
};
pub use weft_core::geometry::{TermPos, TermSize};

// --- Backend re-exports ----------------------------------------------------

pub use weft_backend::{
    Backend, ClearKind, Color, InputOptions, MemoryBackend, MouseMode, RawMode, SharedSink,
    TerminalOptions, WindowsVtInput,
};

// --- ReadLine re-exports ---------------------------------------------------

pub use readline::{History, LineState, ReadLineOptions};

/// A lightweight prelude for day-to-day use.
pub mod prelude {
    pub use crate::readline::ReadLineOptions;
    pub use crate::terminal::{Terminal, terminal};
    pub use crate::{
        ClearKind, Color, Event, Key, KeyEvent, Modifiers, MouseMode, RawMode, TermPos, TermSize,
        TerminalOptions,
    };
}
