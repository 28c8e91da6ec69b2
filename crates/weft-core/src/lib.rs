#![forbid(unsafe_code)]

//! Core: event model, VT input decoding, cell-width arithmetic, and
//! event fan-out.
//!
//! Everything platform-neutral lives here; the platform backends and the
//! terminal facade build on these types.

pub mod ansi;
pub mod broadcast;
pub mod caps;
pub mod cell;
pub mod decoder;
pub mod error;
pub mod event;
pub mod geometry;

pub use broadcast::{EventBus, EventReader, EventStream, SubscriptionHandle};
pub use caps::{Capabilities, ColorLevel};
pub use decoder::{CprSlot, Decoder};
pub use error::{Error, Result};
pub use event::{Event, Key, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseEventKind, Signal};
pub use geometry::{TermPos, TermSize};
