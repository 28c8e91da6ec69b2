#![forbid(unsafe_code)]

//! Canonical input event types.
//!
//! Every platform source (Unix VT bytes, Windows console records, the
//! in-memory backend) is translated into this one model before it reaches
//! the broadcaster, so consumers never see platform detail.
//!
//! # Design Notes
//!
//! - Mouse coordinates are 0-indexed; the 1-indexed wire form is converted
//!   at the decoder boundary.
//! - Shift is stripped from keys whose shiftness is already encoded in the
//!   produced character (printable text and Space), matching Unix terminal
//!   behavior so the two platforms agree.
//! - `Text` carries the aggregate printable run of one input batch; editor
//!   consumers that want per-keystroke granularity listen for the matching
//!   per-character `Key` events instead.

use bitflags::bitflags;

use crate::geometry::{TermPos, TermSize};

/// Canonical input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A keyboard event.
    Key(KeyEvent),

    /// A non-empty run of printable characters produced in one input batch.
    Text(String),

    /// A full bracketed-paste payload.
    Paste(String),

    /// A mouse event.
    Mouse(MouseEvent),

    /// Terminal was resized.
    Resize(TermSize),

    /// A console signal (Ctrl+C / Ctrl+Break) captured as an event.
    Signal(Signal),
}

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The decoded key.
    pub key: Key,

    /// The character this key produced, when it produced one.
    pub ch: Option<char>,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Create a new key event with no character and no modifiers.
    #[must_use]
    pub const fn new(key: Key) -> Self {
        Self {
            key,
            ch: None,
            modifiers: Modifiers::NONE,
        }
    }

    /// Create a key event for a produced character.
    #[must_use]
    pub const fn from_char(ch: char) -> Self {
        Self {
            key: Key::Unknown,
            ch: Some(ch),
            modifiers: Modifiers::NONE,
        }
    }

    /// Attach a produced character.
    #[must_use]
    pub const fn with_char(mut self, ch: char) -> Self {
        self.ch = Some(ch);
        self
    }

    /// Attach modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Check if this event carries a specific character.
    #[must_use]
    pub fn is_char(&self, ch: char) -> bool {
        self.ch == Some(ch)
    }

    /// Check if Ctrl is held.
    #[must_use]
    pub const fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    /// Check if Alt is held.
    #[must_use]
    pub const fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    /// Check if Shift is held.
    #[must_use]
    pub const fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }
}

/// Decoded keys.
///
/// Keys that only produce a character (letters, digits, punctuation)
/// arrive as [`Key::Unknown`] with [`KeyEvent::ch`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Enter/Return key.
    Enter,
    /// Escape key.
    Escape,
    /// Backspace key.
    Backspace,
    /// Tab key.
    Tab,
    /// Space bar.
    Space,
    /// Up arrow key.
    Up,
    /// Down arrow key.
    Down,
    /// Left arrow key.
    Left,
    /// Right arrow key.
    Right,
    /// Home key.
    Home,
    /// End key.
    End,
    /// Page Up key.
    PageUp,
    /// Page Down key.
    PageDown,
    /// Insert key.
    Insert,
    /// Delete key.
    Delete,
    /// Function key (F1-F12).
    F(u8),
    /// A key identified only by the character it produced.
    Unknown,
}

bitflags! {
    /// Modifier keys that can be held during a key or mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift key.
        const SHIFT = 0b0001;
        /// Control key.
        const CTRL  = 0b0010;
        /// Alt/Option key.
        const ALT   = 0b0100;
        /// Meta/Super/Command key.
        const META  = 0b1000;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// A mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// Cell the event happened in (0-indexed).
    pub pos: TermPos,

    /// The button involved, if any.
    pub button: MouseButton,

    /// The type of mouse event.
    pub kind: MouseEventKind,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,

    /// Wheel movement: positive scrolls up/away, negative scrolls down.
    /// Zero for non-wheel events.
    pub wheel_delta: i16,
}

impl MouseEvent {
    /// Create a new mouse event with no modifiers and no wheel movement.
    #[must_use]
    pub const fn new(kind: MouseEventKind, button: MouseButton, pos: TermPos) -> Self {
        Self {
            pos,
            button,
            kind,
            modifiers: Modifiers::NONE,
            wheel_delta: 0,
        }
    }

    /// Attach modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Attach a wheel delta.
    #[must_use]
    pub const fn with_wheel_delta(mut self, delta: i16) -> Self {
        self.wheel_delta = delta;
        self
    }
}

/// The type of mouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    /// A button was pressed.
    Down,
    /// A button was released.
    Up,
    /// The pointer moved with no button held.
    Move,
    /// The pointer moved while a button was held.
    Drag,
    /// The wheel was scrolled; see [`MouseEvent::wheel_delta`].
    Wheel,
}

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Middle mouse button (wheel click).
    Middle,
    /// Right mouse button.
    Right,
    /// No button (pointer motion, wheel).
    #[default]
    None,
}

/// Console signals deliverable as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Ctrl+C / SIGINT.
    Interrupt,
    /// Ctrl+Break (Windows console only).
    Break,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_event_builders_compose() {
        let ev = KeyEvent::new(Key::Right).with_modifiers(Modifiers::CTRL);
        assert_eq!(ev.key, Key::Right);
        assert!(ev.ctrl());
        assert!(!ev.alt());
        assert_eq!(ev.ch, None);
    }

    #[test]
    fn char_key_defaults_to_unknown() {
        let ev = KeyEvent::from_char('a');
        assert_eq!(ev.key, Key::Unknown);
        assert!(ev.is_char('a'));
        assert_eq!(ev.modifiers, Modifiers::NONE);
    }

    #[test]
    fn mouse_event_carries_zero_based_position() {
        let ev = MouseEvent::new(MouseEventKind::Down, MouseButton::Left, TermPos::new(9, 4));
        assert_eq!(ev.pos.col, 9);
        assert_eq!(ev.pos.row, 4);
        assert_eq!(ev.wheel_delta, 0);
    }
}
