#![forbid(unsafe_code)]

//! Editor commands and key bindings.

use std::collections::HashMap;

use weft_core::event::{Key, KeyEvent, Modifiers};

/// Everything the line editor can be told to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Move to the start of the line.
    CursorHome,
    /// Move to the end of the line.
    CursorEnd,
    /// Move one grapheme left.
    CursorLeft,
    /// Move one grapheme right.
    CursorRight,
    /// Move to the previous word start.
    WordLeft,
    /// Move to the next word end.
    WordRight,
    /// Delete the grapheme before the cursor (or the selection).
    BackspaceChar,
    /// Delete back to the previous word start.
    BackspaceWord,
    /// Delete the grapheme under the cursor (or the selection).
    DeleteChar,
    /// Delete forward to the next word end.
    DeleteWord,
    /// Move the selection to the clipboard.
    CutSelection,
    /// Copy the selection to the clipboard.
    CopySelection,
    /// Insert clipboard text at the cursor.
    Paste,
    /// Finish the edit and return the line.
    Accept,
    /// Abort the edit.
    Cancel,
    /// Revert the last edit batch.
    Undo,
    /// Re-apply the last reverted edit batch.
    Redo,
    /// Replace the line with the previous history entry.
    HistoryPrev,
    /// Replace the line with the next history entry.
    HistoryNext,
    /// Enter (or continue) reverse-incremental history search.
    ReverseSearch,
    /// Erase the whole line.
    ClearLine,
    /// Consume the event without any effect.
    Ignore,
}

/// A key chord addressable from the binding map.
///
/// Character chords match on the produced character with Shift folded
/// away (the character already encodes it); special keys match on the
/// key and the full modifier set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    /// The decoded key.
    pub key: Key,
    /// The produced character for character chords.
    pub ch: Option<char>,
    /// Required modifiers.
    pub modifiers: Modifiers,
}

impl KeyCombo {
    /// A special-key chord.
    #[must_use]
    pub const fn key(key: Key, modifiers: Modifiers) -> Self {
        Self {
            key,
            ch: None,
            modifiers,
        }
    }

    /// A character chord, e.g. Ctrl+Z.
    #[must_use]
    pub const fn char(ch: char, modifiers: Modifiers) -> Self {
        Self {
            key: Key::Unknown,
            ch: Some(ch),
            modifiers,
        }
    }

    /// Normalize an incoming event into its chord form.
    ///
    /// Shift never participates in the lookup: for characters it is
    /// already folded into the produced char, and for motions it means
    /// "extend the selection", which the dispatcher applies on top of
    /// the resolved command.
    #[must_use]
    pub fn from_event(event: &KeyEvent) -> Self {
        match event.key {
            Key::Unknown => Self {
                key: Key::Unknown,
                ch: event.ch,
                modifiers: event.modifiers - Modifiers::SHIFT,
            },
            key => Self {
                key,
                ch: None,
                modifiers: event.modifiers - Modifiers::SHIFT,
            },
        }
    }
}

/// The binding table consulted before the defaults.
pub type KeyBindings = HashMap<KeyCombo, Command>;

/// The built-in bindings.
///
/// Shift on a cursor-motion chord extends the selection instead of
/// collapsing it; the dispatcher handles that, so motions are bound
/// without Shift here.
#[must_use]
pub fn default_bindings() -> KeyBindings {
    use Modifiers as M;

    let mut map = KeyBindings::new();
    map.insert(KeyCombo::key(Key::Enter, M::NONE), Command::Accept);
    map.insert(KeyCombo::key(Key::Home, M::NONE), Command::CursorHome);
    map.insert(KeyCombo::key(Key::End, M::NONE), Command::CursorEnd);
    map.insert(KeyCombo::key(Key::Left, M::NONE), Command::CursorLeft);
    map.insert(KeyCombo::key(Key::Right, M::NONE), Command::CursorRight);
    map.insert(KeyCombo::key(Key::Left, M::CTRL), Command::WordLeft);
    map.insert(KeyCombo::key(Key::Right, M::CTRL), Command::WordRight);
    map.insert(KeyCombo::key(Key::Backspace, M::NONE), Command::BackspaceChar);
    map.insert(KeyCombo::key(Key::Backspace, M::CTRL), Command::BackspaceWord);
    map.insert(KeyCombo::key(Key::Delete, M::NONE), Command::DeleteChar);
    map.insert(KeyCombo::key(Key::Delete, M::CTRL), Command::DeleteWord);
    map.insert(KeyCombo::key(Key::Up, M::NONE), Command::HistoryPrev);
    map.insert(KeyCombo::key(Key::Down, M::NONE), Command::HistoryNext);

    map.insert(KeyCombo::char('a', M::CTRL), Command::CursorHome);
    map.insert(KeyCombo::char('e', M::CTRL), Command::CursorEnd);
    map.insert(KeyCombo::char('w', M::CTRL), Command::BackspaceWord);
    map.insert(KeyCombo::char('u', M::CTRL), Command::ClearLine);
    map.insert(KeyCombo::char('x', M::CTRL), Command::CutSelection);
    map.insert(KeyCombo::char('v', M::CTRL), Command::Paste);
    map.insert(KeyCombo::char('z', M::CTRL), Command::Undo);
    map.insert(KeyCombo::char('y', M::CTRL), Command::Redo);
    map.insert(KeyCombo::char('r', M::CTRL), Command::ReverseSearch);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_normalization_strips_shift_from_chars() {
        let ev = KeyEvent::from_char('A').with_modifiers(Modifiers::SHIFT);
        assert_eq!(
            KeyCombo::from_event(&ev),
            KeyCombo::char('A', Modifiers::NONE)
        );
    }

    #[test]
    fn defaults_resolve_common_chords() {
        let map = default_bindings();
        let enter = KeyCombo::from_event(&KeyEvent::new(Key::Enter));
        assert_eq!(map.get(&enter), Some(&Command::Accept));
        let undo = KeyCombo::from_event(
            &KeyEvent::from_char('z').with_modifiers(Modifiers::CTRL),
        );
        assert_eq!(map.get(&undo), Some(&Command::Undo));
        let word_left = KeyCombo::from_event(
            &KeyEvent::new(Key::Left).with_modifiers(Modifiers::CTRL),
        );
        assert_eq!(map.get(&word_left), Some(&Command::WordLeft));
    }
}
