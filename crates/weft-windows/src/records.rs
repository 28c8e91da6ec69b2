#![forbid(unsafe_code)]

//! Console input-record translation.
//!
//! Converts Windows console input records into canonical events. The
//! record shapes are mirrored here as plain structs so the translation
//! rules (modifier suppression, button diffing, text batching, surrogate
//! pairing) stay platform-neutral and testable everywhere; the Windows
//! layer copies `INPUT_RECORD` fields across verbatim.
//!
//! # Parity rules
//!
//! - Standalone modifier presses (Shift/Ctrl/Alt, left/right variants)
//!   are suppressed so the event stream matches Unix terminals, which
//!   never see them.
//! - Printable characters aggregate into one `Text` event per record
//!   batch, with per-character key events alongside, exactly like the VT
//!   decoder.
//! - Shift is stripped from printable characters and Space.
//! - Button down vs up comes from diffing the previous and current
//!   button masks; motion with a held button becomes a drag; the wheel
//!   delta is the signed high word normalized to notches.

use weft_core::event::{Event, Key, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseEventKind};
use weft_core::geometry::{TermPos, TermSize};

// Virtual-key codes used by the translation (WinUser.h values).
const VK_BACK: u16 = 0x08;
const VK_TAB: u16 = 0x09;
const VK_RETURN: u16 = 0x0D;
const VK_SHIFT: u16 = 0x10;
const VK_CONTROL: u16 = 0x11;
const VK_MENU: u16 = 0x12;
const VK_CAPITAL: u16 = 0x14;
const VK_ESCAPE: u16 = 0x1B;
const VK_SPACE: u16 = 0x20;
const VK_PRIOR: u16 = 0x21;
const VK_NEXT: u16 = 0x22;
const VK_END: u16 = 0x23;
const VK_HOME: u16 = 0x24;
const VK_LEFT: u16 = 0x25;
const VK_UP: u16 = 0x26;
const VK_RIGHT: u16 = 0x27;
const VK_DOWN: u16 = 0x28;
const VK_INSERT: u16 = 0x2D;
const VK_DELETE: u16 = 0x2E;
const VK_LWIN: u16 = 0x5B;
const VK_RWIN: u16 = 0x5C;
const VK_F1: u16 = 0x70;
const VK_F12: u16 = 0x7B;
const VK_NUMLOCK: u16 = 0x90;
const VK_SCROLL: u16 = 0x91;

// dwControlKeyState bits.
const RIGHT_ALT_PRESSED: u32 = 0x0001;
const LEFT_ALT_PRESSED: u32 = 0x0002;
const RIGHT_CTRL_PRESSED: u32 = 0x0004;
const LEFT_CTRL_PRESSED: u32 = 0x0008;
const SHIFT_PRESSED: u32 = 0x0010;

// dwButtonState bits.
const FROM_LEFT_1ST_BUTTON: u32 = 0x0001;
const RIGHTMOST_BUTTON: u32 = 0x0002;
const FROM_LEFT_2ND_BUTTON: u32 = 0x0004;

// dwEventFlags values.
const DOUBLE_CLICK: u32 = 0x0002;
const MOUSE_MOVED: u32 = 0x0001;
const MOUSE_WHEELED: u32 = 0x0004;
const MOUSE_HWHEELED: u32 = 0x0008;

/// One wheel notch in `dwButtonState` high-word units.
const WHEEL_NOTCH: i32 = 120;

/// Mirror of `KEY_EVENT_RECORD`.
#[derive(Debug, Clone, Copy)]
pub struct KeyRecord {
    /// Key press (true) or release (false).
    pub key_down: bool,
    /// Repeat count; the event is replicated this many times.
    pub repeat: u16,
    /// Virtual-key code.
    pub virtual_key: u16,
    /// UTF-16 unit produced, zero when none.
    pub unicode_char: u16,
    /// Modifier/toggle key state.
    pub control_state: u32,
}

/// Mirror of `MOUSE_EVENT_RECORD`.
#[derive(Debug, Clone, Copy)]
pub struct MouseRecord {
    /// Buffer cell coordinates (already 0-based).
    pub x: i16,
    /// Buffer cell coordinates (already 0-based).
    pub y: i16,
    /// Button mask; wheel delta in the high word for wheel flags.
    pub button_state: u32,
    /// Modifier key state.
    pub control_state: u32,
    /// Event flags (moved/wheeled/double-click).
    pub event_flags: u32,
}

fn modifiers_from(state: u32) -> Modifiers {
    let mut mods = Modifiers::NONE;
    if state & SHIFT_PRESSED != 0 {
        mods |= Modifiers::SHIFT;
    }
    if state & (LEFT_CTRL_PRESSED | RIGHT_CTRL_PRESSED) != 0 {
        mods |= Modifiers::CTRL;
    }
    if state & (LEFT_ALT_PRESSED | RIGHT_ALT_PRESSED) != 0 {
        mods |= Modifiers::ALT;
    }
    mods
}

fn special_key(vk: u16) -> Option<Key> {
    match vk {
        VK_BACK => Some(Key::Backspace),
        VK_TAB => Some(Key::Tab),
        VK_RETURN => Some(Key::Enter),
        VK_ESCAPE => Some(Key::Escape),
        VK_PRIOR => Some(Key::PageUp),
        VK_NEXT => Some(Key::PageDown),
        VK_END => Some(Key::End),
        VK_HOME => Some(Key::Home),
        VK_LEFT => Some(Key::Left),
        VK_UP => Some(Key::Up),
        VK_RIGHT => Some(Key::Right),
        VK_DOWN => Some(Key::Down),
        VK_INSERT => Some(Key::Insert),
        VK_DELETE => Some(Key::Delete),
        _ if (VK_F1..=VK_F12).contains(&vk) => Some(Key::F((vk - VK_F1 + 1) as u8)),
        _ => None,
    }
}

fn is_modifier_only(vk: u16) -> bool {
    matches!(
        vk,
        VK_SHIFT | VK_CONTROL | VK_MENU | VK_LWIN | VK_RWIN | VK_CAPITAL | VK_NUMLOCK | VK_SCROLL
    )
}

/// Stateful record translator.
///
/// Feed one batch of records, then [`flush`](Self::flush) to publish the
/// aggregated text run the same way the VT decoder does.
#[derive(Debug, Default)]
pub struct Translator {
    prev_buttons: u32,
    pending_surrogate: Option<u16>,
    run: String,
    run_keys: Vec<KeyEvent>,
}

impl Translator {
    /// Create a translator with no held buttons.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one key record.
    pub fn key(&mut self, rec: &KeyRecord, out: &mut Vec<Event>) {
        if !rec.key_down || is_modifier_only(rec.virtual_key) {
            return;
        }
        let repeat = rec.repeat.max(1);
        let mods = modifiers_from(rec.control_state);

        if let Some(key) = special_key(rec.virtual_key) {
            self.flush(out);
            for _ in 0..repeat {
                out.push(Event::Key(KeyEvent::new(key).with_modifiers(mods)));
            }
            return;
        }

        let Some(ch) = self.decode_unit(rec.unicode_char) else {
            return;
        };

        if mods.contains(Modifiers::CTRL) || mods.contains(Modifiers::ALT) {
            self.flush(out);
            // Ctrl combinations arrive with a control byte in uChar; map
            // back to the letter via the virtual key.
            let ch = if ch < ' ' && rec.virtual_key >= b'A'.into() && rec.virtual_key <= b'Z'.into()
            {
                (rec.virtual_key as u8).to_ascii_lowercase() as char
            } else {
                ch
            };
            for _ in 0..repeat {
                out.push(Event::Key(KeyEvent::from_char(ch).with_modifiers(mods)));
            }
            return;
        }

        if ch.is_control() {
            return;
        }
        for _ in 0..repeat {
            self.run.push(ch);
            let key = if rec.virtual_key == VK_SPACE {
                KeyEvent::new(Key::Space).with_char(ch)
            } else {
                KeyEvent::from_char(ch)
            };
            // Shift is implied by the produced character.
            self.run_keys.push(key);
        }
    }

    /// Translate one mouse record.
    pub fn mouse(&mut self, rec: &MouseRecord, out: &mut Vec<Event>) {
        self.flush(out);
        let pos = TermPos::new(rec.x.max(0) as u16, rec.y.max(0) as u16);
        let mods = modifiers_from(rec.control_state);
        let buttons = rec.button_state & 0xFFFF;

        match rec.event_flags {
            MOUSE_WHEELED | MOUSE_HWHEELED => {
                let delta = (((rec.button_state >> 16) as u16 as i16 as i32) / WHEEL_NOTCH) as i16;
                out.push(Event::Mouse(
                    MouseEvent::new(MouseEventKind::Wheel, MouseButton::None, pos)
                        .with_modifiers(mods)
                        .with_wheel_delta(delta),
                ));
            }
            MOUSE_MOVED => {
                let kind = if buttons == 0 {
                    MouseEventKind::Move
                } else {
                    MouseEventKind::Drag
                };
                out.push(Event::Mouse(
                    MouseEvent::new(kind, held_button(buttons), pos).with_modifiers(mods),
                ));
            }
            // Plain press/release (and double click, reported as another
            // press): diff the masks.
            _ => {
                let pressed = buttons & !self.prev_buttons;
                let released = self.prev_buttons & !buttons;
                for (bit, button) in [
                    (FROM_LEFT_1ST_BUTTON, MouseButton::Left),
                    (RIGHTMOST_BUTTON, MouseButton::Right),
                    (FROM_LEFT_2ND_BUTTON, MouseButton::Middle),
                ] {
                    if pressed & bit != 0 {
                        out.push(Event::Mouse(
                            MouseEvent::new(MouseEventKind::Down, button, pos)
                                .with_modifiers(mods),
                        ));
                    }
                    if released & bit != 0 {
                        out.push(Event::Mouse(
                            MouseEvent::new(MouseEventKind::Up, button, pos).with_modifiers(mods),
                        ));
                    }
                }
            }
        }
        if rec.event_flags != MOUSE_WHEELED && rec.event_flags != MOUSE_HWHEELED {
            self.prev_buttons = buttons;
        }
    }

    /// Translate a buffer-size record.
    pub fn resize(&mut self, cols: i16, rows: i16, out: &mut Vec<Event>) {
        self.flush(out);
        out.push(Event::Resize(TermSize::new(
            cols.max(0) as u16,
            rows.max(0) as u16,
        )));
    }

    /// Publish the pending text run: aggregate `Text`, then per-char keys.
    pub fn flush(&mut self, out: &mut Vec<Event>) {
        if self.run.is_empty() {
            return;
        }
        out.push(Event::Text(std::mem::take(&mut self.run)));
        out.extend(self.run_keys.drain(..).map(Event::Key));
    }

    /// Combine a UTF-16 unit into a char, pairing surrogates.
    fn decode_unit(&mut self, unit: u16) -> Option<char> {
        if unit == 0 {
            return None;
        }
        if (0xD800..0xDC00).contains(&unit) {
            self.pending_surrogate = Some(unit);
            return None;
        }
        if (0xDC00..0xE000).contains(&unit) {
            let high = self.pending_surrogate.take()?;
            let combined =
                0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
            return char::from_u32(combined);
        }
        self.pending_surrogate = None;
        char::from_u32(u32::from(unit))
    }
}

fn held_button(buttons: u32) -> MouseButton {
    if buttons & FROM_LEFT_1ST_BUTTON != 0 {
        MouseButton::Left
    } else if buttons & RIGHTMOST_BUTTON != 0 {
        MouseButton::Right
    } else if buttons & FROM_LEFT_2ND_BUTTON != 0 {
        MouseButton::Middle
    } else {
        MouseButton::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_rec(vk: u16, ch: char, state: u32) -> KeyRecord {
        KeyRecord {
            key_down: true,
            repeat: 1,
            virtual_key: vk,
            unicode_char: ch as u16,
            control_state: state,
        }
    }

    #[test]
    fn printable_batch_aggregates_text() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.key(&key_rec(b'H'.into(), 'h', 0), &mut out);
        t.key(&key_rec(b'I'.into(), 'i', 0), &mut out);
        t.flush(&mut out);
        assert_eq!(out[0], Event::Text("hi".into()));
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn standalone_modifiers_are_suppressed() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.key(&key_rec(VK_SHIFT, '\0', SHIFT_PRESSED), &mut out);
        t.key(&key_rec(VK_CONTROL, '\0', LEFT_CTRL_PRESSED), &mut out);
        t.flush(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn shift_is_stripped_from_printable() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.key(&key_rec(b'A'.into(), 'A', SHIFT_PRESSED), &mut out);
        t.flush(&mut out);
        let Event::Key(key) = out[1] else {
            panic!("expected key");
        };
        assert!(key.is_char('A'));
        assert!(!key.shift());
    }

    #[test]
    fn key_release_is_ignored() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.key(
            &KeyRecord {
                key_down: false,
                ..key_rec(b'A'.into(), 'a', 0)
            },
            &mut out,
        );
        t.flush(&mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn ctrl_letter_maps_back_through_virtual_key() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.key(&key_rec(b'C'.into(), '\x03', LEFT_CTRL_PRESSED), &mut out);
        let Event::Key(key) = out[0] else {
            panic!("expected key");
        };
        assert!(key.is_char('c'));
        assert!(key.ctrl());
    }

    #[test]
    fn arrow_with_modifiers() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.key(&key_rec(VK_RIGHT, '\0', LEFT_CTRL_PRESSED), &mut out);
        assert_eq!(
            out,
            vec![Event::Key(
                KeyEvent::new(Key::Right).with_modifiers(Modifiers::CTRL)
            )]
        );
    }

    #[test]
    fn repeat_count_replicates() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.key(
            &KeyRecord {
                repeat: 3,
                ..key_rec(b'X'.into(), 'x', 0)
            },
            &mut out,
        );
        t.flush(&mut out);
        assert_eq!(out[0], Event::Text("xxx".into()));
    }

    #[test]
    fn surrogate_pair_combines() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        // U+1F600 as a surrogate pair.
        t.key(
            &KeyRecord {
                key_down: true,
                repeat: 1,
                virtual_key: 0,
                unicode_char: 0xD83D,
                control_state: 0,
            },
            &mut out,
        );
        t.key(
            &KeyRecord {
                key_down: true,
                repeat: 1,
                virtual_key: 0,
                unicode_char: 0xDE00,
                control_state: 0,
            },
            &mut out,
        );
        t.flush(&mut out);
        assert_eq!(out[0], Event::Text("😀".into()));
    }

    fn mouse_rec(x: i16, y: i16, buttons: u32, flags: u32) -> MouseRecord {
        MouseRecord {
            x,
            y,
            button_state: buttons,
            control_state: 0,
            event_flags: flags,
        }
    }

    #[test]
    fn button_diffing_yields_down_then_up() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.mouse(&mouse_rec(9, 4, FROM_LEFT_1ST_BUTTON, 0), &mut out);
        t.mouse(&mouse_rec(9, 4, 0, 0), &mut out);
        let Event::Mouse(down) = out[0] else {
            panic!("expected mouse");
        };
        assert_eq!(down.kind, MouseEventKind::Down);
        assert_eq!(down.button, MouseButton::Left);
        assert_eq!(down.pos, TermPos::new(9, 4));
        let Event::Mouse(up) = out[1] else {
            panic!("expected mouse");
        };
        assert_eq!(up.kind, MouseEventKind::Up);
    }

    #[test]
    fn move_with_held_button_is_drag() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.mouse(&mouse_rec(1, 1, FROM_LEFT_1ST_BUTTON, 0), &mut out);
        t.mouse(
            &mouse_rec(2, 1, FROM_LEFT_1ST_BUTTON, MOUSE_MOVED),
            &mut out,
        );
        t.mouse(&mouse_rec(3, 1, 0, 0), &mut out);
        t.mouse(&mouse_rec(4, 1, 0, MOUSE_MOVED), &mut out);
        let kinds: Vec<MouseEventKind> = out
            .iter()
            .map(|e| match e {
                Event::Mouse(m) => m.kind,
                other => panic!("expected mouse, got {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                MouseEventKind::Down,
                MouseEventKind::Drag,
                MouseEventKind::Up,
                MouseEventKind::Move,
            ]
        );
    }

    #[test]
    fn wheel_uses_signed_high_word() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.mouse(&mouse_rec(0, 0, 120u32 << 16, MOUSE_WHEELED), &mut out);
        t.mouse(
            &mouse_rec(0, 0, u32::from(-240i16 as u16) << 16, MOUSE_WHEELED),
            &mut out,
        );
        let Event::Mouse(up) = out[0] else {
            panic!("expected mouse");
        };
        assert_eq!(up.wheel_delta, 1);
        let Event::Mouse(down) = out[1] else {
            panic!("expected mouse");
        };
        assert_eq!(down.wheel_delta, -2);
    }

    #[test]
    fn resize_record_publishes_resize() {
        let mut t = Translator::new();
        let mut out = Vec::new();
        t.resize(120, 40, &mut out);
        assert_eq!(out, vec![Event::Resize(TermSize::new(120, 40))]);
    }
}
