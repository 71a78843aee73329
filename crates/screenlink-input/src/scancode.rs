//! The canonical scancode table.
//!
//! Scancodes use the PC set-1 make codes; `0xE0`-prefixed extended codes
//! carry the prefix in the high byte (`0xE04B` is extended left-arrow).
//! Capture translates native codes through this table on the way in and
//! injection translates back on the way out, so a key captured on one OS
//! injects the same canonical key on another.

use screenlink_types::KeyCode;

/// Mask marking an `0xE0`-prefixed extended scancode.
pub const EXTENDED_MASK: u32 = 0xE000;

/// The full scancode <-> [`KeyCode`] mapping. One entry per mapped key;
/// both lookup directions scan this table.
pub const TABLE: &[(u32, KeyCode)] = &[
    // Main block, set-1 order
    (0x01, KeyCode::Escape),
    (0x02, KeyCode::Digit1),
    (0x03, KeyCode::Digit2),
    (0x04, KeyCode::Digit3),
    (0x05, KeyCode::Digit4),
    (0x06, KeyCode::Digit5),
    (0x07, KeyCode::Digit6),
    (0x08, KeyCode::Digit7),
    (0x09, KeyCode::Digit8),
    (0x0A, KeyCode::Digit9),
    (0x0B, KeyCode::Digit0),
    (0x0C, KeyCode::Minus),
    (0x0D, KeyCode::Equal),
    (0x0E, KeyCode::Backspace),
    (0x0F, KeyCode::Tab),
    (0x10, KeyCode::KeyQ),
    (0x11, KeyCode::KeyW),
    (0x12, KeyCode::KeyE),
    (0x13, KeyCode::KeyR),
    (0x14, KeyCode::KeyT),
    (0x15, KeyCode::KeyY),
    (0x16, KeyCode::KeyU),
    (0x17, KeyCode::KeyI),
    (0x18, KeyCode::KeyO),
    (0x19, KeyCode::KeyP),
    (0x1A, KeyCode::BracketLeft),
    (0x1B, KeyCode::BracketRight),
    (0x1C, KeyCode::Enter),
    (0x1D, KeyCode::LeftCtrl),
    (0x1E, KeyCode::KeyA),
    (0x1F, KeyCode::KeyS),
    (0x20, KeyCode::KeyD),
    (0x21, KeyCode::KeyF),
    (0x22, KeyCode::KeyG),
    (0x23, KeyCode::KeyH),
    (0x24, KeyCode::KeyJ),
    (0x25, KeyCode::KeyK),
    (0x26, KeyCode::KeyL),
    (0x27, KeyCode::Semicolon),
    (0x28, KeyCode::Quote),
    (0x29, KeyCode::Backquote),
    (0x2A, KeyCode::LeftShift),
    (0x2B, KeyCode::Backslash),
    (0x2C, KeyCode::KeyZ),
    (0x2D, KeyCode::KeyX),
    (0x2E, KeyCode::KeyC),
    (0x2F, KeyCode::KeyV),
    (0x30, KeyCode::KeyB),
    (0x31, KeyCode::KeyN),
    (0x32, KeyCode::KeyM),
    (0x33, KeyCode::Comma),
    (0x34, KeyCode::Period),
    (0x35, KeyCode::Slash),
    (0x36, KeyCode::RightShift),
    (0x37, KeyCode::NumpadMultiply),
    (0x38, KeyCode::LeftAlt),
    (0x39, KeyCode::Space),
    (0x3A, KeyCode::CapsLock),
    (0x3B, KeyCode::F1),
    (0x3C, KeyCode::F2),
    (0x3D, KeyCode::F3),
    (0x3E, KeyCode::F4),
    (0x3F, KeyCode::F5),
    (0x40, KeyCode::F6),
    (0x41, KeyCode::F7),
    (0x42, KeyCode::F8),
    (0x43, KeyCode::F9),
    (0x44, KeyCode::F10),
    (0x45, KeyCode::NumLock),
    (0x46, KeyCode::ScrollLock),
    (0x47, KeyCode::Numpad7),
    (0x48, KeyCode::Numpad8),
    (0x49, KeyCode::Numpad9),
    (0x4A, KeyCode::NumpadSubtract),
    (0x4B, KeyCode::Numpad4),
    (0x4C, KeyCode::Numpad5),
    (0x4D, KeyCode::Numpad6),
    (0x4E, KeyCode::NumpadAdd),
    (0x4F, KeyCode::Numpad1),
    (0x50, KeyCode::Numpad2),
    (0x51, KeyCode::Numpad3),
    (0x52, KeyCode::Numpad0),
    (0x53, KeyCode::NumpadDecimal),
    (0x57, KeyCode::F11),
    (0x58, KeyCode::F12),
    // Extended block (0xE0 prefix in the high byte)
    (0xE01C, KeyCode::NumpadEnter),
    (0xE01D, KeyCode::RightCtrl),
    (0xE035, KeyCode::NumpadDivide),
    (0xE037, KeyCode::PrintScreen),
    (0xE038, KeyCode::RightAlt),
    (0xE047, KeyCode::Home),
    (0xE048, KeyCode::ArrowUp),
    (0xE049, KeyCode::PageUp),
    (0xE04B, KeyCode::ArrowLeft),
    (0xE04D, KeyCode::ArrowRight),
    (0xE04F, KeyCode::End),
    (0xE050, KeyCode::ArrowDown),
    (0xE051, KeyCode::PageDown),
    (0xE052, KeyCode::Insert),
    (0xE053, KeyCode::Delete),
    (0xE05B, KeyCode::LeftGui),
    (0xE05C, KeyCode::RightGui),
    (0xE05D, KeyCode::Menu),
    // Pause uses the E1-prefixed make code.
    (0xE11D, KeyCode::Pause),
];

/// Translate a scancode to the canonical key. Unmapped codes become
/// [`KeyCode::Unknown`] so nothing is silently dropped.
#[must_use]
pub fn to_keycode(scancode: u32) -> KeyCode {
    TABLE
        .iter()
        .find(|(sc, _)| *sc == scancode)
        .map_or(KeyCode::Unknown(scancode), |(_, key)| *key)
}

/// Translate a canonical key back to its scancode. Returns 0 for keys with
/// no scancode representation.
#[must_use]
pub fn from_keycode(key: KeyCode) -> u32 {
    if let KeyCode::Unknown(scancode) = key {
        return scancode;
    }
    TABLE
        .iter()
        .find(|(_, kc)| *kc == key)
        .map_or(0, |(sc, _)| *sc)
}

/// Whether a scancode carries an extended-key prefix.
#[must_use]
pub fn is_extended(scancode: u32) -> bool {
    scancode & EXTENDED_MASK != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mapped_scancode_roundtrips() {
        for (scancode, key) in TABLE {
            assert_eq!(to_keycode(*scancode), *key, "scancode {scancode:#06x}");
            assert_eq!(from_keycode(*key), *scancode, "key {key:?}");
        }
    }

    #[test]
    fn unknown_scancode_roundtrips_through_fallback() {
        let key = to_keycode(0x7F00);
        assert_eq!(key, KeyCode::Unknown(0x7F00));
        assert_eq!(from_keycode(key), 0x7F00);
    }

    #[test]
    fn table_has_no_duplicate_entries() {
        for (i, (sc, kc)) in TABLE.iter().enumerate() {
            for (other_sc, other_kc) in &TABLE[i + 1..] {
                assert_ne!(sc, other_sc, "duplicate scancode {sc:#06x}");
                assert_ne!(kc, other_kc, "duplicate key {kc:?}");
            }
        }
    }

    #[test]
    fn extended_detection() {
        assert!(is_extended(0xE04B));
        assert!(is_extended(0xE11D));
        assert!(!is_extended(0x1C));
        assert!(!is_extended(0x2A));
    }
}
