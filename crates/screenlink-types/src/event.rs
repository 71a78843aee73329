//! Canonical input event vocabulary.
//!
//! Key codes and modifier state are platform-agnostic; the input backends
//! translate native scancodes to and from these values so that a key
//! captured on one OS injects a semantically identical key on another.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Key press/release state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum KeyState {
    Down,
    Up,
}

/// Mouse button state.
///
/// `Click` replays a full press/release pair; the accompanying click count
/// says how many pairs to synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum ButtonState {
    Down,
    Up,
    Click,
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

/// Keyboard modifier bitset.
///
/// Left/right variants are tracked separately where the OS reports them;
/// the lock bits mirror the keyboard LED state at capture time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const LSHIFT: Modifiers = Modifiers(1 << 0);
    pub const RSHIFT: Modifiers = Modifiers(1 << 1);
    pub const LCTRL: Modifiers = Modifiers(1 << 2);
    pub const RCTRL: Modifiers = Modifiers(1 << 3);
    pub const LALT: Modifiers = Modifiers(1 << 4);
    pub const RALT: Modifiers = Modifiers(1 << 5);
    pub const LGUI: Modifiers = Modifiers(1 << 6);
    pub const RGUI: Modifiers = Modifiers(1 << 7);
    pub const CAPS_LOCK: Modifiers = Modifiers(1 << 8);
    pub const NUM_LOCK: Modifiers = Modifiers(1 << 9);
    pub const SCROLL_LOCK: Modifiers = Modifiers(1 << 10);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Either shift key.
    #[must_use]
    pub const fn shift(self) -> bool {
        self.0 & (Self::LSHIFT.0 | Self::RSHIFT.0) != 0
    }

    /// Either control key.
    #[must_use]
    pub const fn ctrl(self) -> bool {
        self.0 & (Self::LCTRL.0 | Self::RCTRL.0) != 0
    }

    /// Either alt key.
    #[must_use]
    pub const fn alt(self) -> bool {
        self.0 & (Self::LALT.0 | Self::RALT.0) != 0
    }
}

/// Canonical keyboard key code.
///
/// A USB-HID-flavored subset shared by capture and injection. The scancode
/// table in the input crate is the only place that maps these to native
/// codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum KeyCode {
    // Letters
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF,
    KeyG,
    KeyH,
    KeyI,
    KeyJ,
    KeyK,
    KeyL,
    KeyM,
    KeyN,
    KeyO,
    KeyP,
    KeyQ,
    KeyR,
    KeyS,
    KeyT,
    KeyU,
    KeyV,
    KeyW,
    KeyX,
    KeyY,
    KeyZ,

    // Top-row digits
    Digit0,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Digit8,
    Digit9,

    // Function keys
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,

    // Modifiers
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
    LeftGui,
    RightGui,

    // Editing and navigation
    Enter,
    Escape,
    Backspace,
    Tab,
    Space,
    CapsLock,
    PrintScreen,
    ScrollLock,
    Pause,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Menu,

    // Punctuation
    Minus,
    Equal,
    BracketLeft,
    BracketRight,
    Backslash,
    Semicolon,
    Quote,
    Backquote,
    Comma,
    Period,
    Slash,

    // Numpad
    NumLock,
    NumpadDivide,
    NumpadMultiply,
    NumpadSubtract,
    NumpadAdd,
    NumpadEnter,
    Numpad0,
    Numpad1,
    Numpad2,
    Numpad3,
    Numpad4,
    Numpad5,
    Numpad6,
    Numpad7,
    Numpad8,
    Numpad9,
    NumpadDecimal,

    /// Fallback for unmapped keys; carries the raw platform scancode.
    Unknown(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_insert_remove() {
        let mut mods = Modifiers::empty();
        mods.insert(Modifiers::LSHIFT);
        mods.insert(Modifiers::RCTRL);
        assert!(mods.shift());
        assert!(mods.ctrl());
        assert!(!mods.alt());
        mods.remove(Modifiers::LSHIFT);
        assert!(!mods.shift());
        assert!(mods.contains(Modifiers::RCTRL));
    }

    #[test]
    fn modifier_union_preserves_both_sides() {
        let mods = Modifiers::LALT.union(Modifiers::CAPS_LOCK);
        assert!(mods.alt());
        assert!(mods.contains(Modifiers::CAPS_LOCK));
        assert!(!mods.contains(Modifiers::NUM_LOCK));
    }

    #[test]
    fn unknown_keycode_roundtrip() {
        let key = KeyCode::Unknown(0xE05B);
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(key, config).unwrap();
        let (decoded, _): (KeyCode, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(key, decoded);
    }
}
