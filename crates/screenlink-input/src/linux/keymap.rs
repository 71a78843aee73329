//! Translation between evdev codes and the canonical vocabulary.
//!
//! evdev key numbers are not PC scancodes; this table bridges evdev to
//! [`KeyCode`], and the shared scancode table handles the rest.

use evdev::KeyCode as EvdevKey;
use screenlink_types::{KeyCode, MouseButton};

/// evdev key <-> canonical key, one entry per mapped key.
const KEY_TABLE: &[(EvdevKey, KeyCode)] = &[
    (EvdevKey::KEY_A, KeyCode::KeyA),
    (EvdevKey::KEY_B, KeyCode::KeyB),
    (EvdevKey::KEY_C, KeyCode::KeyC),
    (EvdevKey::KEY_D, KeyCode::KeyD),
    (EvdevKey::KEY_E, KeyCode::KeyE),
    (EvdevKey::KEY_F, KeyCode::KeyF),
    (EvdevKey::KEY_G, KeyCode::KeyG),
    (EvdevKey::KEY_H, KeyCode::KeyH),
    (EvdevKey::KEY_I, KeyCode::KeyI),
    (EvdevKey::KEY_J, KeyCode::KeyJ),
    (EvdevKey::KEY_K, KeyCode::KeyK),
    (EvdevKey::KEY_L, KeyCode::KeyL),
    (EvdevKey::KEY_M, KeyCode::KeyM),
    (EvdevKey::KEY_N, KeyCode::KeyN),
    (EvdevKey::KEY_O, KeyCode::KeyO),
    (EvdevKey::KEY_P, KeyCode::KeyP),
    (EvdevKey::KEY_Q, KeyCode::KeyQ),
    (EvdevKey::KEY_R, KeyCode::KeyR),
    (EvdevKey::KEY_S, KeyCode::KeyS),
    (EvdevKey::KEY_T, KeyCode::KeyT),
    (EvdevKey::KEY_U, KeyCode::KeyU),
    (EvdevKey::KEY_V, KeyCode::KeyV),
    (EvdevKey::KEY_W, KeyCode::KeyW),
    (EvdevKey::KEY_X, KeyCode::KeyX),
    (EvdevKey::KEY_Y, KeyCode::KeyY),
    (EvdevKey::KEY_Z, KeyCode::KeyZ),
    (EvdevKey::KEY_0, KeyCode::Digit0),
    (EvdevKey::KEY_1, KeyCode::Digit1),
    (EvdevKey::KEY_2, KeyCode::Digit2),
    (EvdevKey::KEY_3, KeyCode::Digit3),
    (EvdevKey::KEY_4, KeyCode::Digit4),
    (EvdevKey::KEY_5, KeyCode::Digit5),
    (EvdevKey::KEY_6, KeyCode::Digit6),
    (EvdevKey::KEY_7, KeyCode::Digit7),
    (EvdevKey::KEY_8, KeyCode::Digit8),
    (EvdevKey::KEY_9, KeyCode::Digit9),
    (EvdevKey::KEY_F1, KeyCode::F1),
    (EvdevKey::KEY_F2, KeyCode::F2),
    (EvdevKey::KEY_F3, KeyCode::F3),
    (EvdevKey::KEY_F4, KeyCode::F4),
    (EvdevKey::KEY_F5, KeyCode::F5),
    (EvdevKey::KEY_F6, KeyCode::F6),
    (EvdevKey::KEY_F7, KeyCode::F7),
    (EvdevKey::KEY_F8, KeyCode::F8),
    (EvdevKey::KEY_F9, KeyCode::F9),
    (EvdevKey::KEY_F10, KeyCode::F10),
    (EvdevKey::KEY_F11, KeyCode::F11),
    (EvdevKey::KEY_F12, KeyCode::F12),
    (EvdevKey::KEY_LEFTSHIFT, KeyCode::LeftShift),
    (EvdevKey::KEY_RIGHTSHIFT, KeyCode::RightShift),
    (EvdevKey::KEY_LEFTCTRL, KeyCode::LeftCtrl),
    (EvdevKey::KEY_RIGHTCTRL, KeyCode::RightCtrl),
    (EvdevKey::KEY_LEFTALT, KeyCode::LeftAlt),
    (EvdevKey::KEY_RIGHTALT, KeyCode::RightAlt),
    (EvdevKey::KEY_LEFTMETA, KeyCode::LeftGui),
    (EvdevKey::KEY_RIGHTMETA, KeyCode::RightGui),
    (EvdevKey::KEY_ENTER, KeyCode::Enter),
    (EvdevKey::KEY_ESC, KeyCode::Escape),
    (EvdevKey::KEY_BACKSPACE, KeyCode::Backspace),
    (EvdevKey::KEY_TAB, KeyCode::Tab),
    (EvdevKey::KEY_SPACE, KeyCode::Space),
    (EvdevKey::KEY_CAPSLOCK, KeyCode::CapsLock),
    (EvdevKey::KEY_SYSRQ, KeyCode::PrintScreen),
    (EvdevKey::KEY_SCROLLLOCK, KeyCode::ScrollLock),
    (EvdevKey::KEY_PAUSE, KeyCode::Pause),
    (EvdevKey::KEY_INSERT, KeyCode::Insert),
    (EvdevKey::KEY_DELETE, KeyCode::Delete),
    (EvdevKey::KEY_HOME, KeyCode::Home),
    (EvdevKey::KEY_END, KeyCode::End),
    (EvdevKey::KEY_PAGEUP, KeyCode::PageUp),
    (EvdevKey::KEY_PAGEDOWN, KeyCode::PageDown),
    (EvdevKey::KEY_UP, KeyCode::ArrowUp),
    (EvdevKey::KEY_DOWN, KeyCode::ArrowDown),
    (EvdevKey::KEY_LEFT, KeyCode::ArrowLeft),
    (EvdevKey::KEY_RIGHT, KeyCode::ArrowRight),
    (EvdevKey::KEY_COMPOSE, KeyCode::Menu),
    (EvdevKey::KEY_MINUS, KeyCode::Minus),
    (EvdevKey::KEY_EQUAL, KeyCode::Equal),
    (EvdevKey::KEY_LEFTBRACE, KeyCode::BracketLeft),
    (EvdevKey::KEY_RIGHTBRACE, KeyCode::BracketRight),
    (EvdevKey::KEY_BACKSLASH, KeyCode::Backslash),
    (EvdevKey::KEY_SEMICOLON, KeyCode::Semicolon),
    (EvdevKey::KEY_APOSTROPHE, KeyCode::Quote),
    (EvdevKey::KEY_GRAVE, KeyCode::Backquote),
    (EvdevKey::KEY_COMMA, KeyCode::Comma),
    (EvdevKey::KEY_DOT, KeyCode::Period),
    (EvdevKey::KEY_SLASH, KeyCode::Slash),
    (EvdevKey::KEY_NUMLOCK, KeyCode::NumLock),
    (EvdevKey::KEY_KPSLASH, KeyCode::NumpadDivide),
    (EvdevKey::KEY_KPASTERISK, KeyCode::NumpadMultiply),
    (EvdevKey::KEY_KPMINUS, KeyCode::NumpadSubtract),
    (EvdevKey::KEY_KPPLUS, KeyCode::NumpadAdd),
    (EvdevKey::KEY_KPENTER, KeyCode::NumpadEnter),
    (EvdevKey::KEY_KP0, KeyCode::Numpad0),
    (EvdevKey::KEY_KP1, KeyCode::Numpad1),
    (EvdevKey::KEY_KP2, KeyCode::Numpad2),
    (EvdevKey::KEY_KP3, KeyCode::Numpad3),
    (EvdevKey::KEY_KP4, KeyCode::Numpad4),
    (EvdevKey::KEY_KP5, KeyCode::Numpad5),
    (EvdevKey::KEY_KP6, KeyCode::Numpad6),
    (EvdevKey::KEY_KP7, KeyCode::Numpad7),
    (EvdevKey::KEY_KP8, KeyCode::Numpad8),
    (EvdevKey::KEY_KP9, KeyCode::Numpad9),
    (EvdevKey::KEY_KPDOT, KeyCode::NumpadDecimal),
];

/// Translate an evdev key to the canonical key.
#[must_use]
pub fn key_to_canonical(key: EvdevKey) -> KeyCode {
    KEY_TABLE
        .iter()
        .find(|(ek, _)| *ek == key)
        .map_or(KeyCode::Unknown(u32::from(key.0)), |(_, kc)| *kc)
}

/// Translate a canonical key to its evdev key.
#[must_use]
pub fn canonical_to_key(code: KeyCode) -> EvdevKey {
    if let KeyCode::Unknown(raw) = code {
        #[allow(clippy::cast_possible_truncation)]
        return EvdevKey(raw as u16);
    }
    KEY_TABLE
        .iter()
        .find(|(_, kc)| *kc == code)
        .map_or(EvdevKey::KEY_RESERVED, |(ek, _)| *ek)
}

/// Mouse button for an evdev key, if it is one.
#[must_use]
pub fn button_from_key(key: EvdevKey) -> Option<MouseButton> {
    match key {
        EvdevKey::BTN_LEFT => Some(MouseButton::Left),
        EvdevKey::BTN_RIGHT => Some(MouseButton::Right),
        EvdevKey::BTN_MIDDLE => Some(MouseButton::Middle),
        EvdevKey::BTN_SIDE => Some(MouseButton::X1),
        EvdevKey::BTN_EXTRA => Some(MouseButton::X2),
        _ => None,
    }
}

/// evdev key for a mouse button.
#[must_use]
pub fn button_to_key(button: MouseButton) -> EvdevKey {
    match button {
        MouseButton::Left => EvdevKey::BTN_LEFT,
        MouseButton::Right => EvdevKey::BTN_RIGHT,
        MouseButton::Middle => EvdevKey::BTN_MIDDLE,
        MouseButton::X1 => EvdevKey::BTN_SIDE,
        MouseButton::X2 => EvdevKey::BTN_EXTRA,
    }
}
