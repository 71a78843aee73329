//! Shared types for screenlink.
//!
//! This crate contains the types every screenlink crate agrees on: canonical
//! input events and key codes, virtual screen geometry and layout entries,
//! and the message union exchanged on the in-process bus and over the wire.

pub mod event;
pub mod message;
pub mod screen;

pub use event::{ButtonState, KeyCode, KeyState, Modifiers, MouseButton};
pub use message::{
    AppMode, AppStatus, Message, MessageType, ScreenOp, ServiceOp, SwitchOp, APP_NAME,
    COMPATIBLE_VERSIONS, PROTOCOL_VERSION,
};
pub use screen::{Edge, Point, Rect, VirtualScreenConfig, VirtualScreenInfo};
