//! The message union carried on the in-process bus and over the wire.
//!
//! Every event in the system is one [`Message`]. A subset of variants
//! travels between peers as length-prefixed bincode frames; the rest are
//! in-process control traffic. [`MessageType`] is the flat registry id used
//! for bus subscriptions and proto-typed command dispatch; bincode's enum
//! tag makes the wire representation identical on both ends.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::event::{ButtonState, KeyCode, KeyState, Modifiers, MouseButton};
use crate::screen::{Edge, VirtualScreenConfig, VirtualScreenInfo};

/// Application name sent in the handshake.
pub const APP_NAME: &str = "screenlink";

/// Protocol version sent in the handshake.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Versions a server accepts from connecting clients.
pub const COMPATIBLE_VERSIONS: &[&str] = &[PROTOCOL_VERSION];

/// Start/stop/restart request for the server or client endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum ServiceOp {
    Start,
    Stop,
    Restart,
}

/// Start/stop toggle for capture and injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum SwitchOp {
    Start,
    Stop,
}

/// Layout mutation requests, also postable by typed RPC clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum ScreenOp {
    /// Create or move a screen's placement in the shared plane.
    Set { name: String, x: i32, y: i32 },
    /// Forget a screen's placement.
    Remove { name: String },
    /// Render the online table and configured layout as text.
    Show,
}

/// Whether an endpoint is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum AppStatus {
    Started,
    Stopped,
}

/// Which role an endpoint status refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum AppMode {
    Server,
    Client,
}

/// A typed screenlink event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum Message {
    // -- wire: client -> server, in handshake order --
    /// First message on a new connection.
    Hello { name: String, version: String },
    /// Second message: the connecting machine's display.
    ScreenInfo(VirtualScreenInfo),

    // -- wire: server -> client --
    /// Absolute cursor position on the focused screen. The only
    /// absolute-coordinate motion that crosses the wire.
    MouseMotionAbsolute {
        x: i32,
        y: i32,
        is_absolute: bool,
        timestamp: u64,
    },
    MouseButton {
        state: ButtonState,
        button: MouseButton,
        clicks: u8,
        timestamp: u64,
    },
    MouseWheel { x: f32, y: f32, timestamp: u64 },
    Keyboard {
        state: KeyState,
        key: KeyCode,
        modifiers: Modifiers,
        timestamp: u64,
    },

    // -- capture-local --
    /// Relative cursor motion reported by exclusive capture.
    MouseMotion {
        x: i32,
        y: i32,
        is_absolute: bool,
        timestamp: u64,
    },
    /// The physical cursor touched the outer ring of the local screen.
    Border { edge: Edge, x: i32, y: i32 },

    // -- in-process control --
    ServerControl {
        op: ServiceOp,
        address: String,
        port: u16,
    },
    ClientControl {
        op: ServiceOp,
        address: String,
        port: u16,
    },
    CaptureControl(SwitchOp),
    InjectorControl(SwitchOp),
    /// Grow the transport's forwarded-type set.
    SendSubscribe(Vec<MessageType>),
    /// Shrink the transport's forwarded-type set.
    SendUnsubscribe(Vec<MessageType>),
    VirtualScreenControl(ScreenOp),
    FocusScreenChanged {
        name: String,
        peer: String,
        old_name: String,
        old_peer: String,
        screen_id: u32,
        old_screen_id: u32,
    },
    ClientConnected {
        peer: String,
        info: VirtualScreenInfo,
    },
    ClientDisconnected { peer: String, reason: String },
    AppStatusChanged { status: AppStatus, mode: AppMode },
    /// Server-side wrapper for a message received from a peer.
    ClientMessage { peer: String, msg: Box<Message> },
}

/// Registry id of a [`Message`] variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub enum MessageType {
    Hello,
    ScreenInfo,
    MouseMotionAbsolute,
    MouseButton,
    MouseWheel,
    Keyboard,
    MouseMotion,
    Border,
    ServerControl,
    ClientControl,
    CaptureControl,
    InjectorControl,
    SendSubscribe,
    SendUnsubscribe,
    VirtualScreenControl,
    FocusScreenChanged,
    ClientConnected,
    ClientDisconnected,
    AppStatusChanged,
    ClientMessage,
}

impl Message {
    /// The registry id used for subscriptions and proto-typed dispatch.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Hello { .. } => MessageType::Hello,
            Self::ScreenInfo(_) => MessageType::ScreenInfo,
            Self::MouseMotionAbsolute { .. } => MessageType::MouseMotionAbsolute,
            Self::MouseButton { .. } => MessageType::MouseButton,
            Self::MouseWheel { .. } => MessageType::MouseWheel,
            Self::Keyboard { .. } => MessageType::Keyboard,
            Self::MouseMotion { .. } => MessageType::MouseMotion,
            Self::Border { .. } => MessageType::Border,
            Self::ServerControl { .. } => MessageType::ServerControl,
            Self::ClientControl { .. } => MessageType::ClientControl,
            Self::CaptureControl(_) => MessageType::CaptureControl,
            Self::InjectorControl(_) => MessageType::InjectorControl,
            Self::SendSubscribe(_) => MessageType::SendSubscribe,
            Self::SendUnsubscribe(_) => MessageType::SendUnsubscribe,
            Self::VirtualScreenControl(_) => MessageType::VirtualScreenControl,
            Self::FocusScreenChanged { .. } => MessageType::FocusScreenChanged,
            Self::ClientConnected { .. } => MessageType::ClientConnected,
            Self::ClientDisconnected { .. } => MessageType::ClientDisconnected,
            Self::AppStatusChanged { .. } => MessageType::AppStatusChanged,
            Self::ClientMessage { .. } => MessageType::ClientMessage,
        }
    }

    /// The four event types a server forwards to the focused peer.
    #[must_use]
    pub fn forwarded_types() -> Vec<MessageType> {
        vec![
            MessageType::MouseMotionAbsolute,
            MessageType::MouseButton,
            MessageType::MouseWheel,
            MessageType::Keyboard,
        ]
    }
}

impl From<VirtualScreenConfig> for Message {
    fn from(config: VirtualScreenConfig) -> Self {
        Self::VirtualScreenControl(ScreenOp::Set {
            name: config.name,
            x: config.pos_x,
            y: config.pos_y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bincode_roundtrip(msg: &Message) -> Message {
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(msg, config).unwrap();
        let (decoded, _): (Message, _) = bincode::decode_from_slice(&bytes, config).unwrap();
        decoded
    }

    #[test]
    fn hello_roundtrip() {
        let msg = Message::Hello {
            name: APP_NAME.to_string(),
            version: PROTOCOL_VERSION.to_string(),
        };
        assert_eq!(bincode_roundtrip(&msg), msg);
    }

    #[test]
    fn motion_roundtrip_preserves_absolute_flag() {
        let msg = Message::MouseMotionAbsolute {
            x: 1919,
            y: 0,
            is_absolute: true,
            timestamp: 42,
        };
        assert_eq!(bincode_roundtrip(&msg), msg);
    }

    #[test]
    fn client_message_wraps_inner() {
        let msg = Message::ClientMessage {
            peer: "10.0.0.2:51000".to_string(),
            msg: Box::new(Message::MouseWheel {
                x: 0.0,
                y: -1.0,
                timestamp: 7,
            }),
        };
        let decoded = bincode_roundtrip(&msg);
        assert_eq!(decoded.message_type(), MessageType::ClientMessage);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn message_type_matches_variant() {
        let samples = [
            (
                Message::Border {
                    edge: Edge::Right,
                    x: 1920,
                    y: 500,
                },
                MessageType::Border,
            ),
            (
                Message::CaptureControl(SwitchOp::Start),
                MessageType::CaptureControl,
            ),
            (
                Message::AppStatusChanged {
                    status: AppStatus::Started,
                    mode: AppMode::Server,
                },
                MessageType::AppStatusChanged,
            ),
        ];
        for (msg, ty) in samples {
            assert_eq!(msg.message_type(), ty);
        }
    }

    #[test]
    fn forwarded_types_cover_the_wire_event_set() {
        let types = Message::forwarded_types();
        assert_eq!(types.len(), 4);
        assert!(types.contains(&MessageType::MouseMotionAbsolute));
        assert!(types.contains(&MessageType::Keyboard));
    }
}
