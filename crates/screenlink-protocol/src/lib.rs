//! TCP transport and wire protocol for screenlink.
//!
//! Peers exchange a single ordered stream of length-prefixed bincode
//! frames over one TCP connection. This crate owns the framing, the
//! connection setup, and the two-message handshake; routing and peer
//! bookkeeping live in the core crate.

pub mod error;
pub mod handshake;
pub mod net;
pub mod stream;
pub mod wire;

pub use error::ProtocolError;
pub use handshake::{accept_handshake, connect_handshake};
pub use net::{connect, Listener};
pub use stream::{split, MessageReceiver, MessageSender};
