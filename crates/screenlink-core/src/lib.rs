//! Core service for screenlink.
//!
//! The pieces fit together as a node graph over a bounded event bus: the
//! capture node produces input events, the transport node moves them
//! between machines, the injector replays them, and the controller decides
//! which virtual screen owns the cursor. The app module wires everything
//! and runs the single dispatch loop.

pub mod app;
pub mod bus;
pub mod capture;
pub mod command;
pub mod controller;
pub mod error;
pub mod injector;
pub mod invoker;
pub mod manager;
pub mod node;
pub mod ring;
pub mod rpc;
pub mod settings;
pub mod transport;
pub mod trie;

pub use app::{App, AppHandle};
pub use bus::{Event, EventQueue, DEFAULT_QUEUE_CAPACITY};
pub use error::CoreError;
pub use manager::NodeManager;
pub use node::{Consumer, Node, NodeStatus, Producer};
pub use settings::{Settings, SharedSettings, DEFAULT_PORT};
