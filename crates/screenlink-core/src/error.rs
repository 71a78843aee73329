//! Core service errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("node {0} not found")]
    NodeNotFound(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("ambiguous command {input}: matches {}", candidates.join(", "))]
    AmbiguousCommand {
        input: String,
        candidates: Vec<String>,
    },

    #[error("command error: {0}")]
    Command(String),

    #[error("event queue closed")]
    QueueClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] screenlink_protocol::ProtocolError),

    #[error("input error: {0}")]
    Input(#[from] screenlink_input::InputError),

    #[error("settings error: {0}")]
    Settings(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
