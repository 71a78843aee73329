//! Input backend errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to install input hook: {0}")]
    HookInstall(String),

    #[error("failed to grab input devices: {0}")]
    Grab(String),

    #[error("failed to create virtual device: {0}")]
    VirtualDeviceCreate(String),

    #[error("failed to inject event: {0}")]
    Inject(String),

    #[error("backend already started")]
    AlreadyStarted,

    #[error("backend not started")]
    NotStarted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
