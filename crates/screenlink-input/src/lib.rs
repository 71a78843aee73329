//! Platform-abstracted input capture and injection for screenlink.
//!
//! This crate defines the [`InputCapture`] and [`InputInjector`] traits the
//! platform backends implement, the raw event type they report, and the
//! canonical scancode table shared by both directions. The evdev/uinput
//! backend is gated behind the `linux` feature; [`mock`] backends exist for
//! tests on any platform.

use async_trait::async_trait;
use screenlink_types::{ButtonState, KeyCode, KeyState, Modifiers, MouseButton};
use tokio::sync::mpsc;

pub mod error;
pub mod mock;
pub mod scancode;

#[cfg(all(feature = "linux", target_os = "linux"))]
pub mod linux;

pub use error::InputError;

/// An input event as reported by a capture backend, before translation to
/// bus messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInputEvent {
    /// Cursor position on the local screen. Reported while the backend is
    /// not grabbed (edge-watch).
    MotionAbsolute { x: i32, y: i32, timestamp: u64 },
    /// Cursor delta. Reported while the backend is grabbed (exclusive).
    MotionRelative { dx: i32, dy: i32, timestamp: u64 },
    Button {
        button: MouseButton,
        pressed: bool,
        timestamp: u64,
    },
    Wheel { dx: f32, dy: f32, timestamp: u64 },
    Key {
        /// Canonical scancode; see [`scancode`].
        scancode: u32,
        pressed: bool,
        modifiers: Modifiers,
        timestamp: u64,
    },
}

/// Captures physical input and tracks the local cursor.
///
/// Backends report events through the channel given to [`start`]. While
/// grabbed, input is withheld from local applications, motion is reported
/// as relative deltas, and the physical cursor stays parked (backends
/// re-center it if their platform moves it anyway).
///
/// [`start`]: InputCapture::start
#[async_trait]
pub trait InputCapture: Send + 'static {
    /// Begin reporting events to `tx`. Failure to install the OS hook is
    /// fatal to the capture component.
    async fn start(&mut self, tx: mpsc::Sender<RawInputEvent>) -> Result<(), InputError>;

    /// Enter exclusive mode: intercept all input.
    async fn grab(&mut self) -> Result<(), InputError>;

    /// Leave exclusive mode: let input flow to local applications again.
    async fn release(&mut self) -> Result<(), InputError>;

    /// Move the physical cursor. The resulting synthetic motion event must
    /// not be reported back through the event channel.
    async fn warp_cursor(&mut self, x: i32, y: i32) -> Result<(), InputError>;

    /// Local screen size in pixels.
    fn screen_size(&self) -> (u32, u32);

    /// Release all devices and stop reporting.
    async fn shutdown(&mut self) -> Result<(), InputError>;
}

/// Synthesizes input events on the local machine.
#[async_trait]
pub trait InputInjector: Send + 'static {
    /// Prepare virtual devices and query the local screen size.
    async fn start(&mut self) -> Result<(), InputError>;

    /// Local screen size in pixels, valid after [`start`](InputInjector::start).
    fn screen_size(&self) -> (u32, u32);

    /// Position the cursor at an absolute pixel coordinate.
    async fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), InputError>;

    /// Move the cursor by a delta.
    async fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError>;

    /// Replay a button state. For [`ButtonState::Click`], `clicks` is the
    /// number of press/release pairs to synthesize.
    async fn button(
        &mut self,
        button: MouseButton,
        state: ButtonState,
        clicks: u8,
    ) -> Result<(), InputError>;

    /// Scroll by wheel deltas. A zero-valued axis emits nothing for that
    /// axis.
    async fn wheel(&mut self, dx: f32, dy: f32) -> Result<(), InputError>;

    /// Press or release a key.
    async fn key(&mut self, key: KeyCode, state: KeyState) -> Result<(), InputError>;

    /// Destroy virtual devices.
    async fn shutdown(&mut self) -> Result<(), InputError>;
}
