//! evdev-based input capture.
//!
//! Reads `/dev/input/event*` devices. In edge-watch mode the backend
//! accumulates relative motion into a virtual cursor position (evdev has no
//! display connection to ask) and reports absolute positions; while grabbed
//! it holds the devices exclusively and reports raw deltas.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use evdev::{Device, EventSummary, KeyCode as EvdevKey, RelativeAxisCode};
use screenlink_types::Modifiers;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::keymap;
use crate::error::InputError;
use crate::scancode;
use crate::{InputCapture, RawInputEvent};

/// Shared state between the reader tasks and the backend handle.
struct Shared {
    grabbed: AtomicBool,
    cursor_x: AtomicI32,
    cursor_y: AtomicI32,
    modifiers: Mutex<Modifiers>,
    width: i32,
    height: i32,
}

impl Shared {
    fn advance_cursor(&self, dx: i32, dy: i32) -> (i32, i32) {
        let x = (self.cursor_x.load(Ordering::Relaxed) + dx).clamp(0, self.width);
        let y = (self.cursor_y.load(Ordering::Relaxed) + dy).clamp(0, self.height);
        self.cursor_x.store(x, Ordering::Relaxed);
        self.cursor_y.store(y, Ordering::Relaxed);
        (x, y)
    }

    fn update_modifiers(&self, key: EvdevKey, pressed: bool) -> Modifiers {
        let bit = match key {
            EvdevKey::KEY_LEFTSHIFT => Some(Modifiers::LSHIFT),
            EvdevKey::KEY_RIGHTSHIFT => Some(Modifiers::RSHIFT),
            EvdevKey::KEY_LEFTCTRL => Some(Modifiers::LCTRL),
            EvdevKey::KEY_RIGHTCTRL => Some(Modifiers::RCTRL),
            EvdevKey::KEY_LEFTALT => Some(Modifiers::LALT),
            EvdevKey::KEY_RIGHTALT => Some(Modifiers::RALT),
            EvdevKey::KEY_LEFTMETA => Some(Modifiers::LGUI),
            EvdevKey::KEY_RIGHTMETA => Some(Modifiers::RGUI),
            _ => None,
        };
        let mut modifiers = self.modifiers.lock().unwrap();
        if let Some(bit) = bit {
            if pressed {
                modifiers.insert(bit);
            } else {
                modifiers.remove(bit);
            }
        }
        *modifiers
    }
}

/// Linux input capture over evdev.
pub struct EvdevCapture {
    shared: Arc<Shared>,
    grab_tx: Option<watch::Sender<bool>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
}

impl EvdevCapture {
    /// Create a capture backend for a screen of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let shared = Arc::new(Shared {
            grabbed: AtomicBool::new(false),
            cursor_x: AtomicI32::new(width as i32 / 2),
            cursor_y: AtomicI32::new(height as i32 / 2),
            modifiers: Mutex::new(Modifiers::empty()),
            width: width as i32,
            height: height as i32,
        });
        Self {
            shared,
            grab_tx: None,
            shutdown_tx: None,
            supervisor: None,
        }
    }

    /// Paths of devices that look like keyboards or mice.
    fn enumerate_devices() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for (path, device) in evdev::enumerate() {
            let is_keyboard = device
                .supported_keys()
                .is_some_and(|keys| keys.contains(EvdevKey::KEY_A) && keys.contains(EvdevKey::KEY_ENTER));
            let is_mouse = device
                .supported_relative_axes()
                .is_some_and(|rel| rel.contains(RelativeAxisCode::REL_X))
                || device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(EvdevKey::BTN_LEFT));
            if is_keyboard || is_mouse {
                info!(path = %path.display(), name = device.name().unwrap_or("?"), "tracking device");
                paths.push(path);
            }
        }
        paths
    }
}

#[async_trait]
impl InputCapture for EvdevCapture {
    async fn start(&mut self, tx: mpsc::Sender<RawInputEvent>) -> Result<(), InputError> {
        if self.supervisor.is_some() {
            return Err(InputError::AlreadyStarted);
        }
        let paths = Self::enumerate_devices();
        if paths.is_empty() {
            return Err(InputError::HookInstall(
                "no keyboard or mouse devices found".to_string(),
            ));
        }

        let (grab_tx, grab_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.grab_tx = Some(grab_tx);
        self.shutdown_tx = Some(shutdown_tx);

        let mut handles = Vec::new();
        for path in paths {
            let tx = tx.clone();
            let shared = Arc::clone(&self.shared);
            let mut grab_rx = grab_rx.clone();
            let mut shutdown_rx = shutdown_rx.clone();

            let handle: JoinHandle<()> = tokio::spawn(async move {
                let device = match Device::open(&path) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to open device");
                        return;
                    }
                };
                let mut stream = match device.into_event_stream() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to stream device");
                        return;
                    }
                };

                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        result = grab_rx.changed() => {
                            if result.is_err() {
                                break;
                            }
                            let want = *grab_rx.borrow();
                            let result = if want {
                                stream.device_mut().grab()
                            } else {
                                stream.device_mut().ungrab()
                            };
                            if let Err(e) = result {
                                warn!(path = %path.display(), error = %e, "grab state change failed");
                            }
                        }
                        result = stream.next_event() => {
                            match result {
                                Ok(event) => {
                                    if let Some(raw) = translate(&shared, &event) {
                                        if tx.send(raw).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                                Err(e) => {
                                    warn!(path = %path.display(), error = %e, "device read error");
                                    break;
                                }
                            }
                        }
                    }
                }
                let _ = stream.device_mut().ungrab();
            });
            handles.push(handle);
        }

        self.supervisor = Some(tokio::spawn(async move {
            for handle in handles {
                let _ = handle.await;
            }
        }));

        info!("evdev capture started");
        Ok(())
    }

    async fn grab(&mut self) -> Result<(), InputError> {
        let tx = self.grab_tx.as_ref().ok_or(InputError::NotStarted)?;
        self.shared.grabbed.store(true, Ordering::SeqCst);
        tx.send(true)
            .map_err(|e| InputError::Grab(e.to_string()))?;
        Ok(())
    }

    async fn release(&mut self) -> Result<(), InputError> {
        let tx = self.grab_tx.as_ref().ok_or(InputError::NotStarted)?;
        self.shared.grabbed.store(false, Ordering::SeqCst);
        tx.send(false)
            .map_err(|e| InputError::Grab(e.to_string()))?;
        Ok(())
    }

    async fn warp_cursor(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        // No display connection here; the virtual cursor is the one edge
        // detection reads, so repositioning it is the whole job.
        self.shared.cursor_x.store(x, Ordering::Relaxed);
        self.shared.cursor_y.store(y, Ordering::Relaxed);
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        #[allow(clippy::cast_sign_loss)]
        let size = (self.shared.width as u32, self.shared.height as u32);
        size
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        self.grab_tx = None;
        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.await;
        }
        info!("evdev capture shut down");
        Ok(())
    }
}

fn event_timestamp(event: &evdev::InputEvent) -> u64 {
    event
        .timestamp()
        .duration_since(UNIX_EPOCH)
        .or_else(|_| SystemTime::now().duration_since(UNIX_EPOCH))
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

/// Convert one evdev event into the raw vocabulary, if relevant.
fn translate(shared: &Shared, event: &evdev::InputEvent) -> Option<RawInputEvent> {
    let timestamp = event_timestamp(event);
    match event.destructure() {
        EventSummary::Key(_, key, value) => {
            // 2 is autorepeat; capture forwards press and release only.
            let pressed = match value {
                0 => false,
                1 => true,
                _ => return None,
            };
            if let Some(button) = keymap::button_from_key(key) {
                return Some(RawInputEvent::Button {
                    button,
                    pressed,
                    timestamp,
                });
            }
            let modifiers = shared.update_modifiers(key, pressed);
            let canonical = keymap::key_to_canonical(key);
            Some(RawInputEvent::Key {
                scancode: scancode::from_keycode(canonical),
                pressed,
                modifiers,
                timestamp,
            })
        }
        EventSummary::RelativeAxis(_, axis, value) => match axis {
            RelativeAxisCode::REL_X | RelativeAxisCode::REL_Y => {
                let (dx, dy) = if axis == RelativeAxisCode::REL_X {
                    (value, 0)
                } else {
                    (0, value)
                };
                if shared.grabbed.load(Ordering::SeqCst) {
                    Some(RawInputEvent::MotionRelative { dx, dy, timestamp })
                } else {
                    let (x, y) = shared.advance_cursor(dx, dy);
                    Some(RawInputEvent::MotionAbsolute { x, y, timestamp })
                }
            }
            #[allow(clippy::cast_precision_loss)]
            RelativeAxisCode::REL_WHEEL => Some(RawInputEvent::Wheel {
                dx: 0.0,
                dy: value as f32,
                timestamp,
            }),
            #[allow(clippy::cast_precision_loss)]
            RelativeAxisCode::REL_HWHEEL => Some(RawInputEvent::Wheel {
                dx: value as f32,
                dy: 0.0,
                timestamp,
            }),
            _ => None,
        },
        _ => None,
    }
}
