//! uinput-based input injection.
//!
//! Three virtual devices: a keyboard, a relative pointer (buttons, wheel,
//! deltas), and an absolute pointer for cursor positioning.

use async_trait::async_trait;
use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, EventType, KeyCode as EvdevKey, RelativeAxisCode,
    UinputAbsSetup,
};
use screenlink_types::{ButtonState, KeyCode, KeyState, MouseButton};
use tracing::{debug, info};

use super::keymap;
use crate::error::InputError;
use crate::InputInjector;

/// Discrete notches per wheel event.
const WHEEL_DELTA: f32 = 1.0;

/// Linux input injection over uinput.
pub struct UinputInjector {
    width: u32,
    height: u32,
    keyboard: Option<VirtualDevice>,
    pointer: Option<VirtualDevice>,
    abs_pointer: Option<VirtualDevice>,
}

impl UinputInjector {
    /// Create an injector for a screen of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            keyboard: None,
            pointer: None,
            abs_pointer: None,
        }
    }

    fn build_keyboard() -> Result<VirtualDevice, InputError> {
        let mut keys = AttributeSet::<EvdevKey>::new();
        for code in 1..=248 {
            keys.insert(EvdevKey(code));
        }
        VirtualDevice::builder()
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .name("screenlink keyboard")
            .with_keys(&keys)
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .build()
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))
    }

    fn build_pointer() -> Result<VirtualDevice, InputError> {
        let mut keys = AttributeSet::<EvdevKey>::new();
        keys.insert(EvdevKey::BTN_LEFT);
        keys.insert(EvdevKey::BTN_RIGHT);
        keys.insert(EvdevKey::BTN_MIDDLE);
        keys.insert(EvdevKey::BTN_SIDE);
        keys.insert(EvdevKey::BTN_EXTRA);

        let mut rel = AttributeSet::<RelativeAxisCode>::new();
        rel.insert(RelativeAxisCode::REL_X);
        rel.insert(RelativeAxisCode::REL_Y);
        rel.insert(RelativeAxisCode::REL_WHEEL);
        rel.insert(RelativeAxisCode::REL_HWHEEL);

        VirtualDevice::builder()
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .name("screenlink pointer")
            .with_keys(&keys)
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .with_relative_axes(&rel)
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .build()
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))
    }

    fn build_abs_pointer(width: u32, height: u32) -> Result<VirtualDevice, InputError> {
        #[allow(clippy::cast_possible_wrap)]
        let abs_x = UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_X,
            AbsInfo::new(0, 0, width.saturating_sub(1) as i32, 0, 0, 0),
        );
        #[allow(clippy::cast_possible_wrap)]
        let abs_y = UinputAbsSetup::new(
            AbsoluteAxisCode::ABS_Y,
            AbsInfo::new(0, 0, height.saturating_sub(1) as i32, 0, 0, 0),
        );

        let mut keys = AttributeSet::<EvdevKey>::new();
        keys.insert(EvdevKey::BTN_LEFT);

        VirtualDevice::builder()
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .name("screenlink absolute pointer")
            .with_keys(&keys)
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .with_absolute_axis(&abs_x)
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .with_absolute_axis(&abs_y)
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))?
            .build()
            .map_err(|e| InputError::VirtualDeviceCreate(e.to_string()))
    }

    fn keyboard(&mut self) -> Result<&mut VirtualDevice, InputError> {
        self.keyboard.as_mut().ok_or(InputError::NotStarted)
    }

    fn pointer(&mut self) -> Result<&mut VirtualDevice, InputError> {
        self.pointer.as_mut().ok_or(InputError::NotStarted)
    }
}

#[async_trait]
impl InputInjector for UinputInjector {
    async fn start(&mut self) -> Result<(), InputError> {
        if self.keyboard.is_some() {
            return Err(InputError::AlreadyStarted);
        }
        self.keyboard = Some(Self::build_keyboard()?);
        self.pointer = Some(Self::build_pointer()?);
        self.abs_pointer = Some(Self::build_abs_pointer(self.width, self.height)?);
        info!(width = self.width, height = self.height, "uinput injector started");
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        let device = self.abs_pointer.as_mut().ok_or(InputError::NotStarted)?;
        device
            .emit(&[
                evdev::InputEvent::new(EventType::ABSOLUTE.0, AbsoluteAxisCode::ABS_X.0, x),
                evdev::InputEvent::new(EventType::ABSOLUTE.0, AbsoluteAxisCode::ABS_Y.0, y),
            ])
            .map_err(|e| InputError::Inject(e.to_string()))?;
        debug!(x, y, "absolute motion injected");
        Ok(())
    }

    async fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError> {
        self.pointer()?
            .emit(&[
                evdev::InputEvent::new(EventType::RELATIVE.0, RelativeAxisCode::REL_X.0, dx),
                evdev::InputEvent::new(EventType::RELATIVE.0, RelativeAxisCode::REL_Y.0, dy),
            ])
            .map_err(|e| InputError::Inject(e.to_string()))
    }

    async fn button(
        &mut self,
        button: MouseButton,
        state: ButtonState,
        clicks: u8,
    ) -> Result<(), InputError> {
        let key = keymap::button_to_key(button);
        let device = self.pointer()?;
        match state {
            ButtonState::Down => device
                .emit(&[evdev::InputEvent::new(EventType::KEY.0, key.0, 1)])
                .map_err(|e| InputError::Inject(e.to_string())),
            ButtonState::Up => device
                .emit(&[evdev::InputEvent::new(EventType::KEY.0, key.0, 0)])
                .map_err(|e| InputError::Inject(e.to_string())),
            ButtonState::Click => {
                for _ in 0..clicks.max(1) {
                    device
                        .emit(&[
                            evdev::InputEvent::new(EventType::KEY.0, key.0, 1),
                            evdev::InputEvent::new(EventType::KEY.0, key.0, 0),
                        ])
                        .map_err(|e| InputError::Inject(e.to_string()))?;
                }
                Ok(())
            }
        }
    }

    async fn wheel(&mut self, dx: f32, dy: f32) -> Result<(), InputError> {
        let mut events = Vec::with_capacity(2);
        #[allow(clippy::cast_possible_truncation)]
        if dx != 0.0 {
            events.push(evdev::InputEvent::new(
                EventType::RELATIVE.0,
                RelativeAxisCode::REL_HWHEEL.0,
                (dx * WHEEL_DELTA) as i32,
            ));
        }
        #[allow(clippy::cast_possible_truncation)]
        if dy != 0.0 {
            events.push(evdev::InputEvent::new(
                EventType::RELATIVE.0,
                RelativeAxisCode::REL_WHEEL.0,
                (dy * WHEEL_DELTA) as i32,
            ));
        }
        if events.is_empty() {
            return Ok(());
        }
        self.pointer()?
            .emit(&events)
            .map_err(|e| InputError::Inject(e.to_string()))
    }

    async fn key(&mut self, key: KeyCode, state: KeyState) -> Result<(), InputError> {
        let evdev_key = keymap::canonical_to_key(key);
        let value = match state {
            KeyState::Down => 1,
            KeyState::Up => 0,
        };
        self.keyboard()?
            .emit(&[evdev::InputEvent::new(EventType::KEY.0, evdev_key.0, value)])
            .map_err(|e| InputError::Inject(e.to_string()))
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.keyboard = None;
        self.pointer = None;
        self.abs_pointer = None;
        info!("uinput injector shut down");
        Ok(())
    }
}
