//! Injector node: synthesizes OS input from inbound messages.
//!
//! Active only between `InjectorControl::Start` and `Stop`; everything else
//! is ignored while inactive. Injection failures are logged and the next
//! event is processed.

use async_trait::async_trait;
use screenlink_input::InputInjector;
use screenlink_types::{ButtonState, Message, MessageType, SwitchOp};
use tracing::{debug, info, warn};

use crate::bus::{Event, EventQueue};
use crate::error::CoreError;
use crate::node::{Consumer, Node};

pub const NODE_NAME: &str = "injector";

/// The injection component.
pub struct InjectorNode {
    backend: Box<dyn InputInjector>,
    active: bool,
    started: bool,
}

impl InjectorNode {
    #[must_use]
    pub fn new(backend: Box<dyn InputInjector>) -> Self {
        Self {
            backend,
            active: false,
            started: false,
        }
    }

    async fn inject(&mut self, msg: &Message) {
        let result = match *msg {
            Message::MouseMotionAbsolute { x, y, .. } => self.backend.move_absolute(x, y).await,
            Message::MouseMotion { x, y, .. } => self.backend.move_relative(x, y).await,
            Message::MouseButton {
                state,
                button,
                clicks,
                ..
            } => {
                if state == ButtonState::Click && clicks == 0 {
                    debug!("dropping malformed click event with zero clicks");
                    return;
                }
                self.backend.button(button, state, clicks).await
            }
            Message::MouseWheel { x, y, .. } => {
                if x == 0.0 && y == 0.0 {
                    return;
                }
                self.backend.wheel(x, y).await
            }
            Message::Keyboard { state, key, .. } => self.backend.key(key, state).await,
            _ => return,
        };
        if let Err(e) = result {
            warn!(error = %e, "injection failed; continuing");
        }
    }
}

#[async_trait]
impl Node for InjectorNode {
    fn name(&self) -> &str {
        NODE_NAME
    }

    async fn setup(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), CoreError> {
        self.active = false;
        if self.started {
            self.started = false;
            self.backend.shutdown().await?;
        }
        info!("injector stopped");
        Ok(())
    }

    fn consumer(&mut self) -> Option<&mut dyn Consumer> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for InjectorNode {
    fn subscriptions(&self) -> Vec<MessageType> {
        vec![
            MessageType::InjectorControl,
            MessageType::MouseMotionAbsolute,
            MessageType::MouseButton,
            MessageType::MouseWheel,
            MessageType::Keyboard,
        ]
    }

    async fn handle_event(&mut self, event: &Event, _bus: &EventQueue) -> Result<(), CoreError> {
        if let Message::InjectorControl(op) = &event.message {
            match op {
                SwitchOp::Start => {
                    if !self.started {
                        // Prepares virtual devices and queries screen size.
                        self.backend.start().await?;
                        self.started = true;
                    }
                    self.active = true;
                    info!("injector active");
                }
                SwitchOp::Stop => {
                    self.active = false;
                    info!("injector inactive");
                }
            }
            return Ok(());
        }
        if self.active {
            self.inject(&event.message).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlink_input::mock::{InjectedCall, MockInjector};
    use screenlink_types::{KeyCode, KeyState, Modifiers, MouseButton};

    struct Rig {
        node: InjectorNode,
        handle: screenlink_input::mock::MockInjectorHandle,
        bus: EventQueue,
    }

    fn rig() -> Rig {
        let backend = MockInjector::new(1920, 1080);
        let handle = backend.handle();
        Rig {
            node: InjectorNode::new(Box::new(backend)),
            handle,
            bus: EventQueue::new(16),
        }
    }

    async fn deliver(rig: &mut Rig, msg: Message) {
        let event = Event::new("transport", msg);
        rig.node.handle_event(&event, &rig.bus).await.unwrap();
    }

    #[tokio::test]
    async fn inactive_injector_ignores_input() {
        let mut rig = rig();
        deliver(
            &mut rig,
            Message::MouseMotionAbsolute {
                x: 5,
                y: 5,
                is_absolute: true,
                timestamp: 1,
            },
        )
        .await;
        assert!(rig.handle.calls().is_empty());
    }

    #[tokio::test]
    async fn active_injector_replays_events() {
        let mut rig = rig();
        deliver(&mut rig, Message::InjectorControl(SwitchOp::Start)).await;
        assert!(rig.handle.is_started());

        deliver(
            &mut rig,
            Message::MouseMotionAbsolute {
                x: 100,
                y: 200,
                is_absolute: true,
                timestamp: 1,
            },
        )
        .await;
        deliver(
            &mut rig,
            Message::Keyboard {
                state: KeyState::Down,
                key: KeyCode::KeyZ,
                modifiers: Modifiers::empty(),
                timestamp: 2,
            },
        )
        .await;

        let calls = rig.handle.calls();
        assert_eq!(calls[0], InjectedCall::MoveAbsolute { x: 100, y: 200 });
        assert_eq!(
            calls[1],
            InjectedCall::Key {
                key: KeyCode::KeyZ,
                state: KeyState::Down
            }
        );
    }

    #[tokio::test]
    async fn zero_click_event_is_dropped() {
        let mut rig = rig();
        deliver(&mut rig, Message::InjectorControl(SwitchOp::Start)).await;
        deliver(
            &mut rig,
            Message::MouseButton {
                state: ButtonState::Click,
                button: MouseButton::Left,
                clicks: 0,
                timestamp: 1,
            },
        )
        .await;
        assert!(rig.handle.calls().is_empty());
    }

    #[tokio::test]
    async fn zero_wheel_axes_emit_nothing() {
        let mut rig = rig();
        deliver(&mut rig, Message::InjectorControl(SwitchOp::Start)).await;
        deliver(
            &mut rig,
            Message::MouseWheel {
                x: 0.0,
                y: 0.0,
                timestamp: 1,
            },
        )
        .await;
        assert!(rig.handle.calls().is_empty());

        deliver(
            &mut rig,
            Message::MouseWheel {
                x: 0.0,
                y: -1.0,
                timestamp: 2,
            },
        )
        .await;
        assert_eq!(
            rig.handle.calls(),
            vec![InjectedCall::Wheel { dx: 0.0, dy: -1.0 }]
        );
    }

    #[tokio::test]
    async fn stop_deactivates_without_destroying_devices() {
        let mut rig = rig();
        deliver(&mut rig, Message::InjectorControl(SwitchOp::Start)).await;
        deliver(&mut rig, Message::InjectorControl(SwitchOp::Stop)).await;
        deliver(
            &mut rig,
            Message::MouseMotionAbsolute {
                x: 1,
                y: 1,
                is_absolute: true,
                timestamp: 3,
            },
        )
        .await;
        assert!(rig.handle.calls().is_empty());
        assert!(!rig.handle.is_shutdown());

        rig.node.teardown().await.unwrap();
        assert!(rig.handle.is_shutdown());
    }
}
