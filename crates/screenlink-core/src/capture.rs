//! Capture node: turns OS input into bus messages and watches the edges.
//!
//! Two modes. In edge-watch the physical cursor moves normally and the
//! node only reports [`Message::Border`] when the cursor enters the outer
//! one-pixel ring, suppressed until it returns to the interior band. In
//! exclusive mode the backend holds the devices, all input is forwarded as
//! messages, and motion arrives as relative deltas.
//!
//! A small lossy ring sits between the OS feed and the bus so a slow
//! dispatcher sheds stale motion instead of stalling the OS callback.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use screenlink_input::{scancode, InputCapture, RawInputEvent};
use screenlink_types::{ButtonState, KeyState, Message, MessageType, SwitchOp};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::{Event, EventQueue};
use crate::error::CoreError;
use crate::node::{Consumer, Node, Producer};
use crate::ring::RingBuffer;

pub const NODE_NAME: &str = "capture";

/// Interior band; the cursor must come this far off every edge before
/// another border event may fire.
const BORDER_BAND: i32 = 10;

/// Capacity of the local lossy buffer.
const LOCAL_BUFFER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureMode {
    EdgeWatch,
    Exclusive,
}

/// Lossy staging buffer between the OS feed and the bus.
struct LocalBuffer {
    ring: Mutex<RingBuffer<Message>>,
    ready: Notify,
}

impl LocalBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(RingBuffer::new(capacity)),
            ready: Notify::new(),
        }
    }

    fn push(&self, msg: Message) {
        let displaced = self.ring.lock().unwrap().push_overwrite(msg);
        if displaced.is_some() {
            trace!("capture buffer full; dropped oldest event");
        }
        self.ready.notify_one();
    }

    async fn pop(&self) -> Message {
        loop {
            if let Some(msg) = self.ring.lock().unwrap().pop() {
                return msg;
            }
            self.ready.notified().await;
        }
    }
}

/// The capture component.
pub struct CaptureNode {
    backend: Box<dyn InputCapture>,
    stream_rx: Option<mpsc::Receiver<Message>>,
    mode_tx: Option<watch::Sender<CaptureMode>>,
    token: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    exclusive: bool,
}

impl CaptureNode {
    #[must_use]
    pub fn new(backend: Box<dyn InputCapture>) -> Self {
        Self {
            backend,
            stream_rx: None,
            mode_tx: None,
            token: None,
            tasks: Vec::new(),
            exclusive: false,
        }
    }
}

#[async_trait]
impl Node for CaptureNode {
    fn name(&self) -> &str {
        NODE_NAME
    }

    async fn setup(&mut self) -> Result<(), CoreError> {
        let (width, height) = self.backend.screen_size();
        #[allow(clippy::cast_possible_wrap)]
        let (width, height) = (width as i32, height as i32);

        let (feed_tx, feed_rx) = mpsc::channel(256);
        // Hook installation failure is fatal to the component.
        self.backend.start(feed_tx).await?;

        let (out_tx, out_rx) = mpsc::channel(64);
        let (mode_tx, mode_rx) = watch::channel(CaptureMode::EdgeWatch);
        let token = CancellationToken::new();
        let buffer = Arc::new(LocalBuffer::new(LOCAL_BUFFER_CAPACITY));

        self.tasks.push(tokio::spawn(pump(
            feed_rx,
            mode_rx,
            Arc::clone(&buffer),
            width,
            height,
            token.clone(),
        )));
        self.tasks
            .push(tokio::spawn(forward(buffer, out_tx, token.clone())));

        self.stream_rx = Some(out_rx);
        self.mode_tx = Some(mode_tx);
        self.token = Some(token);
        self.exclusive = false;
        info!(width, height, "capture started in edge-watch mode");
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), CoreError> {
        if self.exclusive {
            if let Err(e) = self.backend.release().await {
                warn!(error = %e, "release during teardown failed");
            }
            self.exclusive = false;
        }
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.mode_tx = None;
        self.stream_rx = None;
        self.backend.shutdown().await?;
        info!("capture stopped");
        Ok(())
    }

    fn consumer(&mut self) -> Option<&mut dyn Consumer> {
        Some(self)
    }

    fn producer(&mut self) -> Option<&mut dyn Producer> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for CaptureNode {
    fn subscriptions(&self) -> Vec<MessageType> {
        vec![MessageType::CaptureControl]
    }

    async fn handle_event(&mut self, event: &Event, _bus: &EventQueue) -> Result<(), CoreError> {
        let Message::CaptureControl(op) = &event.message else {
            return Ok(());
        };
        match op {
            SwitchOp::Start => {
                if self.exclusive {
                    return Ok(());
                }
                self.backend.grab().await?;
                let (width, height) = self.backend.screen_size();
                #[allow(clippy::cast_possible_wrap)]
                self.backend
                    .warp_cursor(width as i32 / 2, height as i32 / 2)
                    .await?;
                if let Some(mode_tx) = &self.mode_tx {
                    let _ = mode_tx.send(CaptureMode::Exclusive);
                }
                self.exclusive = true;
                info!("exclusive capture started");
            }
            SwitchOp::Stop => {
                if !self.exclusive {
                    return Ok(());
                }
                self.backend.release().await?;
                if let Some(mode_tx) = &self.mode_tx {
                    let _ = mode_tx.send(CaptureMode::EdgeWatch);
                }
                self.exclusive = false;
                info!("exclusive capture stopped; back to edge-watch");
            }
        }
        Ok(())
    }
}

impl Producer for CaptureNode {
    fn event_stream(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.stream_rx.take()
    }
}

/// Read the OS feed, translate per mode, and stage into the lossy buffer.
async fn pump(
    mut feed_rx: mpsc::Receiver<RawInputEvent>,
    mode_rx: watch::Receiver<CaptureMode>,
    buffer: Arc<LocalBuffer>,
    width: i32,
    height: i32,
    token: CancellationToken,
) {
    let mut in_border = false;
    loop {
        let raw = tokio::select! {
            () = token.cancelled() => break,
            raw = feed_rx.recv() => {
                let Some(raw) = raw else { break };
                raw
            }
        };
        let mode = *mode_rx.borrow();
        let msg = match mode {
            CaptureMode::EdgeWatch => edge_watch(raw, width, height, &mut in_border),
            CaptureMode::Exclusive => exclusive(raw),
        };
        if let Some(msg) = msg {
            buffer.push(msg);
        }
    }
    debug!("capture pump exited");
}

/// Drain the lossy buffer into the producer stream.
async fn forward(buffer: Arc<LocalBuffer>, out_tx: mpsc::Sender<Message>, token: CancellationToken) {
    loop {
        let msg = tokio::select! {
            () = token.cancelled() => break,
            msg = buffer.pop() => msg,
        };
        tokio::select! {
            () = token.cancelled() => break,
            result = out_tx.send(msg) => {
                if result.is_err() {
                    break;
                }
            }
        }
    }
}

/// Passive mode: emit a border crossing once, then hold fire until the
/// cursor has come back at least [`BORDER_BAND`] pixels from every edge.
fn edge_watch(raw: RawInputEvent, width: i32, height: i32, in_border: &mut bool) -> Option<Message> {
    let RawInputEvent::MotionAbsolute { x, y, .. } = raw else {
        return None;
    };
    if *in_border {
        if x > BORDER_BAND
            && x < width - 1 - BORDER_BAND
            && y > BORDER_BAND
            && y < height - 1 - BORDER_BAND
        {
            *in_border = false;
        }
        return None;
    }
    let edge = if x <= 0 {
        screenlink_types::Edge::Left
    } else if x >= width - 1 {
        screenlink_types::Edge::Right
    } else if y <= 0 {
        screenlink_types::Edge::Top
    } else if y >= height - 1 {
        screenlink_types::Edge::Bottom
    } else {
        return None;
    };
    *in_border = true;
    Some(Message::Border { edge, x, y })
}

/// Exclusive mode: forward everything, motion as relative deltas.
fn exclusive(raw: RawInputEvent) -> Option<Message> {
    match raw {
        // Synthetic warp echoes arrive as absolute motion; drop them.
        RawInputEvent::MotionAbsolute { .. } => None,
        RawInputEvent::MotionRelative { dx, dy, timestamp } => Some(Message::MouseMotion {
            x: dx,
            y: dy,
            is_absolute: false,
            timestamp,
        }),
        RawInputEvent::Button {
            button,
            pressed,
            timestamp,
        } => Some(Message::MouseButton {
            state: if pressed {
                ButtonState::Down
            } else {
                ButtonState::Up
            },
            button,
            clicks: 1,
            timestamp,
        }),
        RawInputEvent::Wheel { dx, dy, timestamp } => Some(Message::MouseWheel {
            x: dx,
            y: dy,
            timestamp,
        }),
        RawInputEvent::Key {
            scancode,
            pressed,
            modifiers,
            timestamp,
        } => Some(Message::Keyboard {
            state: if pressed { KeyState::Down } else { KeyState::Up },
            key: scancode::to_keycode(scancode),
            modifiers,
            timestamp,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlink_input::mock::MockCapture;
    use screenlink_types::{Edge, KeyCode, Modifiers, MouseButton};
    use std::time::Duration;

    async fn recv_message(rx: &mut mpsc::Receiver<Message>) -> Message {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for capture output")
            .expect("capture stream ended")
    }

    async fn expect_silence(rx: &mut mpsc::Receiver<Message>) {
        let result = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(result.is_err(), "expected no message, got {result:?}");
    }

    struct Rig {
        node: CaptureNode,
        feed: mpsc::Sender<RawInputEvent>,
        stream: mpsc::Receiver<Message>,
        handle: screenlink_input::mock::MockCaptureHandle,
        bus: EventQueue,
    }

    async fn rig() -> Rig {
        let (backend, feed) = MockCapture::new(1920, 1080);
        let handle = backend.handle();
        let mut node = CaptureNode::new(Box::new(backend));
        node.setup().await.unwrap();
        let stream = node.event_stream().unwrap();
        Rig {
            node,
            feed,
            stream,
            handle,
            bus: EventQueue::new(16),
        }
    }

    fn motion_abs(x: i32, y: i32) -> RawInputEvent {
        RawInputEvent::MotionAbsolute { x, y, timestamp: 1 }
    }

    #[tokio::test]
    async fn border_fires_once_until_interior_band_reached() {
        let mut rig = rig().await;

        rig.feed.send(motion_abs(1919, 500)).await.unwrap();
        let msg = recv_message(&mut rig.stream).await;
        assert_eq!(
            msg,
            Message::Border {
                edge: Edge::Right,
                x: 1919,
                y: 500
            }
        );

        // Grazing along the edge fires nothing further.
        rig.feed.send(motion_abs(1919, 510)).await.unwrap();
        rig.feed.send(motion_abs(1915, 520)).await.unwrap();
        expect_silence(&mut rig.stream).await;

        // Returning to the interior band re-arms the edge.
        rig.feed.send(motion_abs(900, 500)).await.unwrap();
        rig.feed.send(motion_abs(1919, 400)).await.unwrap();
        let msg = recv_message(&mut rig.stream).await;
        assert_eq!(
            msg,
            Message::Border {
                edge: Edge::Right,
                x: 1919,
                y: 400
            }
        );
        rig.node.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn corner_fires_exactly_one_border() {
        let mut rig = rig().await;
        rig.feed.send(motion_abs(0, 0)).await.unwrap();
        let msg = recv_message(&mut rig.stream).await;
        assert_eq!(
            msg,
            Message::Border {
                edge: Edge::Left,
                x: 0,
                y: 0
            }
        );
        expect_silence(&mut rig.stream).await;
        rig.node.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn passive_mode_swallows_buttons_and_keys() {
        let mut rig = rig().await;
        rig.feed
            .send(RawInputEvent::Button {
                button: MouseButton::Left,
                pressed: true,
                timestamp: 1,
            })
            .await
            .unwrap();
        rig.feed
            .send(RawInputEvent::Key {
                scancode: 0x1E,
                pressed: true,
                modifiers: Modifiers::empty(),
                timestamp: 2,
            })
            .await
            .unwrap();
        expect_silence(&mut rig.stream).await;
        rig.node.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn exclusive_mode_translates_and_recenters() {
        let mut rig = rig().await;

        rig.node
            .handle_event(
                &Event::new("controller", Message::CaptureControl(SwitchOp::Start)),
                &rig.bus,
            )
            .await
            .unwrap();
        assert!(rig.handle.is_grabbed());
        assert_eq!(rig.handle.warps(), vec![(960, 540)]);

        rig.feed
            .send(RawInputEvent::MotionRelative {
                dx: 12,
                dy: -3,
                timestamp: 5,
            })
            .await
            .unwrap();
        let msg = recv_message(&mut rig.stream).await;
        assert_eq!(
            msg,
            Message::MouseMotion {
                x: 12,
                y: -3,
                is_absolute: false,
                timestamp: 5
            }
        );

        rig.feed
            .send(RawInputEvent::Key {
                scancode: 0x1E,
                pressed: true,
                modifiers: Modifiers::LSHIFT,
                timestamp: 6,
            })
            .await
            .unwrap();
        let msg = recv_message(&mut rig.stream).await;
        assert_eq!(
            msg,
            Message::Keyboard {
                state: KeyState::Down,
                key: KeyCode::KeyA,
                modifiers: Modifiers::LSHIFT,
                timestamp: 6
            }
        );

        rig.node
            .handle_event(
                &Event::new("controller", Message::CaptureControl(SwitchOp::Stop)),
                &rig.bus,
            )
            .await
            .unwrap();
        assert!(!rig.handle.is_grabbed());
        rig.node.teardown().await.unwrap();
    }
}
