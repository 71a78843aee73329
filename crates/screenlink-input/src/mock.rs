//! Mock input backends for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use screenlink_types::{ButtonState, KeyCode, KeyState, MouseButton};
use tokio::sync::mpsc;

use crate::error::InputError;
use crate::{InputCapture, InputInjector, RawInputEvent};

// ---------------------------------------------------------------------------
// MockCapture
// ---------------------------------------------------------------------------

/// Mock capture backend.
///
/// [`MockCapture::new`] returns a feed sender; tests push
/// [`RawInputEvent`]s into it and `start()` forwards them to the capture
/// component. Grab state and cursor warps are observable through
/// [`MockCaptureHandle`].
pub struct MockCapture {
    feed_rx: Option<mpsc::Receiver<RawInputEvent>>,
    width: u32,
    height: u32,
    state: MockCaptureHandle,
}

/// Observer handle for [`MockCapture`].
#[derive(Clone)]
pub struct MockCaptureHandle {
    grabbed: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    warps: Arc<Mutex<Vec<(i32, i32)>>>,
}

impl MockCaptureHandle {
    pub fn is_grabbed(&self) -> bool {
        self.grabbed.load(Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// All cursor warps issued so far, oldest first.
    pub fn warps(&self) -> Vec<(i32, i32)> {
        self.warps.lock().unwrap().clone()
    }
}

impl MockCapture {
    /// Create a mock capture for a screen of the given size, plus the feed
    /// sender tests use to inject events.
    pub fn new(width: u32, height: u32) -> (Self, mpsc::Sender<RawInputEvent>) {
        let (feed_tx, feed_rx) = mpsc::channel(256);
        let capture = Self {
            feed_rx: Some(feed_rx),
            width,
            height,
            state: MockCaptureHandle {
                grabbed: Arc::new(AtomicBool::new(false)),
                shutdown: Arc::new(AtomicBool::new(false)),
                warps: Arc::new(Mutex::new(Vec::new())),
            },
        };
        (capture, feed_tx)
    }

    pub fn handle(&self) -> MockCaptureHandle {
        self.state.clone()
    }
}

#[async_trait]
impl InputCapture for MockCapture {
    async fn start(&mut self, tx: mpsc::Sender<RawInputEvent>) -> Result<(), InputError> {
        let mut feed_rx = self.feed_rx.take().ok_or(InputError::AlreadyStarted)?;
        let shutdown = self.state.shutdown.clone();
        tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn grab(&mut self) -> Result<(), InputError> {
        self.state.grabbed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&mut self) -> Result<(), InputError> {
        self.state.grabbed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn warp_cursor(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.state.warps.lock().unwrap().push((x, y));
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.state.shutdown.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockInjector
// ---------------------------------------------------------------------------

/// A call recorded by [`MockInjector`].
#[derive(Debug, Clone, PartialEq)]
pub enum InjectedCall {
    MoveAbsolute { x: i32, y: i32 },
    MoveRelative { dx: i32, dy: i32 },
    Button {
        button: MouseButton,
        state: ButtonState,
        clicks: u8,
    },
    Wheel { dx: f32, dy: f32 },
    Key { key: KeyCode, state: KeyState },
}

#[derive(Debug, Default)]
struct MockInjectorState {
    calls: Vec<InjectedCall>,
    started: bool,
    shutdown: bool,
}

/// Mock injection backend that records every call.
pub struct MockInjector {
    width: u32,
    height: u32,
    state: Arc<Mutex<MockInjectorState>>,
}

/// Observer handle for [`MockInjector`].
#[derive(Clone)]
pub struct MockInjectorHandle {
    state: Arc<Mutex<MockInjectorState>>,
}

impl MockInjectorHandle {
    /// All injected calls so far, oldest first.
    pub fn calls(&self) -> Vec<InjectedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().unwrap().started
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }
}

impl MockInjector {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: Arc::new(Mutex::new(MockInjectorState::default())),
        }
    }

    pub fn handle(&self) -> MockInjectorHandle {
        MockInjectorHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, call: InjectedCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl InputInjector for MockInjector {
    async fn start(&mut self) -> Result<(), InputError> {
        self.state.lock().unwrap().started = true;
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn move_absolute(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.record(InjectedCall::MoveAbsolute { x, y });
        Ok(())
    }

    async fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError> {
        self.record(InjectedCall::MoveRelative { dx, dy });
        Ok(())
    }

    async fn button(
        &mut self,
        button: MouseButton,
        state: ButtonState,
        clicks: u8,
    ) -> Result<(), InputError> {
        self.record(InjectedCall::Button {
            button,
            state,
            clicks,
        });
        Ok(())
    }

    async fn wheel(&mut self, dx: f32, dy: f32) -> Result<(), InputError> {
        self.record(InjectedCall::Wheel { dx, dy });
        Ok(())
    }

    async fn key(&mut self, key: KeyCode, state: KeyState) -> Result<(), InputError> {
        self.record(InjectedCall::Key { key, state });
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), InputError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_forwards_injected_events() {
        let (mut capture, feed) = MockCapture::new(1920, 1080);
        let (tx, mut rx) = mpsc::channel(16);
        capture.start(tx).await.unwrap();

        feed.send(RawInputEvent::MotionRelative {
            dx: 5,
            dy: -3,
            timestamp: 1,
        })
        .await
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            RawInputEvent::MotionRelative {
                dx: 5,
                dy: -3,
                timestamp: 1
            }
        );
    }

    #[tokio::test]
    async fn capture_start_is_single_shot() {
        let (mut capture, _feed) = MockCapture::new(800, 600);
        let (tx, _rx) = mpsc::channel(1);
        capture.start(tx.clone()).await.unwrap();
        assert!(matches!(
            capture.start(tx).await,
            Err(InputError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn injector_records_calls_in_order() {
        let mut injector = MockInjector::new(1920, 1080);
        let handle = injector.handle();
        injector.start().await.unwrap();
        injector.move_absolute(10, 20).await.unwrap();
        injector
            .key(KeyCode::KeyA, KeyState::Down)
            .await
            .unwrap();

        let calls = handle.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], InjectedCall::MoveAbsolute { x: 10, y: 20 });
        assert_eq!(
            calls[1],
            InjectedCall::Key {
                key: KeyCode::KeyA,
                state: KeyState::Down
            }
        );
    }
}
