//! Controller node: screen layout, focus, and cursor handoff.
//!
//! Idle until the transport reports an endpoint up. In server mode it owns
//! the virtual screen table and the current-screen state and translates
//! local motion into absolute positions on the focused screen; in client
//! mode it only switches the injector on and off.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use screenlink_types::{
    AppMode, AppStatus, Edge, Message, MessageType, Point, SwitchOp, VirtualScreenConfig,
    VirtualScreenInfo,
};
use tracing::{debug, info, warn};

use crate::bus::{Event, EventQueue};
use crate::error::CoreError;
use crate::node::{Consumer, Node};
use crate::settings::Settings;
use crate::transport::SELF_PEER;

pub const NODE_NAME: &str = "controller";

/// Interior band; the cursor must come this far off every edge of the
/// focused screen before another crossing may fire.
const BORDER_BAND: i32 = 10;

#[derive(Default)]
struct LayoutInner {
    /// Persisted placements in the shared plane.
    configs: Vec<VirtualScreenConfig>,
    /// Online screens by peer id; `"self"` present while serving.
    online: HashMap<String, VirtualScreenInfo>,
    /// Screen name -> peer id.
    names: HashMap<String, String>,
}

/// Shared store for the virtual screen tables.
///
/// The controller owns the semantics; the `screen` command and the RPC
/// surface hold clones for layout edits and queries. All access happens on
/// the dispatcher task, between dispatches.
#[derive(Clone, Default)]
pub struct ScreenLayout {
    inner: Arc<Mutex<LayoutInner>>,
}

impl ScreenLayout {
    /// Replace the configured placements (startup / reload).
    pub fn load(&self, configs: Vec<VirtualScreenConfig>) {
        self.inner.lock().unwrap().configs = configs;
    }

    /// The configured placements, for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VirtualScreenConfig> {
        self.inner.lock().unwrap().configs.clone()
    }

    pub fn insert_online(&self, peer: &str, info: VirtualScreenInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner.names.insert(info.name.clone(), peer.to_string());
        inner.online.insert(peer.to_string(), info);
    }

    pub fn remove_online(&self, peer: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(info) = inner.online.remove(peer) {
            inner.names.remove(&info.name);
        }
    }

    pub fn clear_online(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.online.clear();
        inner.names.clear();
    }

    #[must_use]
    pub fn peer_of(&self, name: &str) -> Option<String> {
        self.inner.lock().unwrap().names.get(name).cloned()
    }

    #[must_use]
    pub fn screen_id_of(&self, peer: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .online
            .get(peer)
            .map_or(0, |info| info.screen_id)
    }

    /// Online screens other than the local one.
    #[must_use]
    pub fn online_screens(&self) -> Vec<VirtualScreenInfo> {
        self.inner
            .lock()
            .unwrap()
            .online
            .iter()
            .filter(|(peer, _)| peer.as_str() != SELF_PEER)
            .map(|(_, info)| info.clone())
            .collect()
    }

    /// Create or move a screen's placement. The screen must be online so
    /// its size is known; offline screens keep their persisted entry.
    pub fn set_position(&self, name: &str, x: i32, y: i32) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(peer) = inner.names.get(name).cloned() else {
            return Err(CoreError::Config(format!("screen {name} not online")));
        };
        let info = inner.online[&peer].clone();
        #[allow(clippy::cast_possible_wrap)]
        let (width, height) = (info.width as i32, info.height as i32);
        if let Some(config) = inner.configs.iter_mut().find(|c| c.name == name) {
            config.pos_x = x;
            config.pos_y = y;
            config.width = width;
            config.height = height;
        } else {
            inner.configs.push(VirtualScreenConfig {
                name: name.to_string(),
                pos_x: x,
                pos_y: y,
                width,
                height,
            });
        }
        Ok(())
    }

    /// Make sure a placement exists for `name`, creating one at the origin.
    pub fn ensure_config(&self, name: &str, width: i32, height: i32) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.configs.iter().any(|c| c.name == name) {
            inner.configs.push(VirtualScreenConfig {
                name: name.to_string(),
                pos_x: 0,
                pos_y: 0,
                width,
                height,
            });
        }
    }

    /// Forget a screen's placement.
    pub fn remove(&self, name: &str) {
        info!(screen = %name, "removing virtual screen");
        self.inner
            .lock()
            .unwrap()
            .configs
            .retain(|c| c.name != name);
    }

    #[must_use]
    pub fn config_of(&self, name: &str) -> Option<VirtualScreenConfig> {
        self.inner
            .lock()
            .unwrap()
            .configs
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    /// First configured screen whose rectangle contains `pt`, excluding
    /// `exclude`. Gaps between screens find nothing: dead edge.
    #[must_use]
    pub fn find_at(&self, pt: Point, exclude: &str) -> Option<VirtualScreenConfig> {
        self.inner
            .lock()
            .unwrap()
            .configs
            .iter()
            .find(|c| c.name != exclude && c.rect().contains(pt))
            .cloned()
    }

    /// Render the online table and the configured layout as text.
    #[must_use]
    pub fn show(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut out = String::from("---------- online screens ----------\n");
        for (peer, info) in &inner.online {
            let _ = writeln!(
                out,
                "screen {}({}) on {} : {}x{}",
                info.name, info.screen_id, peer, info.width, info.height
            );
        }
        out.push_str("---------- screen layout -----------\n");
        for config in &inner.configs {
            let _ = writeln!(
                out,
                "screen {} : ({}, {}) {}x{}",
                config.name, config.pos_x, config.pos_y, config.width, config.height
            );
        }
        out.push_str("------------------------------------\n");
        out
    }
}

/// Cursor state on the focused screen, in that screen's local coordinates.
struct CurrentScreen {
    peer: String,
    name: String,
    pos_x: i32,
    pos_y: i32,
    /// While set, edge crossings are suppressed; cleared once the cursor
    /// is at least [`BORDER_BAND`] pixels off every edge.
    in_border: bool,
}

enum Mode {
    Idle,
    Server(CurrentScreen),
    Client,
}

/// The controller component.
pub struct ControllerNode {
    settings: Arc<Mutex<Settings>>,
    layout: ScreenLayout,
    self_info: VirtualScreenInfo,
    mode: Mode,
}

impl ControllerNode {
    #[must_use]
    pub fn new(
        settings: Arc<Mutex<Settings>>,
        layout: ScreenLayout,
        self_info: VirtualScreenInfo,
    ) -> Self {
        Self {
            settings,
            layout,
            self_info,
            mode: Mode::Idle,
        }
    }

    fn current_name(&self) -> Option<String> {
        match &self.mode {
            Mode::Server(current) => Some(current.name.clone()),
            _ => None,
        }
    }

    async fn enter_server(&mut self, bus: &EventQueue) -> Result<(), CoreError> {
        self.layout.insert_online(SELF_PEER, self.self_info.clone());
        #[allow(clippy::cast_possible_wrap)]
        self.layout.ensure_config(
            &self.self_info.name,
            self.self_info.width as i32,
            self.self_info.height as i32,
        );
        self.mode = Mode::Server(CurrentScreen {
            peer: SELF_PEER.to_string(),
            name: self.self_info.name.clone(),
            pos_x: 0,
            pos_y: 0,
            in_border: false,
        });
        bus.push(Event::new(
            NODE_NAME,
            Message::SendSubscribe(Message::forwarded_types()),
        ))
        .await?;
        info!(screen = %self.self_info.name, "controller in server mode");
        Ok(())
    }

    async fn leave_server(&mut self, bus: &EventQueue) -> Result<(), CoreError> {
        {
            let mut settings = self.settings.lock().unwrap();
            settings.screen_settings = self.layout.snapshot();
            if let Err(e) = settings.save() {
                warn!(error = %e, "failed to persist screen layout");
            }
        }
        bus.push(Event::new(
            NODE_NAME,
            Message::SendUnsubscribe(Message::forwarded_types()),
        ))
        .await?;
        self.layout.clear_online();
        self.mode = Mode::Idle;
        info!("controller left server mode");
        Ok(())
    }

    /// Switch focus to `name`. Emits `FocusScreenChanged` and the matching
    /// `CaptureControl` before touching the current-screen state, so the
    /// transport's peer switch is fully dispatched ahead of any motion.
    /// Returns whether the new screen has a usable layout entry.
    async fn set_current_screen(&mut self, name: &str, bus: &EventQueue) -> Result<bool, CoreError> {
        let (old_name, old_peer) = {
            let Mode::Server(current) = &self.mode else {
                return Ok(false);
            };
            if current.name == name {
                return Ok(false);
            }
            (current.name.clone(), current.peer.clone())
        };
        let Some(peer) = self.layout.peer_of(name) else {
            if !name.is_empty() {
                warn!(screen = %name, "screen not online");
            }
            return Ok(false);
        };

        bus.push(Event::new(
            NODE_NAME,
            Message::FocusScreenChanged {
                name: name.to_string(),
                peer: peer.clone(),
                old_name,
                old_peer: old_peer.clone(),
                screen_id: self.layout.screen_id_of(&peer),
                old_screen_id: self.layout.screen_id_of(&old_peer),
            },
        ))
        .await?;
        let op = if peer == SELF_PEER {
            SwitchOp::Stop
        } else {
            SwitchOp::Start
        };
        bus.push(Event::new(NODE_NAME, Message::CaptureControl(op)))
            .await?;

        let has_config = self.layout.config_of(name).is_some();
        let Mode::Server(current) = &mut self.mode else {
            return Ok(false);
        };
        current.name = name.to_string();
        current.peer = peer;
        // Just-crossed counts as in the outer band for one cycle.
        current.in_border = true;
        info!(screen = %name, "focus switched");
        if has_config {
            Ok(true)
        } else {
            current.pos_x = 0;
            current.pos_y = 0;
            warn!(screen = %name, "focused screen has no layout entry");
            Ok(false)
        }
    }

    /// Edge hit on the focused screen: extend one pixel past the edge into
    /// the shared plane and hand off to whichever screen contains the exit
    /// point. No containing screen means a dead edge.
    async fn on_border(
        &mut self,
        edge: Edge,
        x: i32,
        y: i32,
        bus: &EventQueue,
    ) -> Result<(), CoreError> {
        let prev = {
            let Mode::Server(current) = &self.mode else {
                return Ok(());
            };
            let Some(config) = self.layout.config_of(&current.name) else {
                warn!(screen = %current.name, "focused screen has no layout entry");
                return Ok(());
            };
            config
        };

        let mut pt = Point::new(x + prev.pos_x, y + prev.pos_y);
        match edge {
            Edge::Left => pt.x = prev.pos_x - 1,
            Edge::Right => pt.x = prev.pos_x + prev.width + 1,
            Edge::Top => pt.y = prev.pos_y - 1,
            Edge::Bottom => pt.y = prev.pos_y + prev.height + 1,
        }
        debug!(?edge, x = pt.x, y = pt.y, "border exit point");

        let Some(next) = self.layout.find_at(pt, &prev.name) else {
            debug!(?edge, "dead edge");
            return Ok(());
        };

        if self.set_current_screen(&next.name, bus).await? {
            let (enter_x, enter_y, to_self) = {
                let Mode::Server(current) = &mut self.mode else {
                    return Ok(());
                };
                // Mirror the exit point onto the entered screen, adjusted
                // for the offset between the two origins.
                match edge {
                    Edge::Left => {
                        current.pos_x = next.width;
                        current.pos_y = y + prev.pos_y - next.pos_y;
                    }
                    Edge::Right => {
                        current.pos_x = 0;
                        current.pos_y = y + prev.pos_y - next.pos_y;
                    }
                    Edge::Top => {
                        current.pos_x = x + prev.pos_x - next.pos_x;
                        current.pos_y = next.height;
                    }
                    Edge::Bottom => {
                        current.pos_x = x + prev.pos_x - next.pos_x;
                        current.pos_y = 0;
                    }
                }
                current.in_border = true;
                (current.pos_x, current.pos_y, current.peer == SELF_PEER)
            };
            if to_self {
                // Place the physical cursor at the entry point.
                bus.push(Event::new(
                    NODE_NAME,
                    Message::InjectorControl(SwitchOp::Start),
                ))
                .await?;
                bus.push(Event::new(
                    NODE_NAME,
                    Message::MouseMotionAbsolute {
                        x: enter_x,
                        y: enter_y,
                        is_absolute: true,
                        timestamp: 0,
                    },
                ))
                .await?;
                bus.push(Event::new(
                    NODE_NAME,
                    Message::InjectorControl(SwitchOp::Stop),
                ))
                .await?;
            }
        }
        Ok(())
    }

    /// Relative motion from exclusive capture: advance and clamp the
    /// position on the focused screen, fire a border crossing when it
    /// saturates at an edge, and emit the absolute position for the wire.
    async fn on_motion(
        &mut self,
        x: i32,
        y: i32,
        is_absolute: bool,
        timestamp: u64,
        bus: &EventQueue,
    ) -> Result<(), CoreError> {
        let border_hit = {
            let Mode::Server(current) = &mut self.mode else {
                return Ok(());
            };
            if current.peer == SELF_PEER {
                debug!("motion while focused on self; ignoring");
                return Ok(());
            }
            let Some(config) = self.layout.config_of(&current.name) else {
                warn!(screen = %current.name, "focused screen has no layout entry");
                return Ok(());
            };

            let base_x = if is_absolute { 0 } else { current.pos_x };
            let base_y = if is_absolute { 0 } else { current.pos_y };
            current.pos_x = (base_x + x).clamp(0, config.width);
            current.pos_y = (base_y + y).clamp(0, config.height);

            if current.in_border {
                if current.pos_x > BORDER_BAND
                    && current.pos_x < config.width - BORDER_BAND
                    && current.pos_y > BORDER_BAND
                    && current.pos_y < config.height - BORDER_BAND
                {
                    current.in_border = false;
                }
                None
            } else if let Some(edge) =
                Edge::check(current.pos_x, current.pos_y, config.width, config.height)
            {
                current.in_border = true;
                Some((edge, current.pos_x, current.pos_y))
            } else {
                None
            }
        };

        if let Some((edge, bx, by)) = border_hit {
            let before = self.current_name();
            self.on_border(edge, bx, by, bus).await?;
            if self.current_name() != before {
                // Crossed to another screen; this motion is spent.
                return Ok(());
            }
        }

        let Mode::Server(current) = &self.mode else {
            return Ok(());
        };
        bus.push(Event::new(
            NODE_NAME,
            Message::MouseMotionAbsolute {
                x: current.pos_x,
                y: current.pos_y,
                is_absolute: true,
                timestamp,
            },
        ))
        .await
    }
}

#[async_trait]
impl Node for ControllerNode {
    fn name(&self) -> &str {
        NODE_NAME
    }

    async fn setup(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), CoreError> {
        if matches!(self.mode, Mode::Server(_)) {
            let mut settings = self.settings.lock().unwrap();
            settings.screen_settings = self.layout.snapshot();
            if let Err(e) = settings.save() {
                warn!(error = %e, "failed to persist screen layout");
            }
        }
        self.mode = Mode::Idle;
        Ok(())
    }

    fn consumer(&mut self) -> Option<&mut dyn Consumer> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for ControllerNode {
    fn subscriptions(&self) -> Vec<MessageType> {
        vec![
            MessageType::AppStatusChanged,
            MessageType::Border,
            MessageType::MouseMotion,
            MessageType::ClientConnected,
            MessageType::ClientDisconnected,
            MessageType::FocusScreenChanged,
        ]
    }

    async fn handle_event(&mut self, event: &Event, bus: &EventQueue) -> Result<(), CoreError> {
        match &event.message {
            Message::AppStatusChanged { status, mode } => match (status, mode) {
                (AppStatus::Started, AppMode::Server) => self.enter_server(bus).await,
                (AppStatus::Stopped, AppMode::Server) => {
                    if matches!(self.mode, Mode::Server(_)) {
                        self.leave_server(bus).await
                    } else {
                        Ok(())
                    }
                }
                (AppStatus::Started, AppMode::Client) => {
                    self.mode = Mode::Client;
                    info!("controller in client mode");
                    bus.push(Event::new(
                        NODE_NAME,
                        Message::InjectorControl(SwitchOp::Start),
                    ))
                    .await
                }
                (AppStatus::Stopped, AppMode::Client) => {
                    if matches!(self.mode, Mode::Client) {
                        self.mode = Mode::Idle;
                        info!("controller left client mode");
                        bus.push(Event::new(
                            NODE_NAME,
                            Message::InjectorControl(SwitchOp::Stop),
                        ))
                        .await
                    } else {
                        Ok(())
                    }
                }
            },
            Message::ClientConnected { peer, info } => {
                if matches!(self.mode, Mode::Server(_)) {
                    info!(
                        peer = %peer,
                        screen = %info.name,
                        width = info.width,
                        height = info.height,
                        "screen online"
                    );
                    self.layout.insert_online(peer, info.clone());
                }
                Ok(())
            }
            Message::ClientDisconnected { peer, reason } => {
                if matches!(self.mode, Mode::Server(_)) {
                    info!(peer = %peer, reason = %reason, "screen offline");
                    self.layout.remove_online(peer);
                    let focused_gone = matches!(&self.mode, Mode::Server(c) if &c.peer == peer);
                    if focused_gone {
                        let home = self.self_info.name.clone();
                        self.set_current_screen(&home, bus).await?;
                    }
                }
                Ok(())
            }
            Message::Border { edge, x, y } => self.on_border(*edge, *x, *y, bus).await,
            Message::MouseMotion {
                x,
                y,
                is_absolute,
                timestamp,
            } => {
                self.on_motion(*x, *y, *is_absolute, *timestamp, bus)
                    .await
            }
            Message::FocusScreenChanged { name, .. } => {
                // External focus request (RPC / another controller surface).
                if matches!(self.mode, Mode::Server(_)) {
                    self.set_current_screen(name, bus).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
