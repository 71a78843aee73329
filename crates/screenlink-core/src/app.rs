//! Application wiring and the main loop.
//!
//! `App` owns the node manager and runs the dispatch loop: it pops events
//! from the bus, reacts to endpoint status changes by starting or stopping
//! the capture/injection nodes, then dispatches to consumers. RPC and
//! shell requests are answered between dispatches so every state mutation
//! happens on this one task.

use std::time::{SystemTime, UNIX_EPOCH};

use screenlink_input::{InputCapture, InputInjector};
use screenlink_types::{AppMode, AppStatus, Message, VirtualScreenInfo};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{Event, EventQueue};
use crate::capture::CaptureNode;
use crate::command::CommandRegistry;
use crate::controller::{ControllerNode, ScreenLayout};
use crate::error::CoreError;
use crate::injector::InjectorNode;
use crate::invoker::{
    execute_line, install_builtin_commands, BuiltinContext, InvokerNode, SharedRegistry,
};
use crate::manager::NodeManager;
use crate::rpc::{RemoteControllerNode, RpcCall};
use crate::settings::{Settings, SharedSettings};
use crate::transport::TransportNode;
use crate::{capture, controller, injector, invoker, rpc, transport};

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

/// Clonable handle for the shell and for tests: runs commands and RPC
/// methods on the dispatcher, and requests shutdown.
#[derive(Clone)]
pub struct AppHandle {
    calls_tx: mpsc::Sender<RpcCall>,
    shutdown: CancellationToken,
}

impl AppHandle {
    /// Invoke an RPC method on the dispatcher task.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, String> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let call = RpcCall {
            method: method.to_string(),
            params,
            reply: reply_tx,
        };
        self.calls_tx
            .send(call)
            .await
            .map_err(|_| "service shutting down".to_string())?;
        reply_rx.await.map_err(|_| "request dropped".to_string())?
    }

    /// Run one command line and return its textual reply.
    pub async fn execute(&self, line: &str) -> Result<String, String> {
        let result = self.call("execute_command", json!([line])).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// The assembled application.
pub struct App {
    manager: NodeManager,
    queue: EventQueue,
    settings: SharedSettings,
    layout: ScreenLayout,
    registry: SharedRegistry,
    self_info: VirtualScreenInfo,
    calls_tx: mpsc::Sender<RpcCall>,
    calls_rx: mpsc::Receiver<RpcCall>,
    shutdown: CancellationToken,
    server_up: bool,
    client_up: bool,
}

impl App {
    /// Wire the components together. `capture` and `injector` are the
    /// platform backends chosen by the binary.
    pub fn new(
        settings: Settings,
        capture_backend: Box<dyn InputCapture>,
        injector_backend: Box<dyn InputInjector>,
    ) -> Result<Self, CoreError> {
        let (width, height) = capture_backend.screen_size();
        let self_info = VirtualScreenInfo {
            name: settings.screen_name.clone(),
            screen_id: 0,
            width,
            height,
            timestamp: now_millis(),
        };

        let rpc_endpoint = match &settings.remote_controller {
            Some(endpoint) => Some(endpoint.parse().map_err(|e| {
                CoreError::Config(format!("invalid remote_controller endpoint: {e}"))
            })?),
            None => None,
        };

        let layout = ScreenLayout::default();
        layout.load(settings.screen_settings.clone());
        let settings: SharedSettings = std::sync::Arc::new(std::sync::Mutex::new(settings));

        let queue = EventQueue::default();
        let shutdown = CancellationToken::new();
        let (calls_tx, calls_rx) = mpsc::channel(16);

        let registry: SharedRegistry =
            std::sync::Arc::new(std::sync::Mutex::new(CommandRegistry::new()));
        install_builtin_commands(
            &registry,
            &BuiltinContext {
                bus: queue.clone(),
                layout: layout.clone(),
                settings: settings.clone(),
                shutdown: shutdown.clone(),
            },
        )?;

        let mut manager = NodeManager::new(queue.clone());
        manager.add(Box::new(TransportNode::new(self_info.clone())));
        manager.add(Box::new(ControllerNode::new(
            settings.clone(),
            layout.clone(),
            self_info.clone(),
        )));
        manager.add(Box::new(CaptureNode::new(capture_backend)));
        manager.add(Box::new(InjectorNode::new(injector_backend)));
        manager.add(Box::new(InvokerNode::new(registry.clone())));
        manager.add(Box::new(RemoteControllerNode::new(
            rpc_endpoint,
            calls_tx.clone(),
        )));

        Ok(Self {
            manager,
            queue,
            settings,
            layout,
            registry,
            self_info,
            calls_tx,
            calls_rx,
            shutdown,
            server_up: false,
            client_up: false,
        })
    }

    #[must_use]
    pub fn handle(&self) -> AppHandle {
        AppHandle {
            calls_tx: self.calls_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run until shutdown is requested, then tear everything down.
    pub async fn run(&mut self) -> Result<(), CoreError> {
        self.manager.setup(transport::NODE_NAME).await?;
        self.manager.setup(controller::NODE_NAME).await?;
        self.manager.setup(invoker::NODE_NAME).await?;
        self.manager.setup(rpc::NODE_NAME).await?;
        info!(screen = %self.self_info.name, "screenlink running");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                call = self.calls_rx.recv() => {
                    if let Some(call) = call {
                        self.answer(call).await;
                    }
                }
                event = self.queue.pop() => {
                    match event {
                        Ok(event) => self.process_event(event).await,
                        Err(_) => break,
                    }
                }
            }
        }

        // Drain what is already queued so teardown observes a quiet bus.
        while let Some(event) = self.queue.try_pop() {
            self.process_event(event).await;
        }
        self.manager.teardown_all().await;
        if let Err(e) = self.settings.lock().unwrap().save() {
            warn!(error = %e, "failed to save settings on exit");
        }
        info!("screenlink stopped");
        Ok(())
    }

    /// Endpoint status drives which input nodes are alive: the server owns
    /// capture (and the injector, for self-handoff positioning); a client
    /// only injects.
    async fn apply_status(&mut self, status: AppStatus, mode: AppMode) {
        match (status, mode) {
            (AppStatus::Started, AppMode::Server) => {
                self.server_up = true;
                if let Err(e) = self.manager.setup(capture::NODE_NAME).await {
                    error!(error = %e, "capture setup failed; server is not functional");
                }
                if let Err(e) = self.manager.setup(injector::NODE_NAME).await {
                    warn!(error = %e, "injector setup failed");
                }
            }
            (AppStatus::Stopped, AppMode::Server) => {
                self.server_up = false;
                if let Err(e) = self.manager.teardown(capture::NODE_NAME).await {
                    warn!(error = %e, "capture teardown failed");
                }
                if let Err(e) = self.manager.teardown(injector::NODE_NAME).await {
                    warn!(error = %e, "injector teardown failed");
                }
            }
            (AppStatus::Started, AppMode::Client) => {
                self.client_up = true;
                if let Err(e) = self.manager.setup(injector::NODE_NAME).await {
                    error!(error = %e, "injector setup failed; client is not functional");
                }
            }
            (AppStatus::Stopped, AppMode::Client) => {
                self.client_up = false;
                if let Err(e) = self.manager.teardown(injector::NODE_NAME).await {
                    warn!(error = %e, "injector teardown failed");
                }
            }
        }
    }

    async fn process_event(&mut self, event: Event) {
        if let Message::AppStatusChanged { status, mode } = event.message {
            self.apply_status(status, mode).await;
        }
        self.manager.dispatch(event).await;
    }

    async fn answer(&mut self, call: RpcCall) {
        let result = self.dispatch_method(&call.method, &call.params).await;
        if call.reply.send(result).is_err() {
            warn!(method = %call.method, "rpc caller went away");
        }
    }

    async fn dispatch_method(&mut self, method: &str, params: &Value) -> Result<Value, String> {
        match method {
            "reload_config_file" => {
                {
                    let mut settings = self.settings.lock().unwrap();
                    if let Some(path) = string_param(params, "path") {
                        settings.path = Some(path.into());
                    }
                    settings.reload().map_err(|e| e.to_string())?;
                    self.layout.load(settings.screen_settings.clone());
                }
                Ok(json!(true))
            }
            "execute_command" => {
                let line = string_param(params, "command")
                    .ok_or_else(|| "missing command".to_string())?;
                execute_line(&self.registry, &line)
                    .await
                    .map(Value::String)
                    .map_err(|e| e.to_string())
            }
            "local_screen_info" => {
                serde_json::to_value(&self.self_info).map_err(|e| e.to_string())
            }
            "server" | "client" => {
                let cmd = string_param(params, "cmd").ok_or_else(|| "missing cmd".to_string())?;
                let mut line = format!("{method} {cmd}");
                if let Some(ip) = named_param(params, "ip", 1) {
                    line.push_str(&format!(" --address {ip}"));
                }
                if let Some(port) = named_param(params, "port", 2) {
                    line.push_str(&format!(" --port {port}"));
                }
                execute_line(&self.registry, &line)
                    .await
                    .map(Value::String)
                    .map_err(|e| e.to_string())
            }
            "server_status" => Ok(json!(i32::from(self.server_up))),
            "client_status" => Ok(json!(i32::from(self.client_up))),
            "set_virtual_screen_config" => {
                let config: screenlink_types::VirtualScreenConfig =
                    serde_json::from_value(first_param(params).clone())
                        .map_err(|e| e.to_string())?;
                self.layout
                    .set_position(&config.name, config.pos_x, config.pos_y)
                    .map_err(|e| e.to_string())?;
                Ok(json!(true))
            }
            "set_virtual_screen_configs" => {
                let configs: Vec<screenlink_types::VirtualScreenConfig> =
                    serde_json::from_value(first_param(params).clone())
                        .map_err(|e| e.to_string())?;
                for config in configs {
                    self.layout
                        .set_position(&config.name, config.pos_x, config.pos_y)
                        .map_err(|e| e.to_string())?;
                }
                Ok(json!(true))
            }
            "get_online_screens" => {
                serde_json::to_value(self.layout.online_screens()).map_err(|e| e.to_string())
            }
            "remove_virtual_screen" => {
                let name =
                    string_param(params, "name").ok_or_else(|| "missing name".to_string())?;
                self.layout.remove(&name);
                Ok(json!(true))
            }
            other => Err(format!("unknown method {other}")),
        }
    }
}

/// First positional parameter, or the whole object for struct params.
fn first_param(params: &Value) -> &Value {
    params.get(0).unwrap_or(params)
}

/// A string parameter, positional-first with a named fallback.
fn string_param(params: &Value, key: &str) -> Option<String> {
    params
        .get(0)
        .and_then(Value::as_str)
        .or_else(|| params.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// A parameter by name or position, rendered for a command line.
fn named_param(params: &Value, key: &str, index: usize) -> Option<String> {
    let value = params.get(key).or_else(|| params.get(index))?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
