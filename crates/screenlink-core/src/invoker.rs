//! Command invoker node and the built-in command set.
//!
//! The invoker executes textual command lines (shell, RPC) and consumes
//! proto-typed messages, routing both into the same registry. Built-in
//! commands translate into bus control events or act on the shared layout
//! and settings stores.

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use screenlink_types::{
    Message, MessageType, ScreenOp, ServiceOp, SwitchOp, APP_NAME, PROTOCOL_VERSION,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{Event, EventQueue};
use crate::command::{Command, CommandRegistry, OptionKind};
use crate::controller::ScreenLayout;
use crate::error::CoreError;
use crate::node::{Consumer, Node};
use crate::settings::SharedSettings;

pub const NODE_NAME: &str = "invoker";

pub type SharedRegistry = Arc<Mutex<CommandRegistry>>;

/// Run one command line against a shared registry.
///
/// The registry lock is only held while parsing; the handler future runs
/// unlocked so handlers may re-enter the registry (help does).
pub async fn execute_line(registry: &SharedRegistry, line: &str) -> Result<String, CoreError> {
    let future = registry.lock().unwrap().invoke_line(line)?;
    future.await
}

/// The command dispatch component.
pub struct InvokerNode {
    registry: SharedRegistry,
}

impl InvokerNode {
    #[must_use]
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Node for InvokerNode {
    fn name(&self) -> &str {
        NODE_NAME
    }

    async fn setup(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    fn consumer(&mut self) -> Option<&mut dyn Consumer> {
        Some(self)
    }
}

#[async_trait]
impl Consumer for InvokerNode {
    fn subscriptions(&self) -> Vec<MessageType> {
        self.registry.lock().unwrap().proto_types()
    }

    async fn handle_event(&mut self, event: &Event, _bus: &EventQueue) -> Result<(), CoreError> {
        let future = {
            let mut registry = self.registry.lock().unwrap();
            registry.invoke_message(&event.message)
        };
        if let Some(future) = future {
            let output = future.await?;
            if !output.is_empty() {
                info!(origin = %event.origin, output = %output, "command executed by message");
            }
        }
        Ok(())
    }
}

/// Everything the built-in commands act on.
#[derive(Clone)]
pub struct BuiltinContext {
    pub bus: EventQueue,
    pub layout: ScreenLayout,
    pub settings: SharedSettings,
    pub shutdown: CancellationToken,
}

/// Register the built-in command set.
pub fn install_builtin_commands(
    registry: &SharedRegistry,
    ctx: &BuiltinContext,
) -> Result<(), CoreError> {
    let weak_registry = Arc::downgrade(registry);
    let mut registry = registry.lock().unwrap();

    registry.register(endpoint_command(
        "server",
        "run this machine as the input-owning server",
        ctx,
        true,
    ))?;
    registry.register(endpoint_command(
        "client",
        "connect this machine to a server as a controlled screen",
        ctx,
        false,
    ))?;
    registry.register(capture_command(ctx))?;
    registry.register(screen_command(ctx))?;
    registry.register(config_command(ctx))?;
    registry.register(log_command(ctx))?;
    registry.register(help_command(weak_registry))?;
    registry.register(Command::new(
        "version",
        "print the application version",
        "app",
        Box::new(|_call| Box::pin(async { Ok(format!("{APP_NAME} {PROTOCOL_VERSION}")) })),
    ))?;
    registry.register(exit_command(ctx))?;
    Ok(())
}

fn endpoint_command(name: &'static str, summary: &str, ctx: &BuiltinContext, server: bool) -> Command {
    let bus = ctx.bus.clone();
    let settings = ctx.settings.clone();
    Command::new(
        name,
        summary,
        "transport",
        Box::new(move |call| {
            let bus = bus.clone();
            let settings = settings.clone();
            Box::pin(async move {
                let op = match call.positionals.first().map(String::as_str) {
                    Some("start") => ServiceOp::Start,
                    Some("stop") => ServiceOp::Stop,
                    Some("restart") => ServiceOp::Restart,
                    other => {
                        return Err(CoreError::Command(format!(
                            "{name} expects start|stop|restart, got {}",
                            other.unwrap_or("nothing")
                        )));
                    }
                };
                let (default_address, default_port) =
                    settings.lock().unwrap().server_endpoint();
                let address = call
                    .text("address")
                    .map_or(default_address, str::to_string);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let port = call
                    .int("port")
                    .map_or(default_port, |p| p.clamp(0, i64::from(u16::MAX)) as u16);
                let msg = if server {
                    Message::ServerControl {
                        op,
                        address: address.clone(),
                        port,
                    }
                } else {
                    Message::ClientControl {
                        op,
                        address: address.clone(),
                        port,
                    }
                };
                bus.push(Event::new(NODE_NAME, msg)).await?;
                Ok(format!("{name} {op:?} requested for {address}:{port}"))
            })
        }),
    )
    .option("address", OptionKind::Text, "endpoint address")
    .option("port", OptionKind::Int, "endpoint port")
}

fn capture_command(ctx: &BuiltinContext) -> Command {
    let bus = ctx.bus.clone();
    Command::new(
        "capture",
        "toggle exclusive input capture",
        "transport",
        Box::new(move |call| {
            let bus = bus.clone();
            Box::pin(async move {
                let op = match call.positionals.first().map(String::as_str) {
                    Some("start") => SwitchOp::Start,
                    Some("stop") => SwitchOp::Stop,
                    other => {
                        return Err(CoreError::Command(format!(
                            "capture expects start|stop, got {}",
                            other.unwrap_or("nothing")
                        )));
                    }
                };
                bus.push(Event::new(NODE_NAME, Message::CaptureControl(op)))
                    .await?;
                Ok(format!("capture {op:?} requested"))
            })
        }),
    )
}

fn screen_command(ctx: &BuiltinContext) -> Command {
    let layout = ctx.layout.clone();
    Command::new(
        "screen",
        "configure the virtual screen layout",
        "controller",
        Box::new(move |mut call| {
            let layout = layout.clone();
            Box::pin(async move {
                let op = if let Some(Message::VirtualScreenControl(op)) = call.message.take() {
                    op
                } else if call.flag("show") {
                    ScreenOp::Show
                } else if call.flag("remove") {
                    let name = call
                        .text("src")
                        .ok_or_else(|| {
                            CoreError::Command("--remove needs --src <screen>".to_string())
                        })?
                        .to_string();
                    ScreenOp::Remove { name }
                } else if let Some(pos) = call.text("pos") {
                    let name = call
                        .text("src")
                        .ok_or_else(|| {
                            CoreError::Command("--pos needs --src <screen>".to_string())
                        })?
                        .to_string();
                    let (x, y) = pos
                        .split_once('.')
                        .and_then(|(x, y)| Some((x.parse().ok()?, y.parse().ok()?)))
                        .ok_or_else(|| {
                            CoreError::Command(format!("invalid --pos {pos}, expected X.Y"))
                        })?;
                    ScreenOp::Set { name, x, y }
                } else {
                    return Err(CoreError::Command(
                        "screen needs one of --pos, --show, --remove".to_string(),
                    ));
                };

                match op {
                    ScreenOp::Set { name, x, y } => {
                        layout.set_position(&name, x, y)?;
                        Ok(format!("screen {name} placed at ({x}, {y})"))
                    }
                    ScreenOp::Remove { name } => {
                        layout.remove(&name);
                        Ok(format!("screen {name} removed"))
                    }
                    ScreenOp::Show => Ok(layout.show()),
                }
            })
        }),
    )
    .option("src", OptionKind::Text, "screen name")
    .option("pos", OptionKind::Text, "placement as X.Y in the shared plane")
    .option("show", OptionKind::Flag, "print the online table and layout")
    .option("remove", OptionKind::Flag, "forget the screen's placement")
    .proto(MessageType::VirtualScreenControl)
}

fn config_command(ctx: &BuiltinContext) -> Command {
    let settings = ctx.settings.clone();
    let layout = ctx.layout.clone();
    Command::new(
        "config",
        "reload the settings file",
        "app",
        Box::new(move |call| {
            let settings = settings.clone();
            let layout = layout.clone();
            Box::pin(async move {
                if !call.flag("reload") {
                    return Err(CoreError::Command(
                        "config supports --reload [--path=FILE]".to_string(),
                    ));
                }
                let mut guard = settings.lock().unwrap();
                if let Some(path) = call.text("path") {
                    guard.path = Some(path.into());
                }
                guard.reload()?;
                layout.load(guard.screen_settings.clone());
                Ok("configuration reloaded".to_string())
            })
        }),
    )
    .option("reload", OptionKind::Flag, "re-read the settings file")
    .option("path", OptionKind::Text, "settings file to load")
}

fn log_command(ctx: &BuiltinContext) -> Command {
    let settings = ctx.settings.clone();
    Command::new(
        "log",
        "adjust logging settings",
        "app",
        Box::new(move |call| {
            let settings = settings.clone();
            Box::pin(async move {
                let mut guard = settings.lock().unwrap();
                let mut changes = Vec::new();
                if let Some(level) = call.text("level") {
                    guard.log_level = level.to_string();
                    changes.push(format!("level={level}"));
                }
                if let Some(max) = call.int("max_log") {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        guard.max_log_records = max.clamp(0, i64::from(u32::MAX)) as u32;
                    }
                    changes.push(format!("max_log={max}"));
                }
                if call.flag("clear") {
                    changes.push("clear".to_string());
                }
                if changes.is_empty() {
                    Ok(format!(
                        "log level={} max_log={}",
                        guard.log_level, guard.max_log_records
                    ))
                } else {
                    Ok(format!("log updated: {} (applies on restart)", changes.join(", ")))
                }
            })
        }),
    )
    .option("level", OptionKind::Text, "log level")
    .option("max_log", OptionKind::Int, "maximum retained log records")
    .option("clear", OptionKind::Flag, "clear retained log records")
}

fn help_command(registry: Weak<Mutex<CommandRegistry>>) -> Command {
    Command::new(
        "help",
        "describe commands",
        "app",
        Box::new(move |call| {
            let registry = registry.clone();
            Box::pin(async move {
                let Some(registry) = registry.upgrade() else {
                    return Err(CoreError::Command("registry gone".to_string()));
                };
                let text = registry.lock().unwrap().help(&call.positionals);
                Ok(text)
            })
        }),
    )
}

fn exit_command(ctx: &BuiltinContext) -> Command {
    let shutdown = ctx.shutdown.clone();
    Command::new(
        "exit",
        "shut the application down",
        "app",
        Box::new(move |_call| {
            let shutdown = shutdown.clone();
            Box::pin(async move {
                warn!("shutdown requested");
                shutdown.cancel();
                Ok("shutting down".to_string())
            })
        }),
    )
    .alias("quit")
}
