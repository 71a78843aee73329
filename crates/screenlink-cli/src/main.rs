//! screenlink: share one keyboard and mouse across machines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use screenlink_core::{App, AppHandle, Settings};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "screenlink",
    about = "Keyboard and mouse synchronization across machines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to the JSON settings file.
    #[arg(short, long, default_value = "screenlink.json")]
    config: PathBuf,

    /// Run without the interactive shell.
    #[arg(long)]
    no_console: bool,

    /// Override the settings' log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Local screen width in pixels.
    #[arg(long, default_value_t = 1920)]
    screen_width: u32,

    /// Local screen height in pixels.
    #[arg(long, default_value_t = 1080)]
    screen_height: u32,

    #[command(subcommand)]
    role: Option<Role>,
}

/// Role to start immediately instead of waiting for a shell command.
#[derive(Subcommand)]
enum Role {
    /// Own the input devices and forward them to clients.
    Server {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Receive input from a server.
    Client {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Role {
    fn command_line(&self) -> String {
        let (verb, address, port) = match self {
            Role::Server { address, port } => ("server", address, port),
            Role::Client { address, port } => ("client", address, port),
        };
        let mut line = format!("{verb} start");
        if let Some(address) = address {
            line.push_str(&format!(" --address {address}"));
        }
        if let Some(port) = port {
            line.push_str(&format!(" --port {port}"));
        }
        line
    }
}

fn init_tracing(settings: &Settings, override_level: Option<&str>) -> anyhow::Result<()> {
    let level = override_level.unwrap_or(&settings.log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &settings.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Arc::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[cfg(all(feature = "linux", target_os = "linux"))]
fn backends(
    width: u32,
    height: u32,
) -> anyhow::Result<(
    Box<dyn screenlink_input::InputCapture>,
    Box<dyn screenlink_input::InputInjector>,
)> {
    use screenlink_input::linux::{EvdevCapture, UinputInjector};
    Ok((
        Box::new(EvdevCapture::new(width, height)),
        Box::new(UinputInjector::new(width, height)),
    ))
}

#[cfg(not(all(feature = "linux", target_os = "linux")))]
fn backends(
    _width: u32,
    _height: u32,
) -> anyhow::Result<(
    Box<dyn screenlink_input::InputCapture>,
    Box<dyn screenlink_input::InputInjector>,
)> {
    anyhow::bail!("no input backend available for this platform")
}

/// Read shell commands from stdin and run them on the dispatcher.
async fn shell(handle: AppHandle) {
    let token = handle.shutdown_token();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = token.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match handle.execute(line).await {
                    Ok(output) => {
                        if !output.is_empty() {
                            println!("{output}");
                        }
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Ok(None) | Err(_) => {
                handle.shutdown();
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)
        .with_context(|| format!("load settings from {}", cli.config.display()))?;
    init_tracing(&settings, cli.log_level.as_deref())?;

    let (capture, injector) = backends(cli.screen_width, cli.screen_height)?;
    let mut app = App::new(settings, capture, injector)?;
    let handle = app.handle();

    if let Some(role) = &cli.role {
        let line = role.command_line();
        let startup = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = startup.execute(&line).await {
                tracing::error!(error = %e, "startup command failed");
            }
        });
    }

    if !cli.no_console {
        tokio::spawn(shell(handle.clone()));
    }

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; shutting down");
            signal_handle.shutdown();
        }
    });

    app.run().await?;
    Ok(())
}
