#![forbid(unsafe_code)]

mod config;
mod constants;
mod controller;
mod debounce;
mod geometry;
mod input;
mod ipc;
mod magnet;
mod overlay;
mod render;
mod viewer;
mod x11_utils;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use config::ConfigFile;
use controller::{Controller, Services};
use input::InputHandler;
use ipc::{CommandChannel, CommandListener};
use overlay::outline::X11OutlineBackend;
use overlay::selection::SlopSelector;
use overlay::tracker::OverlayTracker;
use render::FrameRenderer;
use viewer::{FileViewer, TextSource};
use x11_utils::{CursorDriver, X11Context};

/// Capture-assist daemon for e-ink viewers
#[derive(Parser, Debug)]
#[command(name = "eink-lens", version, about)]
struct Cli {
    /// Settings file (defaults to $XDG_CONFIG_HOME/eink-lens/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base directory for relative viewer and content paths
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Override the control FIFO path
    #[arg(long)]
    control_pipe: Option<PathBuf>,

    /// Override the status FIFO path
    #[arg(long)]
    status_pipe: Option<PathBuf>,

    /// Skip keyboard and mouse listeners; only the command channel drives the daemon
    #[arg(long)]
    no_hotkeys: bool,
}

fn init_logging() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config_file = ConfigFile::new(cli.config.clone().unwrap_or_else(ConfigFile::default_path));
    let settings = config_file.load();
    info!(path = %config_file.path().display(), "Using config file");

    let workdir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve working directory")?,
    };
    let viewer_dir = resolve(&workdir, &settings.viewer_dir);
    let content_file = resolve(&workdir, &settings.content_file);
    let control_pipe = cli.control_pipe.unwrap_or_else(|| settings.pipes.control.clone());
    let status_pipe = cli.status_pipe.unwrap_or_else(|| settings.pipes.status.clone());

    let ctx = X11Context::connect()?;
    let cursor: Arc<dyn CursorDriver> = ctx.clone();

    let mut channel = CommandChannel::create(control_pipe, status_pipe)?;
    let key_bindings = settings.keys.clone();

    let services = Services {
        renderer: Box::new(FrameRenderer::new(Arc::clone(&ctx), viewer_dir.clone())),
        viewer: Box::new(FileViewer::new(viewer_dir)?),
        status: Box::new(channel.status_writer()),
        selector: Box::new(SlopSelector::default()),
        cursor: Arc::clone(&cursor),
        persistence: Box::new(config_file),
    };
    let controller = Controller::new(
        settings,
        Box::new(X11OutlineBackend::new(Arc::clone(&ctx))?),
        TextSource::load(&content_file)?,
        services,
    )?;
    controller.start()?;

    let mut listener = {
        let controller = Arc::clone(&controller);
        CommandListener::spawn(channel.control_path().to_path_buf(), move |command| {
            controller.execute(command);
        })?
    };

    let mut tracker = OverlayTracker::spawn(controller.overlay(), Arc::clone(&cursor), controller.text_mode_flag())?;

    // Input threads block in evdev reads and are left running until exit
    let _input_handles = if cli.no_hotkeys {
        info!("Input listeners disabled");
        Vec::new()
    } else if input::listener::check_permissions() {
        let handler: Arc<dyn InputHandler> = Arc::new(Arc::clone(&controller));
        match input::listener::spawn_listeners(input::build_bindings(&key_bindings), handler) {
            Ok(handles) => handles,
            Err(e) => {
                error!(error = %e, "Failed to start input listeners");
                input::listener::print_permission_error();
                Vec::new()
            }
        }
    } else {
        input::listener::print_permission_error();
        Vec::new()
    };

    let term = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&term))
            .with_context(|| format!("Failed to register handler for signal {}", signal))?;
    }

    info!("eink-lens running");
    while !term.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
        ctx.drain_events();
    }

    info!("Shutting down");
    listener.stop();
    channel.remove();
    tracker.stop();
    controller.shutdown();
    info!("Shutdown complete");
    Ok(())
}
